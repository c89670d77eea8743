//! Full-resolution pixel container
//!
//! Holds one cell per position of the level-0 index. Cells are either a heap
//! `Vec` or an encoded scratch file mapped with `memmap2`, which lets the OS
//! page a base level larger than memory in and out.

use crate::config::Backing;
use crate::error::{IoContext, Result, StoreError};
use crate::pixel::{Pixel, encode_slice};
use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::mem::ManuallyDrop;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Pixel cells indexed by curve position
#[derive(Debug)]
pub struct PixelContainer<P: Pixel> {
    len: u64,
    cells: Cells<P>,
}

#[derive(Debug)]
enum Cells<P> {
    Memory(Vec<P>),
    Mapped(MappedCells),
}

/// Scratch file mapped read-write; removed on drop
#[derive(Debug)]
struct MappedCells {
    map: ManuallyDrop<MmapMut>,
    path: PathBuf,
}

impl Drop for MappedCells {
    fn drop(&mut self) {
        // unmap before unlinking
        unsafe { ManuallyDrop::drop(&mut self.map) };
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("failed to remove scratch file {}: {}", self.path.display(), e);
        }
    }
}

impl<P: Pixel> PixelContainer<P> {
    /// Allocate `len` default cells
    pub fn new(len: u64, backing: &Backing) -> Result<Self> {
        let cells = match backing {
            Backing::Memory => Cells::Memory(Self::allocate(len)?),
            Backing::Mapped(path) => Cells::Mapped(Self::map_scratch(path, len)?),
        };
        let mut container = Self { len, cells };
        if let Cells::Mapped(_) = container.cells {
            // a fresh scratch file reads as zeros
            if !encodes_to_zero(&P::default()) {
                container.fill(P::default());
            }
        }
        Ok(container)
    }

    fn allocate(len: u64) -> Result<Vec<P>> {
        let bytes = len.saturating_mul(std::mem::size_of::<P>() as u64);
        let count = usize::try_from(len).map_err(|_| StoreError::Allocation { bytes })?;
        let mut cells = Vec::new();
        cells
            .try_reserve_exact(count)
            .map_err(|_| StoreError::Allocation { bytes })?;
        cells.resize(count, P::default());
        Ok(cells)
    }

    fn map_scratch(path: &Path, len: u64) -> Result<MappedCells> {
        let bytes = len.saturating_mul(P::SIZE as u64);
        if usize::try_from(bytes).is_err() {
            return Err(StoreError::Allocation { bytes });
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).at_path(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .at_path(path)?;
        file.set_len(bytes).at_path(path)?;

        let map = match unsafe { MmapOptions::new().map_mut(&file) } {
            Ok(map) => map,
            Err(e) => {
                log::error!("mapping {} bytes at {} failed: {}", bytes, path.display(), e);
                let _ = std::fs::remove_file(path);
                return Err(StoreError::Allocation { bytes });
            }
        };
        log::debug!("mapped {} byte scratch container at {}", bytes, path.display());
        Ok(MappedCells {
            map: ManuallyDrop::new(map),
            path: path.to_path_buf(),
        })
    }

    /// Number of cells
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True when the container holds no cells
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether cells live in a mapped scratch file
    pub fn is_mapped(&self) -> bool {
        matches!(self.cells, Cells::Mapped(_))
    }

    /// Cell at `position`; panics when `position >= len()`
    #[inline]
    pub fn get(&self, position: u64) -> P {
        match &self.cells {
            Cells::Memory(cells) => cells[position as usize],
            Cells::Mapped(mapped) => {
                let start = position as usize * P::SIZE;
                P::decode(&mapped.map[start..start + P::SIZE])
            }
        }
    }

    /// Overwrite the cell at `position`; panics when `position >= len()`
    #[inline]
    pub fn set(&mut self, position: u64, pixel: P) {
        match &mut self.cells {
            Cells::Memory(cells) => cells[position as usize] = pixel,
            Cells::Mapped(mapped) => {
                let start = position as usize * P::SIZE;
                pixel.encode(&mut mapped.map[start..start + P::SIZE]);
            }
        }
    }

    /// Set every cell to `pixel`
    pub fn fill(&mut self, pixel: P) {
        match &mut self.cells {
            Cells::Memory(cells) => cells.fill(pixel),
            Cells::Mapped(mapped) => {
                for chunk in mapped.map.chunks_exact_mut(P::SIZE) {
                    pixel.encode(chunk);
                }
            }
        }
    }

    /// Append the encoding of cells `range` to `out`
    pub fn encode_range(&self, range: Range<u64>, out: &mut Vec<u8>) {
        let (start, end) = (range.start as usize, range.end as usize);
        match &self.cells {
            Cells::Memory(cells) => encode_slice(&cells[start..end], out),
            Cells::Mapped(mapped) => {
                out.extend_from_slice(&mapped.map[start * P::SIZE..end * P::SIZE])
            }
        }
    }
}

fn encodes_to_zero<P: Pixel>(pixel: &P) -> bool {
    let mut bytes = Vec::with_capacity(P::SIZE);
    encode_slice(std::slice::from_ref(pixel), &mut bytes);
    bytes.iter().all(|b| *b == 0)
}
