//! Disk reader
//!
//! Serves rectangular reads and in-place updates from a written store without
//! loading it. Reads snap the rectangle down to multiples of 4 on every side;
//! the rectangle actually returned is reported in [`RangeRead::rect`].

use crate::cache::{CacheStats, NodeCache};
use crate::config::DEFAULT_CACHE_NODES;
use crate::error::{IoContext, Result, StoreError};
use crate::geometry::{Extent, Rect};
use crate::header::StoreHeader;
use crate::index::IndexMethod;
use crate::layout::{StorePaths, node_path_in};
use crate::pixel::Pixel;
use crate::range::{NodeSpan, RangePlan};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Pixels of a range read together with the rectangle they cover
#[derive(Debug, Clone, PartialEq)]
pub struct RangeRead<P> {
    /// Rectangle after 4-alignment
    pub rect: Rect,
    /// Row-major pixels of `rect`
    pub pixels: Vec<P>,
}

/// Reader over the node files of one store
#[derive(Debug)]
pub struct DiskReader<P: Pixel> {
    paths: StorePaths,
    header: StoreHeader,
    level: u32,
    level_extent: Extent,
    index: IndexMethod,
    level_dir: PathBuf,
    cache: NodeCache<P>,
}

impl<P: Pixel> DiskReader<P> {
    /// Open a store with the default cache of 16 nodes
    pub fn open(header_path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_cache(header_path, DEFAULT_CACHE_NODES)
    }

    /// Open a store keeping at most `cache_nodes` nodes in memory
    pub fn open_with_cache(header_path: impl AsRef<Path>, cache_nodes: usize) -> Result<Self> {
        let paths = StorePaths::new(header_path)?;
        let header = StoreHeader::read(paths.header())?;
        let index = header.index()?;
        let cache = NodeCache::new(cache_nodes, header.capacity.size() as usize)?;
        let level_dir = paths.level_dir(0);

        log::debug!(
            "opened {} ({}, {} levels)",
            paths.header().display(),
            header.extent,
            header.max_level() + 1
        );

        Ok(Self {
            level_extent: header.extent,
            paths,
            header,
            level: 0,
            index,
            level_dir,
            cache,
        })
    }

    /// Parsed header
    pub fn header(&self) -> &StoreHeader {
        &self.header
    }

    /// Largest level of the store
    pub fn max_level(&self) -> u32 {
        self.header.max_level()
    }

    /// Currently selected level
    pub fn current_level(&self) -> u32 {
        self.level
    }

    /// Extent of the current level
    pub fn level_extent(&self) -> Extent {
        self.level_extent
    }

    /// Cache counters
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Switch to `level`; a no-op when it is already current
    pub fn set_level(&mut self, level: u32) -> Result<()> {
        if level > self.max_level() {
            return Err(StoreError::InvalidLevel {
                level,
                max_level: self.max_level(),
            });
        }
        if level == self.level {
            return Ok(());
        }
        let extent = self.header.extent.at_level(level);
        self.index = self.index.with_extent(extent)?;
        self.level_extent = extent;
        self.level_dir = self.paths.level_dir(level);
        self.level = level;
        log::debug!("switched to level {} ({})", level, extent);
        Ok(())
    }

    /// Read a rectangle of `level`
    ///
    /// The rectangle must lie inside the level. Every field is snapped down to
    /// a multiple of 4; a rectangle left with no pixels is rejected.
    pub fn get_range(
        &mut self,
        level: u32,
        start_row: u64,
        start_col: u64,
        rows: u64,
        cols: u64,
    ) -> Result<RangeRead<P>> {
        self.set_level(level)?;
        Rect::new(start_row, start_col, rows, cols).check_within(self.level_extent)?;
        let rect = Rect::new(start_row, start_col, rows, cols).aligned_to_four();
        if rect.is_empty() {
            return Err(StoreError::EmptyRange { rows, cols });
        }

        let plan = RangePlan::new(&self.index, rect);
        let mut pixels = vec![P::default(); rect.area() as usize];
        for span in plan.spans(self.header.capacity) {
            let path = node_path_in(&self.level_dir, span.node);
            let handle = self.cache.put(&path)?;
            let data = self.cache.read(handle);
            check_span(&path, &span, data.len())?;
            let source = &data[span.offset..span.offset + span.len];
            for (pair, pixel) in plan.pairs[span.start..span.start + span.len].iter().zip(source) {
                pixels[pair.slot] = *pixel;
            }
        }
        Ok(RangeRead { rect, pixels })
    }

    /// Every 4-aligned pixel of `level`
    pub fn get_level(&mut self, level: u32) -> Result<RangeRead<P>> {
        self.set_level(level)?;
        let extent = self.level_extent;
        self.get_range(level, 0, 0, extent.rows, extent.cols)
    }

    /// Overwrite a rectangle of `level` with row-major `pixels`
    ///
    /// The rectangle is written exactly as given. Changes reach disk when their
    /// nodes are evicted, on [`DiskReader::flush`], or when the reader drops.
    ///
    /// Every node the rectangle touches is checked for presence and length
    /// before any pixel is copied, so a missing or short node leaves the level
    /// untouched. A write-back failure while evicting can still leave the
    /// rectangle partly applied.
    pub fn set_range(
        &mut self,
        level: u32,
        start_row: u64,
        start_col: u64,
        rows: u64,
        cols: u64,
        pixels: &[P],
    ) -> Result<()> {
        self.set_level(level)?;
        let rect = Rect::new(start_row, start_col, rows, cols);
        rect.check_within(self.level_extent)?;
        if rect.is_empty() {
            return Err(StoreError::EmptyRange { rows, cols });
        }
        if pixels.len() as u64 != rect.area() {
            return Err(StoreError::BufferSize {
                expected: rect.area() as usize,
                actual: pixels.len(),
            });
        }

        let plan = RangePlan::new(&self.index, rect);
        let spans = plan.spans(self.header.capacity);
        for span in &spans {
            let path = node_path_in(&self.level_dir, span.node);
            let bytes = std::fs::metadata(&path).at_path(&path)?.len();
            check_span(&path, span, (bytes / P::SIZE as u64) as usize)?;
        }

        for span in spans {
            let path = node_path_in(&self.level_dir, span.node);
            let handle = self.cache.put(&path)?;
            let data = self.cache.write(handle);
            check_span(&path, &span, data.len())?;
            let target = &mut data[span.offset..span.offset + span.len];
            for (pair, cell) in plan.pairs[span.start..span.start + span.len].iter().zip(target) {
                *cell = pixels[pair.slot];
            }
        }
        Ok(())
    }

    /// Write dirty nodes back to disk
    pub fn flush(&mut self) -> Result<()> {
        self.cache.flush_all()
    }
}

fn check_span(path: &Path, span: &NodeSpan, available: usize) -> Result<()> {
    if span.offset + span.len > available {
        return Err(StoreError::Format(format!(
            "node {} holds {} pixels, range needs {}",
            path.display(),
            available,
            span.offset + span.len
        )));
    }
    Ok(())
}

/// A [`DiskReader`] shared across threads behind one lock
#[derive(Debug)]
pub struct SharedDiskReader<P: Pixel> {
    inner: Arc<Mutex<DiskReader<P>>>,
}

impl<P: Pixel> Clone for SharedDiskReader<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Pixel> SharedDiskReader<P> {
    /// Wrap an open reader
    pub fn new(reader: DiskReader<P>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(reader)),
        }
    }

    /// Open a store with the default cache
    pub fn open(header_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(DiskReader::open(header_path)?))
    }

    /// See [`DiskReader::get_range`]
    pub fn get_range(
        &self,
        level: u32,
        start_row: u64,
        start_col: u64,
        rows: u64,
        cols: u64,
    ) -> Result<RangeRead<P>> {
        self.inner.lock().get_range(level, start_row, start_col, rows, cols)
    }

    /// See [`DiskReader::set_range`]
    pub fn set_range(
        &self,
        level: u32,
        start_row: u64,
        start_col: u64,
        rows: u64,
        cols: u64,
        pixels: &[P],
    ) -> Result<()> {
        self.inner.lock().set_range(level, start_row, start_col, rows, cols, pixels)
    }

    /// See [`DiskReader::flush`]
    pub fn flush(&self) -> Result<()> {
        self.inner.lock().flush()
    }

    /// Run `f` with exclusive access to the reader
    pub fn with<R>(&self, f: impl FnOnce(&mut DiskReader<P>) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockStore;
    use crate::config::StoreConfig;
    use tempfile::TempDir;

    fn written_store(dir: &Path, rows: u64, cols: u64) -> PathBuf {
        let header = dir.join("grid.bigimage");
        let mut store =
            BlockStore::<u32>::new(rows, cols, StoreConfig::default().with_node_bytes(64 * 4))
                .unwrap();
        for row in 0..rows {
            for col in 0..cols {
                store.set_pixel(row, col, (row * 1000 + col) as u32).unwrap();
            }
        }
        store.write(&header).unwrap();
        header
    }

    #[test]
    fn test_read_snaps_to_four() {
        let temp_dir = TempDir::new().unwrap();
        let header = written_store(temp_dir.path(), 20, 24);
        let mut reader = DiskReader::<u32>::open(&header).unwrap();

        let read = reader.get_range(0, 5, 6, 10, 9).unwrap();
        assert_eq!(read.rect, Rect::new(4, 4, 8, 8));
        assert_eq!(read.pixels.len(), 64);
        assert_eq!(read.pixels[0], 4004);
        assert_eq!(read.pixels[9], 5005);
        assert_eq!(read.pixels[63], 11011);
    }

    #[test]
    fn test_parameter_errors() {
        let temp_dir = TempDir::new().unwrap();
        let header = written_store(temp_dir.path(), 16, 16);
        let mut reader = DiskReader::<u32>::open(&header).unwrap();

        assert!(matches!(
            reader.get_range(1, 0, 0, 4, 4),
            Err(StoreError::InvalidLevel { level: 1, max_level: 0 })
        ));
        assert!(matches!(reader.get_range(0, 16, 0, 4, 4), Err(StoreError::OutOfBounds(_))));
        assert!(matches!(reader.get_range(0, 0, 0, 17, 4), Err(StoreError::OutOfBounds(_))));
        assert!(matches!(reader.get_range(0, 2, 2, 3, 8), Err(StoreError::EmptyRange { .. })));
        assert!(matches!(
            reader.set_range(0, 0, 0, 2, 2, &[1, 2, 3]),
            Err(StoreError::BufferSize { expected: 4, actual: 3 })
        ));
    }

    #[test]
    fn test_open_errors() {
        let temp_dir = TempDir::new().unwrap();
        assert!(DiskReader::<u8>::open(temp_dir.path().join("none.bigimage")).unwrap_err().is_io());
        assert!(DiskReader::<u8>::open(temp_dir.path().join("none.txt")).unwrap_err().is_parameter());

        let header = written_store(temp_dir.path(), 8, 8);
        assert!(DiskReader::<u32>::open_with_cache(&header, 0).is_err());
    }

    #[test]
    fn test_missing_node_fails_read() {
        let temp_dir = TempDir::new().unwrap();
        let header = written_store(temp_dir.path(), 16, 16);
        std::fs::remove_file(temp_dir.path().join("grid").join("level_0").join("3")).unwrap();

        let mut reader = DiskReader::<u32>::open(&header).unwrap();
        assert!(reader.get_range(0, 0, 0, 8, 8).is_ok());
        assert!(reader.get_range(0, 8, 8, 8, 8).unwrap_err().is_io());
    }

    #[test]
    fn test_huge_rectangle_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let header = written_store(temp_dir.path(), 16, 16);
        let mut reader = DiskReader::<u32>::open(&header).unwrap();

        assert!(matches!(reader.get_range(0, 4, 0, u64::MAX, 4), Err(StoreError::OutOfBounds(_))));
        assert!(matches!(reader.get_range(0, 0, 4, 4, u64::MAX), Err(StoreError::OutOfBounds(_))));
        assert!(matches!(
            reader.set_range(0, 4, 0, u64::MAX, 4, &[0; 16]),
            Err(StoreError::OutOfBounds(_))
        ));
    }

    #[test]
    fn test_write_with_missing_node_changes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let header = written_store(temp_dir.path(), 16, 16);
        std::fs::remove_file(temp_dir.path().join("grid").join("level_0").join("3")).unwrap();
        {
            let mut reader = DiskReader::<u32>::open(&header).unwrap();
            let err = reader.set_range(0, 0, 0, 16, 16, &[9; 256]).unwrap_err();
            assert!(err.is_io());
            reader.flush().unwrap();
            assert_eq!(reader.cache_stats().write_backs, 0);
        }

        let mut reader = DiskReader::<u32>::open(&header).unwrap();
        let read = reader.get_range(0, 0, 0, 8, 8).unwrap();
        assert_eq!(read.pixels[0], 0);
        assert_eq!(read.pixels[63], 7007);
    }

    #[test]
    fn test_unaligned_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let header = written_store(temp_dir.path(), 16, 16);
        {
            let mut reader = DiskReader::<u32>::open_with_cache(&header, 1).unwrap();
            reader.set_range(0, 1, 2, 3, 5, &[7; 15]).unwrap();
        }

        let mut reader = DiskReader::<u32>::open(&header).unwrap();
        let read = reader.get_range(0, 0, 0, 8, 8).unwrap();
        for row in 0..8u64 {
            for col in 0..8u64 {
                let expected = if (1..4).contains(&row) && (2..7).contains(&col) {
                    7
                } else {
                    (row * 1000 + col) as u32
                };
                assert_eq!(read.pixels[(row * 8 + col) as usize], expected);
            }
        }
    }

    #[test]
    fn test_shared_reader() {
        let temp_dir = TempDir::new().unwrap();
        let header = written_store(temp_dir.path(), 16, 16);
        let shared = SharedDiskReader::<u32>::open(&header).unwrap();

        let handles: Vec<_> = (0..4u64)
            .map(|i| {
                let reader = shared.clone();
                std::thread::spawn(move || reader.get_range(0, i * 4, 0, 4, 16).unwrap())
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            let read = handle.join().unwrap();
            assert_eq!(read.pixels[0], (i as u32) * 4000);
        }
        assert_eq!(shared.with(|r| r.level_extent()), Extent::new(16, 16).unwrap());
    }
}
