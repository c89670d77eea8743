//! Pyramid store
//!
//! Level `k` keeps every `2^k`-th row and column of the base image. Under a
//! Z-order index those are exactly the positions divisible by `4^k`, and
//! `position_k = position_0 >> 2k`, so each level is produced by streaming
//! the base cells once and keeping every `4^k`-th one. Several levels can
//! share a single scan; [`PyramidStore::set_concurrent_levels`] sets how many.

use crate::block::BlockStore;
use crate::config::StoreConfig;
use crate::error::{IoContext, Result, StoreError};
use crate::geometry::Extent;
use crate::header::StoreHeader;
use crate::index::SpatialIndex;
use crate::layout::{StorePaths, node_path_in};
use crate::level::LevelPlan;
use crate::node::NodeCapacity;
use crate::pixel::Pixel;
use crate::reader::DiskReader;
use crate::thumbnail;
use smallvec::SmallVec;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Write progress of a pyramid store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PyramidState {
    /// Nothing written yet
    Unwritten,
    /// Scanning the group of levels starting at `group_start`
    Writing {
        /// First level of the current group
        group_start: u32,
    },
    /// Every level and the header are on disk
    Written,
    /// A write failed; the instance refuses further writes
    Failed,
}

/// Streams one level into consecutive node files
struct LevelWriter<P> {
    level: u32,
    dir: PathBuf,
    capacity: NodeCapacity,
    emitted: u64,
    file: Option<(PathBuf, BufWriter<File>)>,
    scratch: Vec<u8>,
    _pixel: std::marker::PhantomData<P>,
}

impl<P: Pixel> LevelWriter<P> {
    fn new(level: u32, dir: PathBuf, capacity: NodeCapacity) -> Self {
        Self {
            level,
            dir,
            capacity,
            emitted: 0,
            file: None,
            scratch: vec![0; P::SIZE],
            _pixel: std::marker::PhantomData,
        }
    }

    fn push(&mut self, pixel: &P) -> Result<()> {
        if self.emitted & self.capacity.mask() == 0 {
            self.rotate()?;
        }
        pixel.encode(&mut self.scratch);
        if let Some((path, writer)) = self.file.as_mut() {
            writer.write_all(&self.scratch).at_path(path)?;
        }
        self.emitted += 1;
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        self.close()?;
        let path = node_path_in(&self.dir, self.emitted >> self.capacity.shift());
        let file = File::create(&path).at_path(&path)?;
        self.file = Some((path, BufWriter::new(file)));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some((path, mut writer)) = self.file.take() {
            writer.flush().at_path(&path)?;
            log::debug!("wrote node {}", path.display());
        }
        Ok(())
    }
}

/// Block store that also writes every coarser level
#[derive(Debug)]
pub struct PyramidStore<P: Pixel> {
    base: BlockStore<P>,
    concurrent_levels: u32,
    state: PyramidState,
}

impl<P: Pixel> PyramidStore<P> {
    /// Create a `rows x cols` pyramid; the index must be a Z-order variant
    pub fn new(rows: u64, cols: u64, config: StoreConfig) -> Result<Self> {
        let base = BlockStore::new(rows, cols, config)?;
        if !base.index().supports_decimation() {
            return Err(StoreError::UnsupportedIndex(format!(
                "{} cannot derive pyramid levels",
                base.index().name()
            )));
        }
        let levels = base.plan().level_count();
        let concurrent_levels = match base.config().concurrent_levels {
            Some(ways) => clamp_ways(ways, levels),
            None => levels,
        };
        Ok(Self {
            base,
            concurrent_levels,
            state: PyramidState::Unwritten,
        })
    }

    /// Full-resolution store
    pub fn base(&self) -> &BlockStore<P> {
        &self.base
    }

    /// Mutable full-resolution store, for filling pixels before writing
    pub fn base_mut(&mut self) -> &mut BlockStore<P> {
        &mut self.base
    }

    /// Full-resolution extent
    pub fn extent(&self) -> Extent {
        self.base.extent()
    }

    /// Level plan
    pub fn plan(&self) -> LevelPlan {
        self.base.plan()
    }

    /// Largest level
    pub fn max_level(&self) -> u32 {
        self.base.plan().max_level
    }

    /// Current write state
    pub fn state(&self) -> PyramidState {
        self.state
    }

    /// Overwrite the pixel at `(row, col)` of level 0
    pub fn set_pixel(&mut self, row: u64, col: u64, pixel: P) -> Result<()> {
        self.base.set_pixel(row, col, pixel)
    }

    /// Pixel at `(row, col)` of level 0
    pub fn pixel(&self, row: u64, col: u64) -> Result<P> {
        self.base.pixel(row, col)
    }

    /// Levels produced per scan of the base cells, clamped to `1..=max_level + 1`
    pub fn set_concurrent_levels(&mut self, ways: usize) {
        self.concurrent_levels = clamp_ways(ways, self.plan().level_count());
    }

    /// Levels produced per scan
    pub fn concurrent_levels(&self) -> u32 {
        self.concurrent_levels
    }

    /// Number of scans a write performs
    pub fn scan_count(&self) -> u32 {
        self.plan().level_count().div_ceil(self.concurrent_levels)
    }

    /// Header including `maxlevel`
    pub fn header(&self) -> StoreHeader {
        self.base.header().with_max_level(self.max_level())
    }

    /// Write the header, every level and the preview
    ///
    /// A failed write leaves the instance in [`PyramidState::Failed`].
    pub fn write(&mut self, header_path: impl AsRef<Path>) -> Result<()> {
        if self.state == PyramidState::Failed {
            return Err(StoreError::InvalidState(
                "an earlier write failed; create a new store".to_string(),
            ));
        }
        let paths = StorePaths::new(header_path)?;
        match self.write_levels(&paths) {
            Ok(()) => self.state = PyramidState::Written,
            Err(e) => {
                self.state = PyramidState::Failed;
                return Err(e);
            }
        }
        log::info!(
            "wrote pyramid {} ({}, {} levels in {} scans)",
            paths.header().display(),
            self.extent(),
            self.plan().level_count(),
            self.scan_count()
        );

        if self.base.config().thumbnail {
            self.write_thumbnail(&paths);
        }
        Ok(())
    }

    fn write_levels(&mut self, paths: &StorePaths) -> Result<()> {
        self.header().write(paths.header())?;
        paths.clear_data_dir()?;

        let levels = self.plan().level_count();
        let mut group_start = 0;
        while group_start < levels {
            let group_end = (group_start + self.concurrent_levels).min(levels);
            self.state = PyramidState::Writing { group_start };
            self.scan_group(paths, group_start..group_end)?;
            group_start = group_end;
        }
        Ok(())
    }

    fn scan_group(&self, paths: &StorePaths, group: std::ops::Range<u32>) -> Result<()> {
        let capacity = self.base.capacity();
        let mut writers: SmallVec<[LevelWriter<P>; 8]> = SmallVec::new();
        for level in group.clone() {
            let dir = paths.create_level_dir(level)?;
            writers.push(LevelWriter::new(level, dir, capacity));
        }
        log::debug!("scanning base cells for levels {:?}", group);

        let container = self.base.container();
        for position in 0..container.len() {
            let mut pixel = None;
            for writer in writers.iter_mut() {
                // levels ascend, so a miss here misses every later level too
                if position & level_mask(writer.level) != 0 {
                    break;
                }
                let value = *pixel.get_or_insert_with(|| container.get(position));
                writer.push(&value)?;
            }
        }

        for writer in writers.iter_mut() {
            writer.close()?;
            let expected = self
                .base
                .index()
                .with_extent(self.extent().at_level(writer.level))?
                .max_position()
                + 1;
            if writer.emitted != expected {
                return Err(StoreError::InvalidState(format!(
                    "level {} emitted {} cells, expected {}",
                    writer.level, writer.emitted, expected
                )));
            }
        }
        Ok(())
    }

    fn write_thumbnail(&self, paths: &StorePaths) {
        let level = self.max_level();
        let extent = self.extent().at_level(level);
        if extent.rows < 4 || extent.cols < 4 {
            log::info!("level {} is {}; skipping preview", level, extent);
            return;
        }
        let result = DiskReader::<P>::open_with_cache(paths.header(), self.base.config().cache_nodes)
            .and_then(|mut reader| reader.get_level(level))
            .and_then(|read| {
                thumbnail::save_rgb8(paths.thumbnail(), read.rect.rows, read.rect.cols, &read.pixels)
            });
        if let Err(e) = result {
            log::warn!("failed to write preview {}: {}", paths.thumbnail().display(), e);
        }
    }
}

/// `4^level - 1`
fn level_mask(level: u32) -> u64 {
    1u64.checked_shl(2 * level).map_or(u64::MAX, |step| step - 1)
}

fn clamp_ways(ways: usize, levels: u32) -> u32 {
    u32::try_from(ways).unwrap_or(u32::MAX).clamp(1, levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexKind;
    use crate::pixel::Rgb8;
    use tempfile::TempDir;

    fn config() -> StoreConfig {
        StoreConfig::default()
            .with_node_bytes(64 * 3)
            .with_min_size(4, 4)
            .with_thumbnail(false)
    }

    #[test]
    fn test_block_index_rejected() {
        let config = config().with_index(IndexKind::Block2D {
            row_shift: 2,
            col_shift: 2,
        });
        let err = PyramidStore::<Rgb8>::new(32, 32, config).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedIndex(_)));
    }

    #[test]
    fn test_scan_count() {
        let mut store = PyramidStore::<Rgb8>::new(64, 64, config()).unwrap();
        assert_eq!(store.max_level(), 4);
        assert_eq!(store.scan_count(), 1);
        store.set_concurrent_levels(2);
        assert_eq!(store.scan_count(), 3);
        store.set_concurrent_levels(0);
        assert_eq!(store.concurrent_levels(), 1);
        assert_eq!(store.scan_count(), 5);
        store.set_concurrent_levels(100);
        assert_eq!(store.concurrent_levels(), 5);
    }

    #[test]
    fn test_level_files() {
        let temp_dir = TempDir::new().unwrap();
        let header = temp_dir.path().join("p.bigimage");
        let mut store = PyramidStore::<Rgb8>::new(32, 32, config()).unwrap();
        store.write(&header).unwrap();
        assert_eq!(store.state(), PyramidState::Written);

        // 1024, 256, 64 and 16 cells with 64 per node
        for (level, nodes, last) in [(0, 16, 64), (1, 4, 64), (2, 1, 64), (3, 1, 16)] {
            let dir = temp_dir.path().join("p").join(format!("level_{}", level));
            let count = std::fs::read_dir(&dir).unwrap().count();
            assert_eq!(count, nodes, "level {}", level);
            let last_len = std::fs::metadata(dir.join((nodes - 1).to_string())).unwrap().len();
            assert_eq!(last_len, last * 3);
        }
        assert_eq!(StoreHeader::read(&header).unwrap().max_level, Some(3));
    }

    #[test]
    fn test_failed_write_poisons_store() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("p");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let mut store = PyramidStore::<u8>::new(16, 16, config()).unwrap();
        let header = temp_dir.path().join("p.bigimage");
        // the data directory cannot be cleared or created over a regular file
        assert!(store.write(&header).is_err());
        assert_eq!(store.state(), PyramidState::Failed);

        std::fs::remove_file(&blocker).unwrap();
        assert!(matches!(store.write(&header), Err(StoreError::InvalidState(_))));
    }

    #[test]
    fn test_thumbnail_written() {
        let temp_dir = TempDir::new().unwrap();
        let header = temp_dir.path().join("t.bigimage");
        let mut store =
            PyramidStore::<Rgb8>::new(64, 48, config().with_min_size(8, 8).with_thumbnail(true))
                .unwrap();
        store.base_mut().fill(Rgb8::new(200, 100, 50));
        store.write(&header).unwrap();

        let preview = image::open(temp_dir.path().join("t.jpg")).unwrap();
        // level 2 is 16x12
        assert_eq!((preview.width(), preview.height()), (12, 16));
    }
}
