//! Single-level block store
//!
//! Holds the full-resolution image in a [`PixelContainer`] laid out along the
//! configured index and writes it out as a header plus a directory of node
//! files.

use crate::config::StoreConfig;
use crate::container::PixelContainer;
use crate::error::{IoContext, Result, StoreError};
use crate::geometry::{Extent, Rect};
use crate::header::StoreHeader;
use crate::index::{IndexMethod, SpatialIndex};
use crate::layout::{StorePaths, node_path_in};
use crate::level::LevelPlan;
use crate::node::NodeCapacity;
use crate::pixel::Pixel;
use std::path::Path;

/// In-memory image laid out for node-file output
#[derive(Debug)]
pub struct BlockStore<P: Pixel> {
    index: IndexMethod,
    capacity: NodeCapacity,
    plan: LevelPlan,
    container: PixelContainer<P>,
    config: StoreConfig,
}

impl<P: Pixel> BlockStore<P> {
    /// Create a `rows x cols` store filled with `P::default()`
    pub fn new(rows: u64, cols: u64, config: StoreConfig) -> Result<Self> {
        let extent = Extent::new(rows, cols)?;
        let index = IndexMethod::new(config.index, extent)?;
        let capacity = NodeCapacity::from_bytes(config.node_bytes, P::SIZE)?;
        let plan = LevelPlan::new(extent, config.min_rows, config.min_cols);
        let cells = index.max_position().checked_add(1).ok_or_else(|| {
            StoreError::InvalidParameter(format!("{} cells of {} overflow u64", index.name(), extent))
        })?;
        let container = PixelContainer::new(cells, &config.backing)?;

        log::debug!(
            "block store {} with {} ({} cells, {} pixels per node)",
            extent,
            index.name(),
            container.len(),
            capacity.size()
        );

        Ok(Self {
            index,
            capacity,
            plan,
            container,
            config,
        })
    }

    /// Full-resolution extent
    pub fn extent(&self) -> Extent {
        self.index.extent()
    }

    /// Index of level 0
    pub fn index(&self) -> &IndexMethod {
        &self.index
    }

    /// Pixels per node file
    pub fn capacity(&self) -> NodeCapacity {
        self.capacity
    }

    /// Level plan derived from the configured minimum resolution
    pub fn plan(&self) -> LevelPlan {
        self.plan
    }

    /// Configuration the store was created with
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Underlying cells in curve order
    pub fn container(&self) -> &PixelContainer<P> {
        &self.container
    }

    /// Header describing this store as a plain block store
    pub fn header(&self) -> StoreHeader {
        StoreHeader::for_block(&self.index, self.capacity, &self.plan)
    }

    /// Cell at curve position `position`
    pub fn at(&self, position: u64) -> Result<P> {
        self.check_position(position)?;
        Ok(self.container.get(position))
    }

    /// Overwrite the cell at curve position `position`
    pub fn set_at(&mut self, position: u64, pixel: P) -> Result<()> {
        self.check_position(position)?;
        self.container.set(position, pixel);
        Ok(())
    }

    /// Pixel at `(row, col)`
    pub fn pixel(&self, row: u64, col: u64) -> Result<P> {
        self.check_pixel(row, col)?;
        Ok(self.container.get(self.index.position(row, col)))
    }

    /// Overwrite the pixel at `(row, col)`
    pub fn set_pixel(&mut self, row: u64, col: u64, pixel: P) -> Result<()> {
        self.check_pixel(row, col)?;
        self.container.set(self.index.position(row, col), pixel);
        Ok(())
    }

    /// Row-major copy of the inclusive rectangle `[min_row, max_row] x [min_col, max_col]`
    pub fn get(&self, min_row: u64, max_row: u64, min_col: u64, max_col: u64) -> Result<Vec<P>> {
        let rect = self.inclusive_rect(min_row, max_row, min_col, max_col)?;
        let mut out = Vec::with_capacity(rect.area() as usize);
        for row in rect.row..rect.row + rect.rows {
            let partial = self.index.row_partial(row);
            for col in rect.col..rect.col + rect.cols {
                out.push(self.container.get(self.index.position_from_partial(partial, col)));
            }
        }
        Ok(out)
    }

    /// Write a row-major buffer into the inclusive rectangle
    pub fn set(
        &mut self,
        min_row: u64,
        max_row: u64,
        min_col: u64,
        max_col: u64,
        pixels: &[P],
    ) -> Result<()> {
        let rect = self.inclusive_rect(min_row, max_row, min_col, max_col)?;
        if pixels.len() as u64 != rect.area() {
            return Err(StoreError::BufferSize {
                expected: rect.area() as usize,
                actual: pixels.len(),
            });
        }
        let mut source = pixels.iter();
        for row in rect.row..rect.row + rect.rows {
            let partial = self.index.row_partial(row);
            for col in rect.col..rect.col + rect.cols {
                if let Some(pixel) = source.next() {
                    self.container.set(self.index.position_from_partial(partial, col), *pixel);
                }
            }
        }
        Ok(())
    }

    /// Set every cell, padding included, to `pixel`
    pub fn fill(&mut self, pixel: P) {
        self.container.fill(pixel);
    }

    /// Write the header and level 0 under `header_path`
    ///
    /// A stale data directory is removed first. Nothing is rolled back on
    /// failure.
    pub fn write(&self, header_path: impl AsRef<Path>) -> Result<()> {
        let paths = StorePaths::new(header_path)?;
        self.header().write(paths.header())?;
        paths.clear_data_dir()?;
        let dir = paths.create_level_dir(0)?;

        let positions = self.container.len();
        let nodes = self.capacity.node_count(positions);
        let mut buffer = Vec::with_capacity((self.capacity.size().min(positions)) as usize * P::SIZE);
        for node in 0..nodes {
            let start = node << self.capacity.shift();
            let end = start + self.capacity.node_len(node, positions);
            buffer.clear();
            self.container.encode_range(start..end, &mut buffer);
            let path = node_path_in(&dir, node);
            std::fs::write(&path, &buffer).at_path(&path)?;
            log::debug!("wrote node {} ({} pixels)", path.display(), end - start);
        }

        log::info!(
            "wrote block store {} ({}, {} nodes)",
            paths.header().display(),
            self.extent(),
            nodes
        );
        Ok(())
    }

    fn check_position(&self, position: u64) -> Result<()> {
        if position >= self.container.len() {
            return Err(StoreError::OutOfBounds(format!(
                "position {} outside {} cells",
                position,
                self.container.len()
            )));
        }
        Ok(())
    }

    fn check_pixel(&self, row: u64, col: u64) -> Result<()> {
        let extent = self.extent();
        if !extent.contains(row, col) {
            return Err(StoreError::OutOfBounds(format!(
                "pixel ({}, {}) outside {}",
                row, col, extent
            )));
        }
        Ok(())
    }

    fn inclusive_rect(&self, min_row: u64, max_row: u64, min_col: u64, max_col: u64) -> Result<Rect> {
        if min_row > max_row || min_col > max_col {
            return Err(StoreError::OutOfBounds(format!(
                "inverted rectangle rows {}..={} cols {}..={}",
                min_row, max_row, min_col, max_col
            )));
        }
        self.check_pixel(max_row, max_col)?;
        Ok(Rect::new(min_row, min_col, max_row - min_row + 1, max_col - min_col + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexKind;
    use crate::pixel::Rgb8;
    use tempfile::TempDir;

    fn config() -> StoreConfig {
        StoreConfig::default().with_node_bytes(16 * 3).with_min_size(2, 2)
    }

    #[test]
    fn test_pixel_access() {
        let mut store = BlockStore::<Rgb8>::new(6, 5, config()).unwrap();
        store.set_pixel(5, 4, Rgb8::new(1, 2, 3)).unwrap();
        assert_eq!(store.pixel(5, 4).unwrap(), Rgb8::new(1, 2, 3));

        let position = store.index().position(5, 4);
        assert_eq!(store.at(position).unwrap(), Rgb8::new(1, 2, 3));
        store.set_at(position, Rgb8::new(7, 7, 7)).unwrap();
        assert_eq!(store.pixel(5, 4).unwrap(), Rgb8::new(7, 7, 7));

        assert!(store.pixel(6, 0).unwrap_err().is_parameter());
        assert!(store.at(store.container().len()).is_err());
    }

    #[test]
    fn test_rectangle_round_trip() {
        let mut store = BlockStore::<u16>::new(9, 7, config()).unwrap();
        let values: Vec<u16> = (0..12).collect();
        store.set(2, 4, 3, 6, &values).unwrap();
        assert_eq!(store.get(2, 4, 3, 6).unwrap(), values);
        assert_eq!(store.pixel(3, 3).unwrap(), 4);

        assert!(matches!(
            store.set(0, 1, 0, 1, &values),
            Err(StoreError::BufferSize { expected: 4, actual: 12 })
        ));
        assert!(store.get(3, 2, 0, 0).is_err());
        assert!(store.get(0, 9, 0, 0).is_err());
    }

    #[test]
    fn test_rectangle_past_u64_rejected() {
        let mut store = BlockStore::<u8>::new(8, 8, config()).unwrap();
        assert!(matches!(store.get(0, u64::MAX, 0, 0), Err(StoreError::OutOfBounds(_))));
        assert!(matches!(store.get(0, 0, 0, u64::MAX), Err(StoreError::OutOfBounds(_))));
        assert!(matches!(store.set(0, u64::MAX, 0, 0, &[1]), Err(StoreError::OutOfBounds(_))));
    }

    #[test]
    fn test_cell_count_overflow_rejected() {
        let side = crate::index::zorder::MAX_COORDINATE;
        let err = BlockStore::<u8>::new(side, side, config()).unwrap_err();
        assert!(err.is_parameter());

        let tiled = config().with_index(IndexKind::Block2D {
            row_shift: 0,
            col_shift: 0,
        });
        assert!(BlockStore::<u8>::new(1 << 40, 1 << 40, tiled).unwrap_err().is_parameter());
    }

    #[test]
    fn test_write_node_files() {
        let temp_dir = TempDir::new().unwrap();
        let header = temp_dir.path().join("img.bigimage");
        let mut store = BlockStore::<Rgb8>::new(5, 5, config()).unwrap();
        store.fill(Rgb8::new(4, 4, 4));
        store.write(&header).unwrap();

        // 5x5 Z-order spans 49 cells, 16 per node
        let level = temp_dir.path().join("img").join("level_0");
        let sizes: Vec<u64> = (0..4)
            .map(|n| std::fs::metadata(level.join(n.to_string())).unwrap().len())
            .collect();
        assert_eq!(sizes, vec![48, 48, 48, 3]);
        assert!(!level.join("4").exists());

        let parsed = StoreHeader::read(&header).unwrap();
        assert_eq!(parsed, store.header());
        assert_eq!(parsed.max_level, None);
    }

    #[test]
    fn test_write_replaces_stale_data() {
        let temp_dir = TempDir::new().unwrap();
        let header = temp_dir.path().join("img.bigimage");
        let stale = temp_dir.path().join("img").join("level_3");
        std::fs::create_dir_all(&stale).unwrap();

        let store = BlockStore::<u8>::new(4, 4, config()).unwrap();
        store.write(&header).unwrap();
        assert!(!stale.exists());
    }

    #[test]
    fn test_block_index_store() {
        let config = config().with_index(IndexKind::Block2D {
            row_shift: 1,
            col_shift: 2,
        });
        let mut store = BlockStore::<u8>::new(6, 6, config).unwrap();
        // 3 x 2 tiles of 8
        assert_eq!(store.container().len(), 48);
        store.set_pixel(5, 5, 9).unwrap();
        assert_eq!(store.get(4, 5, 4, 5).unwrap(), vec![0, 0, 0, 9]);
    }
}
