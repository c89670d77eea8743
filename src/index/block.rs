//! Tiled block index
//!
//! The image is cut into tiles of `2^row_shift x 2^col_shift` pixels. Tiles
//! are numbered in row-major order and pixels inside a tile are row-major too,
//! so one tile is one contiguous run of positions.

use super::{BLOCK2D_NAME, SpatialIndex};
use crate::error::{Result, StoreError};
use crate::geometry::{Extent, ceil_shift};
use crate::level::floor_log2;

/// Index laying out fixed-size tiles one after another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block2DIndex {
    extent: Extent,
    row_shift: u32,
    col_shift: u32,
    block_rows: u64,
    block_cols: u64,
    cells: u64,
}

impl Block2DIndex {
    /// Create the index; each tile shift must not exceed `floor(log2)` of its axis
    pub fn new(extent: Extent, row_shift: u32, col_shift: u32) -> Result<Self> {
        if row_shift > floor_log2(extent.rows) {
            return Err(StoreError::InvalidParameter(format!(
                "block row shift {} too large for {} rows",
                row_shift, extent.rows
            )));
        }
        if col_shift > floor_log2(extent.cols) {
            return Err(StoreError::InvalidParameter(format!(
                "block col shift {} too large for {} cols",
                col_shift, extent.cols
            )));
        }
        let block_rows = ceil_shift(extent.rows, row_shift);
        let block_cols = ceil_shift(extent.cols, col_shift);
        let cells = 1u64
            .checked_shl(row_shift + col_shift)
            .and_then(|tile| block_rows.checked_mul(block_cols)?.checked_mul(tile))
            .ok_or_else(|| {
                StoreError::InvalidParameter(format!(
                    "{} tiles of 2^{} x 2^{} over {} overflow u64",
                    BLOCK2D_NAME, row_shift, col_shift, extent
                ))
            })?;
        Ok(Self {
            extent,
            row_shift,
            col_shift,
            block_rows,
            block_cols,
            cells,
        })
    }

    /// log2 of the tile height
    pub fn row_shift(&self) -> u32 {
        self.row_shift
    }

    /// log2 of the tile width
    pub fn col_shift(&self) -> u32 {
        self.col_shift
    }

    /// Number of tiles along each axis
    pub fn block_counts(&self) -> (u64, u64) {
        (self.block_rows, self.block_cols)
    }

    #[inline]
    fn tile_shift(&self) -> u32 {
        self.row_shift + self.col_shift
    }
}

impl SpatialIndex for Block2DIndex {
    #[inline]
    fn position(&self, row: u64, col: u64) -> u64 {
        self.position_from_partial(self.row_partial(row), col)
    }

    #[inline]
    fn row_partial(&self, row: u64) -> u64 {
        let bx = row >> self.row_shift;
        let dx = row - (bx << self.row_shift);
        ((bx * self.block_cols) << self.tile_shift()) + (dx << self.col_shift)
    }

    #[inline]
    fn position_from_partial(&self, row_partial: u64, col: u64) -> u64 {
        let by = col >> self.col_shift;
        let dy = col - (by << self.col_shift);
        row_partial + (by << self.tile_shift()) + dy
    }

    fn origin(&self, position: u64) -> (u64, u64) {
        let tile = position >> self.tile_shift();
        let within = position - (tile << self.tile_shift());
        let bx = tile / self.block_cols;
        let by = tile - bx * self.block_cols;
        let dx = within >> self.col_shift;
        let dy = within - (dx << self.col_shift);
        ((bx << self.row_shift) + dx, (by << self.col_shift) + dy)
    }

    fn max_position(&self) -> u64 {
        self.cells - 1
    }

    fn name(&self) -> &'static str {
        BLOCK2D_NAME
    }

    fn extent(&self) -> Extent {
        self.extent
    }
}
