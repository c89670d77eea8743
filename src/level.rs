//! Pyramid level planning

use crate::geometry::{Extent, ceil_shift};

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// `floor(log2(value))`, with `floor_log2(0) == 0`
#[inline]
pub fn floor_log2(value: u64) -> u32 {
    if value == 0 { 0 } else { 63 - value.leading_zeros() }
}

/// Number of levels and the size of the coarsest one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct LevelPlan {
    /// Index of the coarsest level
    pub max_level: u32,
    /// Rows of the coarsest level
    pub mini_rows: u64,
    /// Cols of the coarsest level
    pub mini_cols: u64,
}

impl LevelPlan {
    /// Plan levels for `extent` so the coarsest level is no smaller than the request
    ///
    /// A zero minimum counts as 1 and a minimum larger than the extent is
    /// clamped to it.
    pub fn new(extent: Extent, min_rows: u64, min_cols: u64) -> Self {
        let min_rows = min_rows.clamp(1, extent.rows);
        let min_cols = min_cols.clamp(1, extent.cols);
        let max_level = floor_log2(extent.rows / min_rows).min(floor_log2(extent.cols / min_cols));
        Self {
            max_level,
            mini_rows: ceil_shift(extent.rows, max_level),
            mini_cols: ceil_shift(extent.cols, max_level),
        }
    }

    /// Number of levels including level 0
    pub fn level_count(&self) -> u32 {
        self.max_level + 1
    }
}
