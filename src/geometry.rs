//! Image extents and rectangles
//!
//! Rows and columns are `u64` throughout; positions on the curve are `u64` as
//! well so that callers never mix narrower coordinate types with positions.

use crate::error::{Result, StoreError};

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Size of an image or of one pyramid level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct Extent {
    /// Number of rows
    pub rows: u64,
    /// Number of columns
    pub cols: u64,
}

impl Extent {
    /// Create an extent, rejecting zero dimensions
    pub fn new(rows: u64, cols: u64) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(StoreError::InvalidExtent { rows, cols });
        }
        Ok(Self { rows, cols })
    }

    /// Number of pixels inside the extent
    pub fn area(&self) -> u64 {
        self.rows * self.cols
    }

    /// Extent of pyramid level `level`: `ceil(rows / 2^level) x ceil(cols / 2^level)`
    pub fn at_level(&self, level: u32) -> Extent {
        Extent {
            rows: ceil_shift(self.rows, level),
            cols: ceil_shift(self.cols, level),
        }
    }

    /// Whether `(row, col)` lies inside the extent
    #[inline]
    pub fn contains(&self, row: u64, col: u64) -> bool {
        row < self.rows && col < self.cols
    }
}

impl std::fmt::Display for Extent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// `ceil(value / 2^shift)` without floating point
#[inline]
pub(crate) fn ceil_shift(value: u64, shift: u32) -> u64 {
    if shift >= 64 {
        return u64::from(value > 0);
    }
    let floor = value >> shift;
    if floor << shift == value { floor } else { floor + 1 }
}

/// A rectangle of pixels, top-left corner plus size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct Rect {
    /// Top row
    pub row: u64,
    /// Left column
    pub col: u64,
    /// Number of rows
    pub rows: u64,
    /// Number of columns
    pub cols: u64,
}

impl Rect {
    /// Create a rectangle
    pub fn new(row: u64, col: u64, rows: u64, cols: u64) -> Self {
        Self {
            row,
            col,
            rows,
            cols,
        }
    }

    /// Number of pixels in the rectangle
    pub fn area(&self) -> u64 {
        self.rows * self.cols
    }

    /// True when the rectangle holds no pixels
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Snap every field down to a multiple of 4
    pub fn aligned_to_four(&self) -> Rect {
        Rect {
            row: floor_four(self.row),
            col: floor_four(self.col),
            rows: floor_four(self.rows),
            cols: floor_four(self.cols),
        }
    }

    /// Check that the rectangle starts inside `extent` and does not run past it
    pub fn check_within(&self, extent: Extent) -> Result<()> {
        check_axis("row", self.row, self.rows, extent.rows)?;
        check_axis("col", self.col, self.cols, extent.cols)
    }
}

fn check_axis(axis: &str, start: u64, len: u64, limit: u64) -> Result<()> {
    if start >= limit {
        return Err(StoreError::OutOfBounds(format!(
            "start {} {} outside {} {}s",
            axis, start, limit, axis
        )));
    }
    match start.checked_add(len) {
        Some(end) if end <= limit => Ok(()),
        _ => Err(StoreError::OutOfBounds(format!(
            "{} {}s from {} exceed {} {}s",
            len, axis, start, limit, axis
        ))),
    }
}

#[inline]
fn floor_four(value: u64) -> u64 {
    value & !3
}
