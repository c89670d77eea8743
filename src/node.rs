//! Node capacity
//!
//! A node is one file holding a contiguous run of positions. Its capacity is a
//! power of two so that the node of a position is a shift and the offset inside
//! the node is a mask.

use crate::error::{Result, StoreError};

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Largest supported node shift
pub const MAX_NODE_SHIFT: u32 = 40;

/// Number of pixels per node file, always a power of two
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct NodeCapacity {
    shift: u32,
}

impl NodeCapacity {
    /// Largest power-of-two pixel count fitting in `bytes` (at least one pixel)
    pub fn from_bytes(bytes: u64, pixel_size: usize) -> Result<Self> {
        if pixel_size == 0 {
            return Err(StoreError::InvalidParameter("pixel size must be non-zero".to_string()));
        }
        let pixels = bytes / pixel_size as u64;
        if pixels == 0 {
            return Ok(Self { shift: 0 });
        }
        Self::from_shift((63 - pixels.leading_zeros()).min(MAX_NODE_SHIFT))
    }

    /// Capacity of `2^shift` pixels
    pub fn from_shift(shift: u32) -> Result<Self> {
        if shift > MAX_NODE_SHIFT {
            return Err(StoreError::InvalidParameter(format!(
                "node shift {} exceeds {}",
                shift, MAX_NODE_SHIFT
            )));
        }
        Ok(Self { shift })
    }

    /// Pixels per node
    #[inline]
    pub fn size(&self) -> u64 {
        1 << self.shift
    }

    /// log2 of [`NodeCapacity::size`]
    #[inline]
    pub fn shift(&self) -> u32 {
        self.shift
    }

    /// `size() - 1`
    #[inline]
    pub fn mask(&self) -> u64 {
        self.size() - 1
    }

    /// Node index and offset inside the node for `position`
    #[inline]
    pub fn locate(&self, position: u64) -> (u64, u64) {
        (position >> self.shift, position & self.mask())
    }

    /// Number of node files needed for `positions` cells
    pub fn node_count(&self, positions: u64) -> u64 {
        crate::geometry::ceil_shift(positions, self.shift)
    }

    /// Pixels stored in node `node` when the level has `positions` cells
    ///
    /// Every node is full except possibly the last one.
    pub fn node_len(&self, node: u64, positions: u64) -> u64 {
        let start = node << self.shift;
        positions.saturating_sub(start).min(self.size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounds_down_to_power_of_two() {
        let cap = NodeCapacity::from_bytes(3 * 1000, 3).unwrap();
        assert_eq!(cap.size(), 512);
        assert_eq!(cap.shift(), 9);
        assert_eq!(cap.mask(), 511);

        let cap = NodeCapacity::from_bytes(3 * 1024 * 1024, 3).unwrap();
        assert_eq!(cap.size(), 1 << 20);
    }

    #[test]
    fn test_tiny_node_holds_one_pixel() {
        let cap = NodeCapacity::from_bytes(2, 6).unwrap();
        assert_eq!(cap.size(), 1);
        assert_eq!(cap.mask(), 0);
        assert!(NodeCapacity::from_bytes(64, 0).is_err());
    }

    #[test]
    fn test_locate_and_short_last_node() {
        let cap = NodeCapacity::from_shift(4).unwrap();
        assert_eq!(cap.locate(0), (0, 0));
        assert_eq!(cap.locate(37), (2, 5));
        assert_eq!(cap.node_count(37), 3);
        assert_eq!(cap.node_count(48), 3);
        assert_eq!(cap.node_len(0, 37), 16);
        assert_eq!(cap.node_len(2, 37), 5);
        assert_eq!(cap.node_len(3, 37), 0);
    }
}
