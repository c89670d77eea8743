//! Z-order (Morton) index
//!
//! Row bits occupy the odd bit positions of a position and column bits the
//! even ones: bit `2i+1` comes from bit `i` of the row, bit `2i` from bit `i`
//! of the column. Coordinates are limited to 32 bits so every position fits in
//! a `u64`.
//!
//! Shifting a position right by `2k` drops the low `k` bits of both
//! coordinates, which is what lets pyramid levels be derived by decimation.

use super::{SpatialIndex, ZORDER_INTUITION_NAME, ZORDER_NAME};
use crate::error::{Result, StoreError};
use crate::geometry::Extent;

/// Largest coordinate count per axis
pub const MAX_COORDINATE: u64 = 1 << 32;

const B: [u64; 5] = [
    0x5555_5555_5555_5555,
    0x3333_3333_3333_3333,
    0x0F0F_0F0F_0F0F_0F0F,
    0x00FF_00FF_00FF_00FF,
    0x0000_FFFF_0000_FFFF,
];
const S: [u32; 5] = [1, 2, 4, 8, 16];

/// Spread the low 32 bits of `v` onto the even bit positions
#[inline(always)]
pub fn spread_bits(v: u64) -> u64 {
    let mut x = v & 0xFFFF_FFFF;
    x = (x | (x << S[4])) & B[4];
    x = (x | (x << S[3])) & B[3];
    x = (x | (x << S[2])) & B[2];
    x = (x | (x << S[1])) & B[1];
    x = (x | (x << S[0])) & B[0];
    x
}

/// Gather the even bit positions of `v` into its low 32 bits
#[inline(always)]
pub fn compact_bits(v: u64) -> u64 {
    let mut x = v & B[0];
    x = (x | (x >> S[0])) & B[1];
    x = (x | (x >> S[1])) & B[2];
    x = (x | (x >> S[2])) & B[3];
    x = (x | (x >> S[3])) & B[4];
    x = (x | (x >> S[4])) & 0x0000_0000_FFFF_FFFF;
    x
}

fn check_extent(extent: Extent) -> Result<()> {
    if extent.rows > MAX_COORDINATE || extent.cols > MAX_COORDINATE {
        return Err(StoreError::InvalidParameter(format!(
            "extent {} exceeds the 32-bit Z-order coordinate range",
            extent
        )));
    }
    // a full 2^32 x 2^32 extent would need 2^64 cells
    let last = spread_bits(extent.cols - 1) | (spread_bits(extent.rows - 1) << 1);
    if last == u64::MAX {
        return Err(StoreError::InvalidParameter(format!(
            "extent {} needs more than u64::MAX cells",
            extent
        )));
    }
    Ok(())
}

/// Branch-free Z-order index using magic-constant bit spreading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZOrderIndex {
    extent: Extent,
}

impl ZOrderIndex {
    /// Create the index for `extent`
    pub fn new(extent: Extent) -> Result<Self> {
        check_extent(extent)?;
        Ok(Self { extent })
    }
}

impl SpatialIndex for ZOrderIndex {
    #[inline]
    fn position(&self, row: u64, col: u64) -> u64 {
        spread_bits(col) | (spread_bits(row) << 1)
    }

    #[inline]
    fn row_partial(&self, row: u64) -> u64 {
        spread_bits(row) << 1
    }

    #[inline]
    fn position_from_partial(&self, row_partial: u64, col: u64) -> u64 {
        spread_bits(col) | row_partial
    }

    #[inline]
    fn origin(&self, position: u64) -> (u64, u64) {
        (compact_bits(position >> 1), compact_bits(position))
    }

    fn max_position(&self) -> u64 {
        self.position(self.extent.rows - 1, self.extent.cols - 1)
    }

    fn name(&self) -> &'static str {
        ZORDER_NAME
    }

    fn extent(&self) -> Extent {
        self.extent
    }
}

/// Z-order index computed one bit at a time from precomputed masks
///
/// Produces exactly the same positions as [`ZOrderIndex`]; stores written
/// with either name are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZOrderIntuitionIndex {
    extent: Extent,
    row_marks: [u64; 32],
    col_marks: [u64; 32],
}

impl ZOrderIntuitionIndex {
    /// Create the index for `extent`
    pub fn new(extent: Extent) -> Result<Self> {
        check_extent(extent)?;
        let mut row_marks = [0u64; 32];
        let mut col_marks = [0u64; 32];
        for bit in 0..32 {
            col_marks[bit] = 1 << (2 * bit);
            row_marks[bit] = 1 << (2 * bit + 1);
        }
        Ok(Self {
            extent,
            row_marks,
            col_marks,
        })
    }

    #[inline]
    fn scatter(marks: &[u64; 32], mut value: u64) -> u64 {
        let mut result = 0;
        let mut bit = 0;
        while value != 0 && bit < 32 {
            if value & 1 == 1 {
                result |= marks[bit];
            }
            value >>= 1;
            bit += 1;
        }
        result
    }
}

impl SpatialIndex for ZOrderIntuitionIndex {
    fn position(&self, row: u64, col: u64) -> u64 {
        Self::scatter(&self.row_marks, row) | Self::scatter(&self.col_marks, col)
    }

    fn row_partial(&self, row: u64) -> u64 {
        Self::scatter(&self.row_marks, row)
    }

    fn position_from_partial(&self, row_partial: u64, col: u64) -> u64 {
        row_partial | Self::scatter(&self.col_marks, col)
    }

    fn origin(&self, mut position: u64) -> (u64, u64) {
        let (mut row, mut col) = (0u64, 0u64);
        let mut bit = 0;
        while position != 0 {
            if position & 1 == 1 {
                col |= 1 << bit;
            }
            position >>= 1;
            if position & 1 == 1 {
                row |= 1 << bit;
            }
            position >>= 1;
            bit += 1;
        }
        (row, col)
    }

    fn max_position(&self) -> u64 {
        self.position(self.extent.rows - 1, self.extent.cols - 1)
    }

    fn name(&self) -> &'static str {
        ZORDER_INTUITION_NAME
    }

    fn extent(&self) -> Extent {
        self.extent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::quickcheck;

    fn index(rows: u64, cols: u64) -> ZOrderIndex {
        ZOrderIndex::new(Extent::new(rows, cols).unwrap()).unwrap()
    }

    #[test]
    fn test_bit_layout() {
        let z = index(16, 16);
        // row bits land on odd positions, col bits on even ones
        assert_eq!(z.position(0, 1), 0b01);
        assert_eq!(z.position(1, 0), 0b10);
        assert_eq!(z.position(1, 1), 0b11);
        assert_eq!(z.position(2, 0), 0b1000);
        assert_eq!(z.position(0, 2), 0b0100);
        assert_eq!(z.position(3, 5), 0b011011);
    }

    #[test]
    fn test_max_position_for_non_square_extent() {
        let z = index(3, 5);
        assert_eq!(z.max_position(), z.position(2, 4));
        // 3x5 wastes positions: 15 pixels need 25 cells
        assert_eq!(z.max_position(), 24);
        assert!(z.max_position() + 1 > 15);
    }

    #[test]
    fn test_oversized_extent_rejected() {
        let extent = Extent::new(MAX_COORDINATE + 1, 1).unwrap();
        assert!(ZOrderIndex::new(extent).is_err());
        assert!(ZOrderIntuitionIndex::new(extent).is_err());

        let full = Extent::new(MAX_COORDINATE, MAX_COORDINATE).unwrap();
        assert!(ZOrderIndex::new(full).unwrap_err().is_parameter());
        assert!(ZOrderIntuitionIndex::new(full).unwrap_err().is_parameter());

        let widest = ZOrderIndex::new(Extent::new(MAX_COORDINATE, MAX_COORDINATE - 1).unwrap()).unwrap();
        assert_eq!(widest.max_position(), u64::MAX - 1);
    }

    #[test]
    fn test_decimation_identity() {
        let full = index(256, 192);
        for k in 0..6u32 {
            let level = index(256 >> k, 192 >> k);
            let step = 1u64 << k;
            for row in (0..256).step_by(step as usize) {
                for col in (0..192).step_by(step as usize) {
                    assert_eq!(
                        level.position(row >> k, col >> k),
                        full.position(row, col) >> (2 * k)
                    );
                }
            }
        }
    }

    #[test]
    fn test_variants_agree() {
        let extent = Extent::new(70, 33).unwrap();
        let fast = ZOrderIndex::new(extent).unwrap();
        let slow = ZOrderIntuitionIndex::new(extent).unwrap();
        assert_eq!(fast.max_position(), slow.max_position());
        for row in 0..70 {
            assert_eq!(fast.row_partial(row), slow.row_partial(row));
            for col in 0..33 {
                let pos = fast.position(row, col);
                assert_eq!(pos, slow.position(row, col));
                assert_eq!(slow.origin(pos), (row, col));
            }
        }
    }

    quickcheck! {
        fn prop_origin_inverts_position(row: u32, col: u32) -> bool {
            let z = index(MAX_COORDINATE, MAX_COORDINATE);
            let (row, col) = (u64::from(row), u64::from(col));
            z.origin(z.position(row, col)) == (row, col)
        }

        fn prop_spread_compact_round_trip(v: u32) -> bool {
            compact_bits(spread_bits(u64::from(v))) == u64::from(v)
        }

        fn prop_intuition_matches_magic(row: u32, col: u32) -> bool {
            let extent = Extent::new(MAX_COORDINATE, MAX_COORDINATE).unwrap();
            let fast = ZOrderIndex::new(extent).unwrap();
            let slow = ZOrderIntuitionIndex::new(extent).unwrap();
            let (row, col) = (u64::from(row), u64::from(col));
            fast.position(row, col) == slow.position(row, col)
        }
    }
}
