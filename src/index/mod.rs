//! Space-filling curve index strategies
//!
//! An index maps a pixel coordinate to its position on disk and back. The
//! strategy is chosen once, when a store is created, and its name is persisted
//! in the store header; readers rebuild the same strategy from that name.
//!
//! Strategies are a closed set, so dispatch goes through the [`IndexMethod`]
//! enum rather than trait objects.

pub mod block;
pub mod zorder;

pub use block::Block2DIndex;
pub use zorder::{ZOrderIndex, ZOrderIntuitionIndex};

use crate::config::IndexKind;
use crate::error::{Result, StoreError};
use crate::geometry::Extent;

/// Header name of [`ZOrderIndex`]
pub const ZORDER_NAME: &str = "ZOrderIndex";

/// Header name of [`ZOrderIntuitionIndex`]
pub const ZORDER_INTUITION_NAME: &str = "ZOrderIndexIntuition";

/// Header name of [`Block2DIndex`]
pub const BLOCK2D_NAME: &str = "Block2DIndex";

/// Coordinate to position mapping for one image extent
///
/// Implementations are bijections from the extent onto a subset of
/// `0..=max_position()`; positions outside the image are allowed to exist
/// (they are padding on disk) but two pixels never share a position.
pub trait SpatialIndex {
    /// Position of `(row, col)`
    fn position(&self, row: u64, col: u64) -> u64;

    /// Part of the position that depends only on `row`
    ///
    /// Combine with [`SpatialIndex::position_from_partial`] when walking a row.
    fn row_partial(&self, row: u64) -> u64;

    /// Finish a position from a [`SpatialIndex::row_partial`] result
    fn position_from_partial(&self, row_partial: u64, col: u64) -> u64;

    /// Inverse of [`SpatialIndex::position`]
    fn origin(&self, position: u64) -> (u64, u64);

    /// Largest position used by this extent; containers hold `max_position() + 1` cells
    fn max_position(&self) -> u64;

    /// Name persisted in the store header
    fn name(&self) -> &'static str;

    /// The extent this index was built for
    fn extent(&self) -> Extent;
}

/// Index strategy selected from a store header or a [`StoreConfig`](crate::StoreConfig)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexMethod {
    /// Magic-constant Z-order
    ZOrder(ZOrderIndex),
    /// Bit-by-bit Z-order
    ZOrderIntuition(ZOrderIntuitionIndex),
    /// Fixed-size tiles
    Block2D(Block2DIndex),
}

impl IndexMethod {
    /// Build the strategy described by `kind` for `extent`
    pub fn new(kind: IndexKind, extent: Extent) -> Result<Self> {
        Ok(match kind {
            IndexKind::ZOrder => IndexMethod::ZOrder(ZOrderIndex::new(extent)?),
            IndexKind::ZOrderIntuition => {
                IndexMethod::ZOrderIntuition(ZOrderIntuitionIndex::new(extent)?)
            }
            IndexKind::Block2D {
                row_shift,
                col_shift,
            } => IndexMethod::Block2D(Block2DIndex::new(extent, row_shift, col_shift)?),
        })
    }

    /// Build the strategy named in a store header
    ///
    /// `block_shifts` is only consulted for [`BLOCK2D_NAME`].
    pub fn from_header(name: &str, extent: Extent, block_shifts: Option<(u32, u32)>) -> Result<Self> {
        let kind = match name {
            ZORDER_NAME => IndexKind::ZOrder,
            ZORDER_INTUITION_NAME => IndexKind::ZOrderIntuition,
            BLOCK2D_NAME => {
                let (row_shift, col_shift) = block_shifts.ok_or_else(|| {
                    StoreError::Format("Block2DIndex header without block shifts".to_string())
                })?;
                IndexKind::Block2D {
                    row_shift,
                    col_shift,
                }
            }
            other => return Err(StoreError::Format(format!("unknown index method '{}'", other))),
        };
        Self::new(kind, extent)
    }

    /// The configuration kind of this strategy
    pub fn kind(&self) -> IndexKind {
        match self {
            IndexMethod::ZOrder(_) => IndexKind::ZOrder,
            IndexMethod::ZOrderIntuition(_) => IndexKind::ZOrderIntuition,
            IndexMethod::Block2D(b) => IndexKind::Block2D {
                row_shift: b.row_shift(),
                col_shift: b.col_shift(),
            },
        }
    }

    /// Same strategy rebuilt for another extent (used when switching levels)
    pub fn with_extent(&self, extent: Extent) -> Result<Self> {
        Self::new(self.kind(), extent)
    }

    /// Whether decimating every `4^k`-th position yields level `k`
    ///
    /// Holds for the Z-order variants only; pyramid stores require it.
    pub fn supports_decimation(&self) -> bool {
        !matches!(self, IndexMethod::Block2D(_))
    }

    /// Tile shifts for the header, if this is a block index
    pub fn block_shifts(&self) -> Option<(u32, u32)> {
        match self {
            IndexMethod::Block2D(b) => Some((b.row_shift(), b.col_shift())),
            _ => None,
        }
    }
}

impl SpatialIndex for IndexMethod {
    #[inline]
    fn position(&self, row: u64, col: u64) -> u64 {
        match self {
            IndexMethod::ZOrder(i) => i.position(row, col),
            IndexMethod::ZOrderIntuition(i) => i.position(row, col),
            IndexMethod::Block2D(i) => i.position(row, col),
        }
    }

    #[inline]
    fn row_partial(&self, row: u64) -> u64 {
        match self {
            IndexMethod::ZOrder(i) => i.row_partial(row),
            IndexMethod::ZOrderIntuition(i) => i.row_partial(row),
            IndexMethod::Block2D(i) => i.row_partial(row),
        }
    }

    #[inline]
    fn position_from_partial(&self, row_partial: u64, col: u64) -> u64 {
        match self {
            IndexMethod::ZOrder(i) => i.position_from_partial(row_partial, col),
            IndexMethod::ZOrderIntuition(i) => i.position_from_partial(row_partial, col),
            IndexMethod::Block2D(i) => i.position_from_partial(row_partial, col),
        }
    }

    #[inline]
    fn origin(&self, position: u64) -> (u64, u64) {
        match self {
            IndexMethod::ZOrder(i) => i.origin(position),
            IndexMethod::ZOrderIntuition(i) => i.origin(position),
            IndexMethod::Block2D(i) => i.origin(position),
        }
    }

    fn max_position(&self) -> u64 {
        match self {
            IndexMethod::ZOrder(i) => i.max_position(),
            IndexMethod::ZOrderIntuition(i) => i.max_position(),
            IndexMethod::Block2D(i) => i.max_position(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            IndexMethod::ZOrder(i) => i.name(),
            IndexMethod::ZOrderIntuition(i) => i.name(),
            IndexMethod::Block2D(i) => i.name(),
        }
    }

    fn extent(&self) -> Extent {
        match self {
            IndexMethod::ZOrder(i) => i.extent(),
            IndexMethod::ZOrderIntuition(i) => i.extent(),
            IndexMethod::Block2D(i) => i.extent(),
        }
    }
}
