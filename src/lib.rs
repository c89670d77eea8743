//! BigImage: out-of-core image storage over a Z-order curve
//!
//! This crate persists images far larger than main memory as a directory of
//! fixed-size node files and serves arbitrary rectangular reads back from disk
//! through a small node cache. Pixels are laid out along a space-filling curve
//! so that nearby pixels land in the same node, and a multi-resolution pyramid
//! is derived from the full-resolution level in a single linear pass.

#![warn(missing_docs)]

/// Geometry types shared across the store
pub mod geometry;

/// Pixel cell types and their byte codec
pub mod pixel;

/// Space-filling curve index strategies
pub mod index;

/// Node capacity and node file naming
pub mod node;

/// On-disk layout of a store
pub mod layout;

/// Text header of a store
pub mod header;

/// Resolution level planning
pub mod level;

/// Backing storage for the full-resolution pixels
pub mod container;

/// Bounded cache of node buffers
pub mod cache;

/// Single-level block store
pub mod block;

/// Multi-resolution pyramid store
pub mod pyramid;

/// Range query decomposition into on-disk runs
pub mod range;

/// Read-only (and in-place update) access to written stores
pub mod reader;

/// Preview image rendering
pub mod thumbnail;


// Re-exports
pub use block::BlockStore;
pub use cache::{CacheStats, NodeCache, SlotHandle};
pub use config::{Backing, IndexKind, StoreConfig};
pub use container::PixelContainer;
pub use geometry::{Extent, Rect};
pub use error::{Result, StoreError};
pub use header::StoreHeader;
pub use index::{Block2DIndex, IndexMethod, SpatialIndex, ZOrderIndex, ZOrderIntuitionIndex};
pub use level::LevelPlan;
pub use node::NodeCapacity;
pub use pixel::{Pixel, Rgb, Rgb16, Rgb8};
pub use pyramid::{PyramidState, PyramidStore};
pub use reader::{DiskReader, RangeRead, SharedDiskReader};

/// Error types for store operations
pub mod error {
    use std::io;
    use std::path::PathBuf;
    use thiserror::Error;

    /// Result alias used throughout the crate
    pub type Result<T> = std::result::Result<T, StoreError>;

    /// Errors raised by the storage engine
    ///
    /// Parameter errors are recoverable by adjusting the request. I/O errors
    /// carry the path that failed. `Allocation` is kept apart from both: it
    /// means the image does not fit the available memory and the store being
    /// built is unusable.
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// I/O error on a specific path
        #[error("I/O error on {path}: {source}")]
        Io {
            /// The file or directory involved
            path: PathBuf,
            /// Underlying error
            #[source]
            source: io::Error,
        },

        /// I/O error without path context
        #[error("I/O error: {0}")]
        RawIo(#[from] io::Error),

        /// Image extent with a zero dimension
        #[error("invalid extent {rows}x{cols}")]
        InvalidExtent {
            /// Requested rows
            rows: u64,
            /// Requested cols
            cols: u64,
        },

        /// Level outside `0..=max_level`
        #[error("invalid level {level} (max level is {max_level})")]
        InvalidLevel {
            /// Requested level
            level: u32,
            /// Largest level of the store
            max_level: u32,
        },

        /// Rectangle or coordinate outside the current extent
        #[error("out of bounds: {0}")]
        OutOfBounds(String),

        /// Rectangle that is empty after the 4-pixel alignment floor
        #[error("range {rows}x{cols} is empty after alignment")]
        EmptyRange {
            /// Requested rows
            rows: u64,
            /// Requested cols
            cols: u64,
        },

        /// Caller buffer does not match the rectangle size
        #[error("buffer holds {actual} pixels, expected {expected}")]
        BufferSize {
            /// Pixels required
            expected: usize,
            /// Pixels supplied
            actual: usize,
        },

        /// Index method that cannot serve the requested operation
        #[error("unsupported index method: {0}")]
        UnsupportedIndex(String),

        /// Other invalid argument
        #[error("invalid parameter: {0}")]
        InvalidParameter(String),

        /// Malformed header file
        #[error("header format error: {0}")]
        Format(String),

        /// Container allocation failed
        #[error("failed to allocate {bytes} bytes for the pixel container")]
        Allocation {
            /// Bytes requested
            bytes: u64,
        },

        /// Preview or export image could not be encoded
        #[error("image error: {0}")]
        Image(#[from] image::ImageError),

        /// Operation not allowed in the current store state
        #[error("invalid state: {0}")]
        InvalidState(String),
    }

    impl StoreError {
        /// Attach a path to an I/O error
        pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
            StoreError::Io {
                path: path.into(),
                source,
            }
        }

        /// True for missing, unreadable or unwritable files and directories
        pub fn is_io(&self) -> bool {
            matches!(self, StoreError::Io { .. } | StoreError::RawIo(_))
        }

        /// True for errors the caller can fix by changing its request
        pub fn is_parameter(&self) -> bool {
            matches!(
                self,
                StoreError::InvalidExtent { .. }
                    | StoreError::InvalidLevel { .. }
                    | StoreError::OutOfBounds(_)
                    | StoreError::EmptyRange { .. }
                    | StoreError::BufferSize { .. }
                    | StoreError::UnsupportedIndex(_)
                    | StoreError::InvalidParameter(_)
            )
        }

        /// True when the pixel container could not be allocated
        pub fn is_allocation(&self) -> bool {
            matches!(self, StoreError::Allocation { .. })
        }
    }

    /// Extension for attaching paths to `io::Result`
    pub(crate) trait IoContext<T> {
        fn at_path(self, path: &std::path::Path) -> Result<T>;
    }

    impl<T> IoContext<T> for std::result::Result<T, io::Error> {
        fn at_path(self, path: &std::path::Path) -> Result<T> {
            self.map_err(|e| StoreError::io(path, e))
        }
    }
}

/// Configuration options for creating stores
pub mod config {
    use std::path::PathBuf;

    #[cfg(feature = "serialization")]
    use serde::{Deserialize, Serialize};

    /// Default bytes per node file (1M cells of a 3-byte pixel)
    pub const DEFAULT_NODE_BYTES: u64 = 3 * 1024 * 1024;

    /// Default node cache capacity
    pub const DEFAULT_CACHE_NODES: usize = 16;

    /// Default requested minimum resolution
    pub const DEFAULT_MIN_SIZE: u64 = 256;

    /// Index strategy for a new store
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
    pub enum IndexKind {
        /// Magic-constant Z-order
        ZOrder,
        /// Bit-by-bit Z-order (same layout as `ZOrder`)
        ZOrderIntuition,
        /// Fixed tiles of `2^row_shift x 2^col_shift`
        Block2D {
            /// log2 of the tile height
            row_shift: u32,
            /// log2 of the tile width
            col_shift: u32,
        },
    }

    /// Where the full-resolution pixels live while a store is being built
    #[derive(Debug, Clone, PartialEq, Eq)]
    #[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
    pub enum Backing {
        /// Heap allocation
        Memory,
        /// Memory-mapped scratch file at the given path
        Mapped(PathBuf),
    }

    /// Configuration for a block or pyramid store
    #[derive(Debug, Clone)]
    #[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
    pub struct StoreConfig {
        /// Bytes per node file, rounded down to a power-of-two pixel count
        pub node_bytes: u64,
        /// Requested minimum rows of the coarsest level
        pub min_rows: u64,
        /// Requested minimum cols of the coarsest level
        pub min_cols: u64,
        /// Index strategy
        pub index: IndexKind,
        /// Levels written per scan of the base data (`None` = all at once)
        pub concurrent_levels: Option<usize>,
        /// Node cache capacity for readers opened by the store
        pub cache_nodes: usize,
        /// Pixel container backing
        pub backing: Backing,
        /// Whether pyramid writes save a `<stem>.jpg` preview
        pub thumbnail: bool,
    }

    impl Default for StoreConfig {
        fn default() -> Self {
            Self {
                node_bytes: DEFAULT_NODE_BYTES,
                min_rows: DEFAULT_MIN_SIZE,
                min_cols: DEFAULT_MIN_SIZE,
                index: IndexKind::ZOrder,
                concurrent_levels: None,
                cache_nodes: DEFAULT_CACHE_NODES,
                backing: Backing::Memory,
                thumbnail: true,
            }
        }
    }

    impl StoreConfig {
        /// Set the node size in bytes
        pub fn with_node_bytes(mut self, bytes: u64) -> Self {
            self.node_bytes = bytes;
            self
        }

        /// Set the requested minimum resolution
        pub fn with_min_size(mut self, rows: u64, cols: u64) -> Self {
            self.min_rows = rows;
            self.min_cols = cols;
            self
        }

        /// Set the index strategy
        pub fn with_index(mut self, index: IndexKind) -> Self {
            self.index = index;
            self
        }

        /// Set how many levels are written per scan
        pub fn with_concurrent_levels(mut self, ways: usize) -> Self {
            self.concurrent_levels = Some(ways);
            self
        }

        /// Set the node cache capacity
        pub fn with_cache_nodes(mut self, nodes: usize) -> Self {
            self.cache_nodes = nodes;
            self
        }

        /// Back the container with a memory-mapped scratch file
        pub fn with_mapped_backing<P: Into<PathBuf>>(mut self, path: P) -> Self {
            self.backing = Backing::Mapped(path.into());
            self
        }

        /// Enable or disable the preview image
        pub fn with_thumbnail(mut self, enabled: bool) -> Self {
            self.thumbnail = enabled;
            self
        }
    }
}
