//! Store header
//!
//! A small text file of `key=value` lines next to the data directory. Parsing
//! is key-based: unknown keys are skipped so newer writers stay readable.

use crate::error::{IoContext, Result, StoreError};
use crate::geometry::Extent;
use crate::index::{BLOCK2D_NAME, IndexMethod, SpatialIndex};
use crate::level::LevelPlan;
use crate::node::NodeCapacity;
use ahash::AHashMap;
use std::fmt::Write as _;
use std::path::Path;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Value of the `type` key
pub const STORE_TYPE: &str = "BlockwiseImage";

const KEY_TYPE: &str = "type";
const KEY_ROWS: &str = "rows";
const KEY_COLS: &str = "cols";
const KEY_NODE_SIZE: &str = "filenodesize";
const KEY_NODE_SHIFT: &str = "filenodeshiftnum";
const KEY_INDEX: &str = "indexmethod";
const KEY_BLOCK_ROW_SHIFT: &str = "blockrowshift";
const KEY_BLOCK_COL_SHIFT: &str = "blockcolshift";
const KEY_MINI_ROWS: &str = "minirows";
const KEY_MINI_COLS: &str = "minicols";
const KEY_MAX_LEVEL: &str = "maxlevel";

/// Parsed contents of a `.bigimage` header
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct StoreHeader {
    /// Full-resolution extent
    pub extent: Extent,
    /// Pixels per node file
    pub capacity: NodeCapacity,
    /// Persisted index name
    pub index_name: String,
    /// Tile shifts of a `Block2DIndex` store
    pub block_shifts: Option<(u32, u32)>,
    /// Rows of the coarsest level
    pub mini_rows: u64,
    /// Cols of the coarsest level
    pub mini_cols: u64,
    /// Largest level, `None` for a plain block store
    pub max_level: Option<u32>,
}

impl StoreHeader {
    /// Header of a block store built with `index`
    pub fn for_block(index: &IndexMethod, capacity: NodeCapacity, plan: &LevelPlan) -> Self {
        Self {
            extent: index.extent(),
            capacity,
            index_name: index.name().to_string(),
            block_shifts: index.block_shifts(),
            mini_rows: plan.mini_rows,
            mini_cols: plan.mini_cols,
            max_level: None,
        }
    }

    /// Same header with the pyramid `maxlevel` line
    pub fn with_max_level(mut self, max_level: u32) -> Self {
        self.max_level = Some(max_level);
        self
    }

    /// Largest level (0 for plain block stores)
    pub fn max_level(&self) -> u32 {
        self.max_level.unwrap_or(0)
    }

    /// Rebuild the full-resolution index named by this header
    pub fn index(&self) -> Result<IndexMethod> {
        IndexMethod::from_header(&self.index_name, self.extent, self.block_shifts)
    }

    /// Render as header text
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = writeln!(out, "{}={}", KEY_TYPE, STORE_TYPE);
        let _ = writeln!(out, "{}={}", KEY_ROWS, self.extent.rows);
        let _ = writeln!(out, "{}={}", KEY_COLS, self.extent.cols);
        let _ = writeln!(out, "{}={}", KEY_NODE_SIZE, self.capacity.size());
        let _ = writeln!(out, "{}={}", KEY_NODE_SHIFT, self.capacity.shift());
        let _ = writeln!(out, "{}={}", KEY_INDEX, self.index_name);
        if let Some((row_shift, col_shift)) = self.block_shifts {
            let _ = writeln!(out, "{}={}", KEY_BLOCK_ROW_SHIFT, row_shift);
            let _ = writeln!(out, "{}={}", KEY_BLOCK_COL_SHIFT, col_shift);
        }
        let _ = writeln!(out, "{}={}", KEY_MINI_ROWS, self.mini_rows);
        let _ = writeln!(out, "{}={}", KEY_MINI_COLS, self.mini_cols);
        if let Some(max_level) = self.max_level {
            let _ = writeln!(out, "{}={}", KEY_MAX_LEVEL, max_level);
        }
        out
    }

    /// Parse header text
    pub fn parse(text: &str) -> Result<Self> {
        let mut fields: AHashMap<&str, &str> = AHashMap::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                StoreError::Format(format!("line {} is not key=value: '{}'", number + 1, line))
            })?;
            if fields.insert(key.trim(), value.trim()).is_some() {
                return Err(StoreError::Format(format!("duplicate key '{}'", key.trim())));
            }
        }

        let store_type = required(&fields, KEY_TYPE)?;
        if store_type != STORE_TYPE {
            return Err(StoreError::Format(format!("unknown store type '{}'", store_type)));
        }

        let rows = number(&fields, KEY_ROWS)?;
        let cols = number(&fields, KEY_COLS)?;
        let extent = Extent::new(rows, cols)
            .map_err(|_| StoreError::Format(format!("zero extent {}x{}", rows, cols)))?;

        let node_size = number(&fields, KEY_NODE_SIZE)?;
        let node_shift = number(&fields, KEY_NODE_SHIFT)?;
        let capacity = u32::try_from(node_shift)
            .ok()
            .and_then(|shift| NodeCapacity::from_shift(shift).ok())
            .ok_or_else(|| StoreError::Format(format!("bad node shift {}", node_shift)))?;
        if capacity.size() != node_size {
            return Err(StoreError::Format(format!(
                "filenodesize {} does not match filenodeshiftnum {}",
                node_size, node_shift
            )));
        }

        let index_name = required(&fields, KEY_INDEX)?.to_string();
        let block_shifts = if index_name == BLOCK2D_NAME {
            Some((shift(&fields, KEY_BLOCK_ROW_SHIFT)?, shift(&fields, KEY_BLOCK_COL_SHIFT)?))
        } else {
            None
        };

        let max_level = match fields.get(KEY_MAX_LEVEL) {
            Some(_) => Some(shift(&fields, KEY_MAX_LEVEL)?),
            None => None,
        };

        Ok(Self {
            extent,
            capacity,
            index_name,
            block_shifts,
            mini_rows: number(&fields, KEY_MINI_ROWS)?,
            mini_cols: number(&fields, KEY_MINI_COLS)?,
            max_level,
        })
    }

    /// Read and parse a header file
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).at_path(path)?;
        Self::parse(&text)
    }

    /// Write the header file, replacing any existing one
    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_text()).at_path(path)
    }
}

fn required<'a>(fields: &AHashMap<&str, &'a str>, key: &str) -> Result<&'a str> {
    fields
        .get(key)
        .copied()
        .ok_or_else(|| StoreError::Format(format!("missing key '{}'", key)))
}

fn number(fields: &AHashMap<&str, &str>, key: &str) -> Result<u64> {
    let value = required(fields, key)?;
    value
        .parse()
        .map_err(|_| StoreError::Format(format!("'{}' is not a number for key '{}'", value, key)))
}

fn shift(fields: &AHashMap<&str, &str>, key: &str) -> Result<u32> {
    let value = number(fields, key)?;
    u32::try_from(value)
        .ok()
        .filter(|v| *v < 64)
        .ok_or_else(|| StoreError::Format(format!("{} out of range for key '{}'", value, key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexKind;
    use tempfile::TempDir;

    fn sample() -> StoreHeader {
        let extent = Extent::new(1000, 600).unwrap();
        let index = IndexMethod::new(IndexKind::ZOrder, extent).unwrap();
        let plan = LevelPlan::new(extent, 100, 100);
        StoreHeader::for_block(&index, NodeCapacity::from_shift(10).unwrap(), &plan)
    }

    #[test]
    fn test_text_layout() {
        let header = sample().with_max_level(2);
        let text = header.to_text();
        let keys: Vec<&str> = text.lines().map(|l| l.split('=').next().unwrap()).collect();
        assert_eq!(
            keys,
            vec![
                "type",
                "rows",
                "cols",
                "filenodesize",
                "filenodeshiftnum",
                "indexmethod",
                "minirows",
                "minicols",
                "maxlevel"
            ]
        );
        assert!(text.contains("filenodesize=1024\n"));
        assert!(text.contains("minirows=250\n"));
        assert_eq!(StoreHeader::parse(&text).unwrap(), header);
    }

    #[test]
    fn test_block_shifts_follow_index_name() {
        let extent = Extent::new(64, 64).unwrap();
        let kind = IndexKind::Block2D {
            row_shift: 3,
            col_shift: 2,
        };
        let index = IndexMethod::new(kind, extent).unwrap();
        let header = StoreHeader::for_block(
            &index,
            NodeCapacity::from_shift(6).unwrap(),
            &LevelPlan::new(extent, 64, 64),
        );
        let text = header.to_text();
        assert!(text.contains("indexmethod=Block2DIndex\nblockrowshift=3\nblockcolshift=2\n"));

        let parsed = StoreHeader::parse(&text).unwrap();
        assert_eq!(parsed.max_level(), 0);
        assert_eq!(parsed.index().unwrap(), index);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let text = format!("{}comment=hello\n\n", sample().to_text());
        assert_eq!(StoreHeader::parse(&text).unwrap(), sample());
    }

    #[test]
    fn test_malformed_headers() {
        let good = sample().to_text();
        let cases = [
            good.replace("type=BlockwiseImage", "type=Other"),
            good.replace("filenodesize=1024", "filenodesize=1000"),
            good.replace("rows=1000", "rows=abc"),
            good.replace("minicols=150\n", ""),
            format!("{}rows=5\n", good),
            format!("{}garbage\n", good),
        ];
        for text in cases {
            let err = StoreHeader::parse(&text).unwrap_err();
            assert!(matches!(err, StoreError::Format(_)), "accepted: {}", text);
        }
    }

    #[test]
    fn test_file_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("img.bigimage");
        let header = sample().with_max_level(2);
        header.write(&path).unwrap();
        assert_eq!(StoreHeader::read(&path).unwrap(), header);
        assert!(StoreHeader::read(&temp_dir.path().join("none.bigimage")).unwrap_err().is_io());
    }
}
