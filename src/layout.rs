//! Paths of a store on disk
//!
//! ```text
//! <dir>/<stem>.bigimage          header
//! <dir>/<stem>/level_<k>/<node>  node files
//! <dir>/<stem>.jpg               preview
//! ```

use crate::error::{IoContext, Result, StoreError};
use std::path::{Path, PathBuf};

/// Required header extension
pub const HEADER_EXTENSION: &str = "bigimage";

/// Extension of the preview image
pub const THUMBNAIL_EXTENSION: &str = "jpg";

/// Resolved paths of one store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    header: PathBuf,
    data_dir: PathBuf,
    thumbnail: PathBuf,
}

impl StorePaths {
    /// Resolve paths from a header path
    ///
    /// The header must not be a directory and must end in `.bigimage`.
    pub fn new(header: impl AsRef<Path>) -> Result<Self> {
        let header = header.as_ref();
        if header.is_dir() {
            return Err(StoreError::InvalidParameter(format!(
                "{} is a directory",
                header.display()
            )));
        }
        if header.extension().and_then(|e| e.to_str()) != Some(HEADER_EXTENSION) {
            return Err(StoreError::InvalidParameter(format!(
                "{} does not end in .{}",
                header.display(),
                HEADER_EXTENSION
            )));
        }
        let stem = header.file_stem().ok_or_else(|| {
            StoreError::InvalidParameter(format!("{} has no file stem", header.display()))
        })?;
        let parent = header.parent().unwrap_or_else(|| Path::new(""));

        Ok(Self {
            header: header.to_path_buf(),
            data_dir: parent.join(stem),
            thumbnail: header.with_extension(THUMBNAIL_EXTENSION),
        })
    }

    /// The header file
    pub fn header(&self) -> &Path {
        &self.header
    }

    /// Directory holding every level directory
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Preview image path
    pub fn thumbnail(&self) -> &Path {
        &self.thumbnail
    }

    /// Directory of level `level`
    pub fn level_dir(&self, level: u32) -> PathBuf {
        self.data_dir.join(format!("level_{}", level))
    }

    /// File of node `node` in `level`
    pub fn node_path(&self, level: u32, node: u64) -> PathBuf {
        node_path_in(&self.level_dir(level), node)
    }

    /// Remove a stale data directory left by an earlier write
    pub fn clear_data_dir(&self) -> Result<()> {
        if self.data_dir.exists() {
            log::warn!(
                "removing existing data directory {}",
                self.data_dir.display()
            );
            std::fs::remove_dir_all(&self.data_dir).at_path(&self.data_dir)?;
        }
        Ok(())
    }

    /// Create the directory of `level` (and its parents)
    pub fn create_level_dir(&self, level: u32) -> Result<PathBuf> {
        let dir = self.level_dir(level);
        std::fs::create_dir_all(&dir).at_path(&dir)?;
        Ok(dir)
    }
}

/// Node file `node` inside an already resolved level directory
#[inline]
pub fn node_path_in(level_dir: &Path, node: u64) -> PathBuf {
    level_dir.join(node.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout() {
        let paths = StorePaths::new("/data/scan.bigimage").unwrap();
        assert_eq!(paths.data_dir(), Path::new("/data/scan"));
        assert_eq!(paths.thumbnail(), Path::new("/data/scan.jpg"));
        assert_eq!(paths.node_path(3, 12), PathBuf::from("/data/scan/level_3/12"));
    }

    #[test]
    fn test_rejects_bad_header_paths() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("dir.bigimage");
        std::fs::create_dir(&dir).unwrap();

        assert!(StorePaths::new(&dir).unwrap_err().is_parameter());
        assert!(StorePaths::new(temp_dir.path().join("scan.tif")).is_err());
        assert!(StorePaths::new(temp_dir.path().join("scan")).is_err());
    }

    #[test]
    fn test_clear_data_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StorePaths::new(temp_dir.path().join("a.bigimage")).unwrap();
        let level = paths.create_level_dir(2).unwrap();
        std::fs::write(level.join("0"), b"stale").unwrap();

        paths.clear_data_dir().unwrap();
        assert!(!paths.data_dir().exists());
        // clearing a missing directory is fine
        paths.clear_data_dir().unwrap();
    }
}
