//! File fingerprints for change detection without reading content.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// (modification time, size) snapshot of one file.
///
/// Equality is by value: a file is considered changed when either field differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFingerprint {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Last modification time, if the platform reports one.
    pub modified: Option<SystemTime>,
    /// Size in bytes.
    pub size: u64,
}

impl FileFingerprint {
    /// Read the fingerprint of `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be stat'ed.
    pub fn capture(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            modified: metadata.modified().ok(),
            size: metadata.len(),
        })
    }

    /// Whether the file differs from `previous`.
    #[must_use]
    pub fn differs_from(&self, previous: &Self) -> bool {
        self.modified != previous.modified || self.size != previous.size
    }
}

/// Current size of `path`, or `None` if it is gone or not a file.
pub(crate) fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(fs::Metadata::is_file)
        .map(|m| m.len())
}
