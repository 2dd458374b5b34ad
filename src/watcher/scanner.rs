//! Recursive enumeration of the source tree.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::WatcherError;
use crate::relocator::contains_no_files;

/// All regular files beneath `root`, in traversal order (sorted by name per directory).
///
/// Entries that vanish or cannot be read mid-walk are skipped.
///
/// # Errors
///
/// Returns an error if `root` itself cannot be read.
pub fn list_files(root: &Path) -> Result<Vec<PathBuf>, WatcherError> {
    ensure_readable(root)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unreadable entry");
            }
        }
    }
    Ok(files)
}

/// Top-most directories beneath `root` (never `root` itself) with no files anywhere below them.
///
/// # Errors
///
/// Returns an error if `root` itself cannot be read.
pub fn find_empty_directories(root: &Path) -> Result<Vec<PathBuf>, WatcherError> {
    ensure_readable(root)?;

    let mut empty = Vec::new();
    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name().into_iter();
    while let Some(entry) = walker.next() {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_dir() {
            continue;
        }
        if matches!(contains_no_files(entry.path()), Ok(true)) {
            empty.push(entry.into_path());
            walker.skip_current_dir();
        }
    }
    Ok(empty)
}

/// Whether `root` is a directory whose entries can be listed.
#[must_use]
pub fn is_readable_dir(root: &Path) -> bool {
    ensure_readable(root).is_ok()
}

fn ensure_readable(root: &Path) -> Result<(), WatcherError> {
    fs::read_dir(root)
        .map(drop)
        .map_err(|e| WatcherError::SourceUnavailable {
            path: root.display().to_string(),
            reason: e.to_string(),
        })
}
