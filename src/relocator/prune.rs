//! Recursive empty-directory detection and pruning.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::FileRelocator;

/// Whether `dir` holds no files anywhere beneath it.
///
/// Subdirectories are followed; anything else (regular files, symlinks,
/// sockets, ...) counts as content.
///
/// # Errors
///
/// Returns an error if any directory in the tree cannot be read.
pub fn contains_no_files(dir: &Path) -> io::Result<bool> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if !file_type.is_dir() || !contains_no_files(&entry.path())? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Remove `dir` and any empty subdirectories, bottom-up.
///
/// Uses `remove_dir` only, so a file appearing concurrently makes this
/// fail instead of being deleted.
///
/// # Errors
///
/// Returns the first error encountered.
pub fn remove_empty_tree(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            remove_empty_tree(&entry.path())?;
        }
    }
    fs::remove_dir(dir)
}

pub(super) fn prune_upwards(relocator: &FileRelocator, original_path: &Path) -> Vec<PathBuf> {
    let mut pruned = Vec::new();

    if relocator.relative_path_from(original_path).is_none() {
        return pruned;
    }

    let mut current = original_path.parent().map(Path::to_path_buf);
    while let Some(dir) = current {
        if relocator.is_source_root(&dir) || relocator.relative_path_from(&dir).is_none() {
            break;
        }

        if super::exists_no_follow(&dir) {
            match contains_no_files(&dir) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    tracing::debug!(dir = %dir.display(), error = %e, "Stopped pruning");
                    break;
                }
            }
            if let Err(e) = remove_empty_tree(&dir) {
                tracing::debug!(dir = %dir.display(), error = %e, "Stopped pruning");
                break;
            }
            tracing::info!(dir = %dir.display(), "Removed empty directory");
            pruned.push(dir.clone());
        }

        current = dir.parent().map(Path::to_path_buf);
    }

    pruned
}
