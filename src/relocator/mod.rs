//! Structure-preserving file relocation.
//!
//! This module provides:
//! - Moves from the source tree into the saved/error trees
//! - Numbered conflict resolution (`name_001.ext`)
//! - Pruning of directories left empty by a move

mod prune;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;

use uuid::Uuid;

use crate::config::RetryPolicy;
use crate::error::RelocateError;

pub use prune::{contains_no_files, remove_empty_tree};

/// Highest numeric suffix tried when resolving a name conflict.
pub const MAX_CONFLICT_SUFFIX: u32 = 999;

/// Which destination tree a move targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Saved,
    Error,
}

/// Moves files out of the source tree while preserving their relative layout.
#[derive(Debug, Clone)]
pub struct FileRelocator {
    source_root: PathBuf,
    canonical_source: Option<PathBuf>,
    saved_root: PathBuf,
    error_root: PathBuf,
    policy: RetryPolicy,
}

impl FileRelocator {
    /// Create a relocator for the given trees.
    pub fn new(
        source_root: impl Into<PathBuf>,
        saved_root: impl Into<PathBuf>,
        error_root: impl Into<PathBuf>,
    ) -> Self {
        let source_root = source_root.into();
        let canonical_source = source_root.canonicalize().ok();
        Self {
            source_root,
            canonical_source,
            saved_root: saved_root.into(),
            error_root: error_root.into(),
            policy: RetryPolicy::relocation(),
        }
    }

    /// Override the internal move retry policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Root of the watched tree.
    #[must_use]
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Root of a destination tree.
    #[must_use]
    pub fn root_of(&self, destination: Destination) -> &Path {
        match destination {
            Destination::Saved => &self.saved_root,
            Destination::Error => &self.error_root,
        }
    }

    /// Whether `path` names the source root itself.
    #[must_use]
    pub fn is_source_root(&self, path: &Path) -> bool {
        path == self.source_root
            || self
                .canonical_source
                .as_deref()
                .is_some_and(|root| path == root)
    }

    /// Path relative to the source root, or `None` if `path` is not beneath it.
    #[must_use]
    pub fn relative_path_from(&self, path: &Path) -> Option<PathBuf> {
        if let Ok(rel) = path.strip_prefix(&self.source_root) {
            return Some(rel.to_path_buf());
        }
        if let Some(root) = &self.canonical_source {
            if let Ok(rel) = path.strip_prefix(root) {
                return Some(rel.to_path_buf());
            }
            // The path may be spelled through a symlink while the root is canonical.
            let canonical = canonicalize_lenient(path)?;
            if let Ok(rel) = canonical.strip_prefix(root) {
                return Some(rel.to_path_buf());
            }
        }
        None
    }

    /// Destination for `path` inside the given tree, before conflict resolution.
    ///
    /// Paths outside the source root are placed flat by file name.
    #[must_use]
    pub fn destination_for(&self, path: &Path, destination: Destination) -> PathBuf {
        let root = self.root_of(destination);
        match self.relative_path_from(path) {
            Some(rel) if !rel.as_os_str().is_empty() => root.join(rel),
            _ => path
                .file_name()
                .map_or_else(|| root.to_path_buf(), |name| root.join(name)),
        }
    }

    /// Move `path` into the saved tree. Returns `false` on failure.
    pub fn relocate_to_saved(&self, path: &Path) -> bool {
        self.move_to(path, Destination::Saved).is_ok()
    }

    /// Move `path` into the error tree. Returns `false` on failure.
    pub fn relocate_to_error(&self, path: &Path) -> bool {
        self.move_to(path, Destination::Error).is_ok()
    }

    /// Move a file into a destination tree, retrying transient failures.
    ///
    /// Returns the final destination path.
    ///
    /// # Errors
    ///
    /// Returns the last error once all attempts are used, or immediately
    /// for errors that cannot be fixed by retrying.
    pub fn move_to(&self, path: &Path, destination: Destination) -> Result<PathBuf, RelocateError> {
        self.with_retry(path, || self.try_move(path, destination))
    }

    /// Move a directory wholesale into the error tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be moved after all attempts.
    pub fn move_directory_to_error(&self, dir: &Path) -> Result<PathBuf, RelocateError> {
        self.with_retry(dir, || self.try_move(dir, Destination::Error))
    }

    /// Remove directories emptied by moving `original_path` away.
    ///
    /// Climbs from the parent of `original_path` towards the source root,
    /// never removing the root itself. Stops at the first directory that
    /// still holds a file or any non-directory entry, or on the first
    /// filesystem error.
    pub fn prune_empty_directories(&self, original_path: &Path) -> Vec<PathBuf> {
        prune::prune_upwards(self, original_path)
    }

    fn with_retry<F>(&self, path: &Path, mut op: F) -> Result<PathBuf, RelocateError>
    where
        F: FnMut() -> Result<PathBuf, RelocateError>,
    {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op() {
                Ok(dest) => return Ok(dest),
                Err(e) if !e.is_retryable() || attempt + 1 >= attempts => {
                    tracing::error!(
                        path = %path.display(),
                        attempts = attempt + 1,
                        error = %e,
                        "Move failed"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        path = %path.display(),
                        attempt = attempt + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Move failed, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }

    fn try_move(&self, source: &Path, destination: Destination) -> Result<PathBuf, RelocateError> {
        if !exists_no_follow(source) {
            return Err(RelocateError::SourceMissing {
                path: source.to_path_buf(),
            });
        }

        let target = resolve_conflict(&self.destination_for(source, destination))?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| RelocateError::io("create_dir_all", parent, e))?;
            ensure_writable(parent)?;
        }

        rename_or_copy(source, &target)?;

        if !exists_no_follow(&target) {
            return Err(RelocateError::Verification {
                source_path: source.to_path_buf(),
                destination: target,
                reason: "destination missing after move".to_string(),
            });
        }
        if exists_no_follow(source) {
            return Err(RelocateError::Verification {
                source_path: source.to_path_buf(),
                destination: target,
                reason: "source still present after move".to_string(),
            });
        }

        tracing::info!(
            from = %source.display(),
            to = %target.display(),
            "Relocated"
        );
        Ok(target)
    }
}

/// First free variant of `dest`: itself, then `name_001.ext` up to `name_999.ext`.
///
/// # Errors
///
/// Returns `ConflictExhausted` when every candidate is taken.
pub fn resolve_conflict(dest: &Path) -> Result<PathBuf, RelocateError> {
    if !exists_no_follow(dest) {
        return Ok(dest.to_path_buf());
    }

    let parent = dest.parent().unwrap_or_else(|| Path::new(""));
    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = dest
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    for n in 1..=MAX_CONFLICT_SUFFIX {
        let candidate = parent.join(format!("{stem}_{n:03}{extension}"));
        if !exists_no_follow(&candidate) {
            tracing::debug!(
                original = %dest.display(),
                resolved = %candidate.display(),
                "Resolved name conflict"
            );
            return Ok(candidate);
        }
    }

    Err(RelocateError::ConflictExhausted {
        path: dest.to_path_buf(),
        attempts: MAX_CONFLICT_SUFFIX,
    })
}

/// Rename, falling back to copy-then-delete when rename is not possible.
fn rename_or_copy(source: &Path, target: &Path) -> Result<(), RelocateError> {
    let rename_err = match fs::rename(source, target) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    tracing::debug!(
        from = %source.display(),
        to = %target.display(),
        error = %rename_err,
        "Rename failed, falling back to copy"
    );

    if source.is_dir() {
        copy_empty_tree(source, target)?;
        return remove_empty_tree(source).map_err(|e| {
            let _ = remove_empty_tree(target);
            RelocateError::io("remove_dir", source, e)
        });
    }

    if let Err(e) = fs::copy(source, target) {
        let _ = fs::remove_file(target);
        return Err(RelocateError::io("copy", source, e));
    }
    if let Err(e) = fs::remove_file(source) {
        let _ = fs::remove_file(target);
        return Err(RelocateError::io("remove_file", source, e));
    }
    Ok(())
}

/// Recreate the directory skeleton of `source` at `target`.
fn copy_empty_tree(source: &Path, target: &Path) -> Result<(), RelocateError> {
    for entry in walkdir::WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source).to_path_buf();
            RelocateError::io("walk", path, e.into())
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let rel = entry.path().strip_prefix(source).unwrap_or(Path::new(""));
        let dir = target.join(rel);
        fs::create_dir_all(&dir).map_err(|e| RelocateError::io("create_dir_all", &dir, e))?;
    }
    Ok(())
}

/// Create and remove a throwaway file in `dir`.
fn ensure_writable(dir: &Path) -> Result<(), RelocateError> {
    let marker = dir.join(format!(".dropwatch-write-{}.tmp", Uuid::new_v4().simple()));
    match fs::OpenOptions::new().write(true).create_new(true).open(&marker) {
        Ok(file) => {
            drop(file);
            if let Err(e) = fs::remove_file(&marker) {
                tracing::warn!(path = %marker.display(), error = %e, "Failed to remove write check file");
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Err(RelocateError::NotWritable {
            path: dir.to_path_buf(),
        }),
        Err(e) => Err(RelocateError::io("write_check", dir, e)),
    }
}

/// Existence check that treats dangling symlinks as present.
pub(crate) fn exists_no_follow(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Canonicalize `path`, or its parent when the path itself is already gone.
fn canonicalize_lenient(path: &Path) -> Option<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Some(canonical);
    }
    let parent = path.parent()?.canonicalize().ok()?;
    Some(parent.join(path.file_name()?))
}
