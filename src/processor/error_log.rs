//! Per-file failure reports written next to relocated files.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};

use crate::error::ProcessError;
use crate::relocator::{exists_no_follow, resolve_conflict};

/// Name of the marker written inside a relocated empty directory.
pub const EMPTY_FOLDER_LOG: &str = "empty_folder.log";

/// Facts about a failed file, captured before it is moved.
#[derive(Debug, Clone)]
pub struct FailureReport {
    /// Where the file was found.
    pub original_path: PathBuf,
    /// Error message.
    pub message: String,
    /// Error type name.
    pub error_type: String,
    /// Underlying causes, outermost first.
    pub causes: Vec<String>,
    /// Size at failure time.
    pub file_size: Option<u64>,
    /// Modification time at failure time.
    pub modified: Option<SystemTime>,
}

impl FailureReport {
    /// Build a report for `path` failing with `err`.
    #[must_use]
    pub fn new(path: &Path, err: &ProcessError) -> Self {
        let metadata = fs::metadata(path).ok();
        Self {
            original_path: path.to_path_buf(),
            message: err.message().to_string(),
            error_type: err.kind().to_string(),
            causes: err.cause_chain(),
            file_size: metadata.as_ref().map(fs::Metadata::len),
            modified: metadata.and_then(|m| m.modified().ok()),
        }
    }

    /// Render the report body.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let now: DateTime<Local> = Local::now();
        let _ = writeln!(out, "Timestamp: {}", now.to_rfc3339());
        let _ = writeln!(out, "Original path: {}", self.original_path.display());
        let _ = writeln!(out, "Error: {}", self.message);
        let _ = writeln!(out, "Error type: {}", self.error_type);
        match self.file_size {
            Some(size) => {
                let _ = writeln!(out, "File size: {size} bytes");
            }
            None => {
                let _ = writeln!(out, "File size: unavailable");
            }
        }
        if let Some(modified) = self.modified {
            let modified: DateTime<Local> = modified.into();
            let _ = writeln!(out, "Modified: {}", modified.to_rfc3339());
        }
        if !self.causes.is_empty() {
            let _ = writeln!(out, "\nCaused by:");
            for (i, cause) in self.causes.iter().enumerate() {
                let _ = writeln!(out, "  {i}: {cause}");
            }
        }
        out
    }
}

/// Path of the log for a file relocated to `relocated`.
///
/// Normally `<original name>.log` beside it. When that log already belongs
/// to an earlier failure (the file itself was renamed to `name_001.ext`),
/// the log is named after the relocated file instead, so every failed file
/// keeps its own log.
#[must_use]
pub fn log_path_for(relocated: &Path, original: &Path) -> PathBuf {
    let dir = relocated.parent().unwrap_or_else(|| Path::new(""));
    let named = |name: &std::ffi::OsStr| dir.join(format!("{}.log", name.to_string_lossy()));

    let preferred = original
        .file_name()
        .or_else(|| relocated.file_name())
        .map_or_else(|| dir.join(".log"), named);
    if !exists_no_follow(&preferred) {
        return preferred;
    }

    let Some(relocated_name) = relocated.file_name() else {
        return preferred;
    };
    let fallback = named(relocated_name);
    resolve_conflict(&fallback).unwrap_or(fallback)
}

/// Write `report` to `log_path`, creating parent directories.
///
/// # Errors
///
/// Returns an error if the log cannot be written.
pub fn write_failure_log(log_path: &Path, report: &FailureReport) -> io::Result<()> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(log_path, report.render())
}

/// Write the explanatory marker inside a relocated empty directory.
///
/// # Errors
///
/// Returns an error if the marker cannot be written.
pub fn write_empty_folder_log(relocated_dir: &Path, original: &Path) -> io::Result<PathBuf> {
    let path = relocated_dir.join(EMPTY_FOLDER_LOG);
    let now: DateTime<Local> = Local::now();
    let body = format!(
        "Timestamp: {}\nOriginal path: {}\nError: folder was empty (no files anywhere beneath it) and was moved to the error folder\n",
        now.to_rfc3339(),
        original.display(),
    );
    fs::write(&path, body)?;
    Ok(path)
}
