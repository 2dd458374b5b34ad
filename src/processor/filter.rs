//! System and temporary file filtering.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::Result;

/// OS metadata files that are deleted on sight.
const OS_ARTIFACTS: &[&str] = &[
    ".ds_store",
    "thumbs.db",
    "ehthumbs.db",
    "desktop.ini",
    ".localized",
];

/// Suffixes of files still being written or locked by an editor.
const TEMP_SUFFIXES: &[&str] = &[".tmp", ".temp", ".swp", ".swo", ".lock", ".part", ".crdownload"];

/// Extensions that keep a hidden file eligible for processing.
const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "txt", "md", "doc", "docx", "rtf", "csv", "json", "html", "xml", "odt",
];

/// What to do with a file before any processing happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDisposition {
    /// Run it through the pipeline.
    Process,
    /// Leave it where it is.
    Ignore,
    /// Remove it.
    Delete,
}

/// File filter for the pipeline.
#[derive(Debug)]
pub struct FileFilter {
    patterns: Option<Gitignore>,
}

impl FileFilter {
    /// Filter with only the built-in rules.
    #[must_use]
    pub const fn new() -> Self {
        Self { patterns: None }
    }

    /// Create a filter with additional gitignore-style patterns rooted at `base_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if patterns are invalid.
    pub fn with_patterns(base_path: impl AsRef<Path>, patterns: &[&str]) -> Result<Self> {
        if patterns.is_empty() {
            return Ok(Self::new());
        }

        let mut builder = GitignoreBuilder::new(base_path.as_ref());
        for pattern in patterns {
            builder
                .add_line(None, pattern)
                .map_err(|e| crate::Error::config(format!("invalid pattern: {e}")))?;
        }

        let gitignore = builder
            .build()
            .map_err(|e| crate::Error::config(format!("failed to build ignore patterns: {e}")))?;

        Ok(Self {
            patterns: Some(gitignore),
        })
    }

    /// Decide what to do with `path`.
    #[must_use]
    pub fn disposition(&self, path: &Path) -> FileDisposition {
        if Self::is_os_artifact(path) {
            return FileDisposition::Delete;
        }
        if Self::is_default_ignored(path) {
            return FileDisposition::Ignore;
        }
        if let Some(ref gi) = self.patterns {
            // The parent walk asserts the path is under the matcher root.
            let matched = if path.starts_with(gi.path()) {
                gi.matched_path_or_any_parents(path, false)
            } else {
                gi.matched(path, false)
            };
            if matched.is_ignore() {
                return FileDisposition::Ignore;
            }
        }
        FileDisposition::Process
    }

    /// Whether `path` should go through the pipeline.
    #[must_use]
    pub fn should_process(&self, path: &Path) -> bool {
        self.disposition(path) == FileDisposition::Process
    }

    /// OS-generated sidecar files: Finder/Explorer metadata and AppleDouble `._*` files.
    #[must_use]
    pub fn is_os_artifact(path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let lower = name.to_lowercase();
        OS_ARTIFACTS.contains(&lower.as_str()) || name.starts_with("._")
    }

    /// Temp/lock files and dot-files without a document extension.
    fn is_default_ignored(path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return true;
        };
        let lower = name.to_lowercase();

        if TEMP_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
            return true;
        }

        // Office owner files and editor backups
        if name.starts_with("~$") || name.ends_with('~') {
            return true;
        }

        if name.starts_with('.') {
            let whitelisted = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
            return !whitelisted;
        }

        false
    }
}

impl Default for FileFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_os_artifacts_are_deleted() {
        let filter = FileFilter::new();
        for name in [".DS_Store", "Thumbs.db", "desktop.ini", "._report.pdf"] {
            assert_eq!(
                filter.disposition(&Path::new("/in").join(name)),
                FileDisposition::Delete,
                "{name}"
            );
        }
    }

    #[test]
    fn test_temp_files_are_ignored() {
        let filter = FileFilter::new();
        for name in [
            "upload.tmp",
            "x.TEMP",
            ".notes.txt.swp",
            "db.lock",
            "~$budget.docx",
            "draft.txt~",
            "movie.mkv.part",
        ] {
            assert_eq!(
                filter.disposition(&Path::new("/in").join(name)),
                FileDisposition::Ignore,
                "{name}"
            );
        }
    }

    #[test]
    fn test_hidden_files_whitelist() {
        let filter = FileFilter::new();
        assert_eq!(
            filter.disposition(Path::new("/in/.env")),
            FileDisposition::Ignore
        );
        assert_eq!(
            filter.disposition(Path::new("/in/.hidden")),
            FileDisposition::Ignore
        );
        assert_eq!(
            filter.disposition(Path::new("/in/.notes.md")),
            FileDisposition::Process
        );
        assert_eq!(
            filter.disposition(Path::new("/in/.Report.PDF")),
            FileDisposition::Process
        );
    }

    #[test]
    fn test_regular_files_are_processed() {
        let filter = FileFilter::new();
        assert!(filter.should_process(Path::new("/in/a/report.pdf")));
        assert!(filter.should_process(Path::new("/in/data.csv")));
        assert!(filter.should_process(Path::new("/in/noext")));
    }

    #[test]
    fn test_filter_with_patterns() {
        let tmp = TempDir::new().unwrap();
        let filter = FileFilter::with_patterns(tmp.path(), &["*.bak", "scratch/"]).unwrap();

        assert_eq!(
            filter.disposition(&tmp.path().join("old.bak")),
            FileDisposition::Ignore
        );
        assert_eq!(
            filter.disposition(&tmp.path().join("scratch/notes.txt")),
            FileDisposition::Ignore
        );
        assert!(filter.should_process(&tmp.path().join("main.txt")));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let tmp = TempDir::new().unwrap();
        // Unclosed classes are tolerated; a reversed range is not.
        assert!(FileFilter::with_patterns(tmp.path(), &["["]).is_ok());
        let err = FileFilter::with_patterns(tmp.path(), &["*.txt", "[z-a]"]).unwrap_err();
        assert!(err.to_string().contains("invalid pattern"));
    }

    #[test]
    fn test_empty_patterns_is_plain_filter() {
        let tmp = TempDir::new().unwrap();
        let filter = FileFilter::with_patterns(tmp.path(), &[]).unwrap();
        assert!(filter.should_process(&tmp.path().join("main.txt")));
    }
}
