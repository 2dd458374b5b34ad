//! Retrying file-processing pipeline.
//!
//! Every file runs validate -> process -> relocate-to-saved. Any failure
//! routes the file to the error tree with a log beside it. Each stage goes
//! through [`with_retry`] so transient failures are retried and permanent
//! ones stop at once.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::classify::ErrorClass;
use super::document::{BaselineValidator, DocumentProcessor};
use super::error_log::{self, FailureReport};
use super::filter::{FileDisposition, FileFilter};
use super::retry::{with_retry, Attempted};
use crate::config::{Config, RetryPolicy};
use crate::error::{DocumentErrorKind, ProcessError};
use crate::observability::spans;
use crate::relocator::{contains_no_files, Destination, FileRelocator};
use crate::{Error, Result};

/// Result of a single `process_file` or `process_empty_directory` call.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingOutcome {
    /// Whether the file reached the saved tree (or was consumed as ignorable).
    pub success: bool,
    /// Path that was processed.
    pub file_path: PathBuf,
    /// Failure description.
    pub error_message: Option<String>,
    /// Wall time spent.
    pub processing_time: Duration,
    /// Directories removed as a cleanup side effect.
    pub pruned_directories: Vec<PathBuf>,
    /// Where the file ended up, if it was moved.
    pub destination: Option<PathBuf>,
    /// Classification of the failure.
    pub error_class: Option<ErrorClass>,
    /// File matched an ignore rule and was not routed anywhere.
    pub ignored: bool,
}

impl ProcessingOutcome {
    fn new(path: &Path, started: Instant) -> Self {
        Self {
            success: false,
            file_path: path.to_path_buf(),
            error_message: None,
            processing_time: started.elapsed(),
            pruned_directories: Vec::new(),
            destination: None,
            error_class: None,
            ignored: false,
        }
    }

    /// Processing time in seconds.
    #[must_use]
    pub fn processing_time_seconds(&self) -> f64 {
        self.processing_time.as_secs_f64()
    }
}

/// Processor counters.
#[derive(Debug, Default)]
pub struct ProcessorStats {
    pub total_processed: AtomicU64,
    pub successful: AtomicU64,
    pub failed_permanent: AtomicU64,
    pub failed_after_retry: AtomicU64,
    pub retries_attempted: AtomicU64,
    pub ignored: AtomicU64,
    pub empty_directories_moved: AtomicU64,
    pub error_relocation_failures: AtomicU64,
}

impl ProcessorStats {
    /// Get a snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> ProcessorStatsSnapshot {
        ProcessorStatsSnapshot {
            total_processed: self.total_processed.load(Ordering::Relaxed),
            successful: self.successful.load(Ordering::Relaxed),
            failed_permanent: self.failed_permanent.load(Ordering::Relaxed),
            failed_after_retry: self.failed_after_retry.load(Ordering::Relaxed),
            retries_attempted: self.retries_attempted.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            empty_directories_moved: self.empty_directories_moved.load(Ordering::Relaxed),
            error_relocation_failures: self.error_relocation_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of processor stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessorStatsSnapshot {
    pub total_processed: u64,
    pub successful: u64,
    pub failed_permanent: u64,
    pub failed_after_retry: u64,
    pub retries_attempted: u64,
    pub ignored: u64,
    pub empty_directories_moved: u64,
    pub error_relocation_failures: u64,
}

/// Orchestrates validation, processing and relocation of single files.
pub struct RetryableProcessor {
    relocator: FileRelocator,
    filter: FileFilter,
    document: Arc<dyn DocumentProcessor>,
    has_document_processor: bool,
    policy: RetryPolicy,
    stats: ProcessorStats,
}

impl std::fmt::Debug for RetryableProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryableProcessor")
            .field("relocator", &self.relocator)
            .field("document", &self.document.name())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RetryableProcessor {
    /// Create a processor from configuration.
    ///
    /// With no document processor, files only get baseline validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the ignore patterns are invalid or the document
    /// processor fails to initialize.
    pub fn new(config: &Config, document: Option<Arc<dyn DocumentProcessor>>) -> Result<Self> {
        let patterns: Vec<&str> = config.ignore_patterns.iter().map(String::as_str).collect();
        let filter = FileFilter::with_patterns(&config.source_folder, &patterns)?;
        let relocator = FileRelocator::new(
            &config.source_folder,
            &config.saved_folder,
            &config.error_folder,
        );

        let has_document_processor = document.is_some();
        let document: Arc<dyn DocumentProcessor> =
            document.unwrap_or_else(|| Arc::new(BaselineValidator));

        if !document.initialize(config)? {
            return Err(Error::config(format!(
                "document processor '{}' failed to initialize",
                document.name()
            )));
        }

        tracing::info!(
            document_processor = document.name(),
            max_attempts = config.retry.max_attempts,
            "File processor ready"
        );

        Ok(Self {
            relocator,
            filter,
            document,
            has_document_processor,
            policy: config.retry,
            stats: ProcessorStats::default(),
        })
    }

    /// Replace the relocator.
    #[must_use]
    pub fn with_relocator(mut self, relocator: FileRelocator) -> Self {
        self.relocator = relocator;
        self
    }

    /// The relocator used for moves.
    #[must_use]
    pub const fn relocator(&self) -> &FileRelocator {
        &self.relocator
    }

    /// Ignore/delete decision for `path`.
    #[must_use]
    pub fn disposition(&self, path: &Path) -> FileDisposition {
        self.filter.disposition(path)
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> ProcessorStatsSnapshot {
        self.stats.snapshot()
    }

    /// Release document processor resources.
    pub fn cleanup(&self) {
        self.document.cleanup();
    }

    /// Process one file and move it to the saved or error tree.
    ///
    /// Never panics or returns an error: every failure is folded into the outcome.
    pub fn process_file(&self, path: &Path) -> ProcessingOutcome {
        let started = Instant::now();

        match self.filter.disposition(path) {
            FileDisposition::Process => {}
            disposition => return self.consume_ignorable(path, disposition, started),
        }

        let span = spans::file_span(path);
        let _guard = span.enter();

        let mut retries = 0;
        let result = self.run_stages(path, &mut retries);
        let mut outcome = ProcessingOutcome::new(path, started);

        match result {
            Ok(destination) => {
                self.stats.successful.fetch_add(1, Ordering::Relaxed);
                outcome.success = true;
                outcome.destination = Some(destination);
                tracing::info!("Processed successfully");
            }
            Err((err, class)) => {
                match class {
                    ErrorClass::Permanent => &self.stats.failed_permanent,
                    ErrorClass::Transient | ErrorClass::Unknown => &self.stats.failed_after_retry,
                }
                .fetch_add(1, Ordering::Relaxed);

                tracing::error!(%class, error = %err, "Processing failed");
                outcome.destination = self.route_to_error(path, &err, &mut retries);
                outcome.error_message = Some(err.message().to_string());
                outcome.error_class = Some(class);
            }
        }

        if outcome.destination.is_some() {
            outcome.pruned_directories = self.relocator.prune_empty_directories(path);
        }

        self.stats.total_processed.fetch_add(1, Ordering::Relaxed);
        self.stats
            .retries_attempted
            .fetch_add(u64::from(retries), Ordering::Relaxed);

        outcome.processing_time = started.elapsed();
        outcome
    }

    /// Move a directory that holds no files anywhere beneath it into the error tree.
    ///
    /// Directories that do contain files are left alone and reported as failures.
    pub fn process_empty_directory(&self, path: &Path) -> ProcessingOutcome {
        let started = Instant::now();
        let mut outcome = ProcessingOutcome::new(path, started);

        if !path.is_dir() {
            outcome.error_message = Some("not a directory".to_string());
            return outcome;
        }
        if self.relocator.is_source_root(path) {
            outcome.error_message = Some("refusing to move the source folder".to_string());
            return outcome;
        }
        match contains_no_files(path) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(dir = %path.display(), "Directory has files, skipping");
                outcome.error_message = Some("directory is not empty".to_string());
                return outcome;
            }
            Err(e) => {
                outcome.error_message = Some(format!("cannot inspect directory: {e}"));
                return outcome;
            }
        }

        let moved = with_retry(&self.policy, "relocate_empty_directory", |_| {
            self.relocator
                .move_directory_to_error(path)
                .map_err(ProcessError::from)
        });

        match moved.result {
            Ok(dest) => {
                let logged = with_retry(&self.policy, "write_empty_folder_log", |_| {
                    error_log::write_empty_folder_log(&dest, path).map_err(ProcessError::from)
                });
                if let Err(e) = logged.result {
                    tracing::error!(dir = %dest.display(), error = %e, "Failed to write empty folder log");
                }
                self.stats
                    .empty_directories_moved
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    from = %path.display(),
                    to = %dest.display(),
                    "Moved empty directory to error folder"
                );
                outcome.success = true;
                outcome.destination = Some(dest);
                outcome.pruned_directories = self.relocator.prune_empty_directories(path);
            }
            Err(e) => {
                tracing::error!(dir = %path.display(), error = %e, "Failed to move empty directory");
                outcome.error_class = moved.class;
                outcome.error_message = Some(e.message().to_string());
            }
        }

        outcome.processing_time = started.elapsed();
        outcome
    }

    fn consume_ignorable(
        &self,
        path: &Path,
        disposition: FileDisposition,
        started: Instant,
    ) -> ProcessingOutcome {
        if disposition == FileDisposition::Delete {
            match fs::remove_file(path) {
                Ok(()) => tracing::debug!(path = %path.display(), "Deleted system file"),
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "Could not delete system file");
                }
            }
        } else {
            tracing::debug!(path = %path.display(), "Ignoring file");
        }
        self.stats.ignored.fetch_add(1, Ordering::Relaxed);

        let mut outcome = ProcessingOutcome::new(path, started);
        outcome.success = true;
        outcome.ignored = true;
        outcome
    }

    fn run_stages(
        &self,
        path: &Path,
        retries: &mut u32,
    ) -> std::result::Result<PathBuf, (ProcessError, ErrorClass)> {
        let validated = with_retry(&self.policy, "validate", |_| validate_file(path));
        unwrap_stage(validated, retries)?;

        let processed = with_retry(&self.policy, "process", |_| self.process_document(path));
        unwrap_stage(processed, retries)?;

        let moved = with_retry(&self.policy, "relocate_to_saved", |_| {
            self.relocator
                .move_to(path, Destination::Saved)
                .map_err(ProcessError::from)
        });
        unwrap_stage(moved, retries)
    }

    fn process_document(&self, path: &Path) -> std::result::Result<(), ProcessError> {
        if !self.has_document_processor {
            return baseline_check(path);
        }

        if !self.document.is_supported_file(path) {
            return Err(ProcessError::document(
                Some(DocumentErrorKind::UnsupportedFileType),
                format!(
                    "unsupported file type '{}'",
                    path.extension()
                        .map(|e| e.to_string_lossy().into_owned())
                        .unwrap_or_default()
                ),
            ));
        }

        let result = self.document.process_document(path);
        if result.success {
            tracing::debug!(
                chunks = result.chunks_created,
                elapsed_ms = u64::try_from(result.processing_time.as_millis()).unwrap_or(u64::MAX),
                "Document processed"
            );
            return Ok(());
        }

        let message = result
            .error_message
            .unwrap_or_else(|| "document processing failed".to_string());
        Err(ProcessError::document(result.error_kind, message))
    }

    /// Move a failed file to the error tree and write its log.
    fn route_to_error(&self, path: &Path, err: &ProcessError, retries: &mut u32) -> Option<PathBuf> {
        if !crate::relocator::exists_no_follow(path) {
            tracing::warn!("File no longer exists, nothing to move to error folder");
            return None;
        }

        let report = FailureReport::new(path, err);

        let moved = with_retry(&self.policy, "relocate_to_error", |_| {
            self.relocator
                .move_to(path, Destination::Error)
                .map_err(ProcessError::from)
        });
        *retries += moved.retries();

        let dest = match moved.result {
            Ok(dest) => dest,
            Err(e) => {
                self.stats
                    .error_relocation_failures
                    .fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %e, "Failed to move file to error folder, leaving it in place");
                return None;
            }
        };

        let log_path = error_log::log_path_for(&dest, path);
        let logged = with_retry(&self.policy, "write_error_log", |_| {
            error_log::write_failure_log(&log_path, &report).map_err(ProcessError::from)
        });
        *retries += logged.retries();
        if let Err(e) = logged.result {
            tracing::error!(log = %log_path.display(), error = %e, "Failed to write error log");
        }

        Some(dest)
    }
}

fn unwrap_stage<T>(
    attempted: Attempted<T>,
    retries: &mut u32,
) -> std::result::Result<T, (ProcessError, ErrorClass)> {
    *retries += attempted.retries();
    let class = attempted.class;
    attempted
        .result
        .map_err(|e| (e, class.unwrap_or(ErrorClass::Unknown)))
}

/// The file exists, is a regular file, and can be opened.
fn validate_file(path: &Path) -> std::result::Result<(), ProcessError> {
    let metadata = fs::metadata(path).map_err(|e| ProcessError::io("cannot stat file", e))?;
    if !metadata.is_file() {
        return Err(ProcessError::validation("not a regular file"));
    }
    File::open(path).map_err(|e| ProcessError::io("cannot open file", e))?;
    Ok(())
}

/// Non-empty, and the first kilobyte can be read.
fn baseline_check(path: &Path) -> std::result::Result<(), ProcessError> {
    let result = BaselineValidator.process_document(path);
    if result.success {
        return Ok(());
    }
    Err(ProcessError::document(
        result.error_kind,
        result
            .error_message
            .unwrap_or_else(|| "validation failed".to_string()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::document::DocumentResult;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicU32;
    use tempfile::TempDir;

    struct Setup {
        _tmp: TempDir,
        source: PathBuf,
        saved: PathBuf,
        error: PathBuf,
        config: Config,
    }

    fn setup() -> Setup {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source");
        let saved = tmp.path().join("saved");
        let error = tmp.path().join("error");
        fs::create_dir_all(&source).unwrap();
        let mut config = Config::with_folders(&source, &saved, &error);
        config.retry = RetryPolicy::immediate(3);
        Setup {
            _tmp: tmp,
            source,
            saved,
            error,
            config,
        }
    }

    fn fast_relocator(s: &Setup) -> FileRelocator {
        FileRelocator::new(&s.source, &s.saved, &s.error).with_policy(RetryPolicy::immediate(1))
    }

    fn baseline(s: &Setup) -> RetryableProcessor {
        RetryableProcessor::new(&s.config, None)
            .unwrap()
            .with_relocator(fast_relocator(s))
    }

    /// Scripted document processor.
    struct Scripted {
        calls: AtomicU32,
        results: Mutex<Vec<DocumentResult>>,
        cleaned: AtomicU32,
    }

    impl Scripted {
        fn new(results: Vec<DocumentResult>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                results: Mutex::new(results),
                cleaned: AtomicU32::new(0),
            })
        }
    }

    impl DocumentProcessor for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn initialize(&self, _config: &Config) -> Result<bool> {
            Ok(true)
        }

        fn supported_extensions(&self) -> HashSet<String> {
            HashSet::from(["txt".to_string(), "pdf".to_string()])
        }

        fn process_document(&self, _path: &Path) -> DocumentResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut results = self.results.lock();
            if results.len() > 1 {
                results.remove(0)
            } else {
                results[0].clone()
            }
        }

        fn cleanup(&self) {
            self.cleaned.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn with_scripted(s: &Setup, scripted: &Arc<Scripted>) -> RetryableProcessor {
        let document: Arc<dyn DocumentProcessor> = scripted.clone();
        RetryableProcessor::new(&s.config, Some(document))
            .unwrap()
            .with_relocator(fast_relocator(s))
    }

    #[test]
    fn test_success_moves_to_saved_and_prunes() {
        let s = setup();
        let file = s.source.join("a/b/doc.txt");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"content").unwrap();

        let outcome = baseline(&s).process_file(&file);

        assert!(outcome.success, "{:?}", outcome.error_message);
        assert_eq!(outcome.destination, Some(s.saved.join("a/b/doc.txt")));
        assert!(s.saved.join("a/b/doc.txt").exists());
        assert!(!file.exists());
        assert_eq!(
            outcome.pruned_directories,
            vec![s.source.join("a/b"), s.source.join("a")]
        );
    }

    #[test]
    fn test_empty_file_goes_to_error_with_log() {
        let s = setup();
        let file = s.source.join("empty.txt");
        fs::write(&file, b"").unwrap();

        let processor = baseline(&s);
        let outcome = processor.process_file(&file);

        assert!(!outcome.success);
        assert_eq!(outcome.error_class, Some(ErrorClass::Permanent));
        assert!(s.error.join("empty.txt").exists());
        let log = fs::read_to_string(s.error.join("empty.txt.log")).unwrap();
        assert!(log.contains("empty"));
        assert!(!file.exists());

        let stats = processor.stats();
        assert_eq!(stats.total_processed, 1);
        assert_eq!(stats.failed_permanent, 1);
        assert_eq!(stats.retries_attempted, 0);
    }

    #[test]
    fn test_same_name_failures_keep_both_logs() {
        let s = setup();
        let processor = baseline(&s);
        let file = s.source.join("a.txt");

        fs::write(&file, b"").unwrap();
        let first = processor.process_file(&file);
        let first_log = fs::read_to_string(s.error.join("a.txt.log")).unwrap();
        fs::write(&file, b"").unwrap();
        let second = processor.process_file(&file);

        assert_eq!(first.destination, Some(s.error.join("a.txt")));
        assert_eq!(second.destination, Some(s.error.join("a_001.txt")));
        assert_eq!(
            fs::read_to_string(s.error.join("a.txt.log")).unwrap(),
            first_log
        );
        assert!(s.error.join("a_001.txt.log").exists());
    }

    #[test]
    fn test_conflict_exhausted_is_permanent() {
        let s = setup();
        fs::create_dir_all(&s.saved).unwrap();
        fs::write(s.saved.join("full.txt"), b"").unwrap();
        for n in 1..=crate::relocator::MAX_CONFLICT_SUFFIX {
            fs::write(s.saved.join(format!("full_{n:03}.txt")), b"").unwrap();
        }
        let file = s.source.join("full.txt");
        fs::write(&file, b"content").unwrap();

        let processor = baseline(&s);
        let outcome = processor.process_file(&file);

        assert!(!outcome.success);
        assert_eq!(outcome.error_class, Some(ErrorClass::Permanent));
        assert_eq!(outcome.destination, Some(s.error.join("full.txt")));
        assert!(s.error.join("full.txt.log").exists());
        let stats = processor.stats();
        assert_eq!(stats.failed_permanent, 1);
        assert_eq!(stats.retries_attempted, 0);
    }

    #[test]
    fn test_ignorable_files_never_reach_outputs() {
        let s = setup();
        let ds_store = s.source.join(".DS_Store");
        let temp = s.source.join("upload.tmp");
        fs::write(&ds_store, b"meta").unwrap();
        fs::write(&temp, b"partial").unwrap();

        let processor = baseline(&s);
        for _ in 0..2 {
            assert!(processor.process_file(&ds_store).ignored);
            assert!(processor.process_file(&temp).ignored);
        }

        assert!(!ds_store.exists(), "OS artifact should be deleted");
        assert!(temp.exists(), "temp file should be left alone");
        assert!(!s.saved.exists() || fs::read_dir(&s.saved).unwrap().next().is_none());
        assert!(!s.error.exists() || fs::read_dir(&s.error).unwrap().next().is_none());
        assert_eq!(processor.stats().ignored, 4);
        assert_eq!(processor.stats().total_processed, 0);
    }

    #[test]
    fn test_same_name_twice_both_saved() {
        let s = setup();
        let processor = baseline(&s);
        let file = s.source.join("a.txt");

        fs::write(&file, b"one").unwrap();
        assert!(processor.process_file(&file).success);
        fs::write(&file, b"two").unwrap();
        assert!(processor.process_file(&file).success);

        assert_eq!(fs::read(s.saved.join("a.txt")).unwrap(), b"one");
        assert_eq!(fs::read(s.saved.join("a_001.txt")).unwrap(), b"two");
        assert_eq!(processor.stats().successful, 2);
    }

    #[test]
    fn test_transient_document_error_retried_to_limit() {
        let s = setup();
        let scripted = Scripted::new(vec![DocumentResult::failed(
            Some(DocumentErrorKind::RateLimit),
            "slow down",
        )]);
        let processor = with_scripted(&s, &scripted);
        let file = s.source.join("doc.txt");
        fs::write(&file, b"x").unwrap();

        let outcome = processor.process_file(&file);

        assert!(!outcome.success);
        assert_eq!(outcome.error_class, Some(ErrorClass::Transient));
        assert_eq!(scripted.calls.load(Ordering::SeqCst), 3);
        assert!(s.error.join("doc.txt").exists());
        assert!(s.error.join("doc.txt.log").exists());
        let stats = processor.stats();
        assert_eq!(stats.failed_after_retry, 1);
        assert_eq!(stats.retries_attempted, 2);
    }

    #[test]
    fn test_permanent_document_error_attempted_once() {
        let s = setup();
        let scripted = Scripted::new(vec![DocumentResult::failed(
            Some(DocumentErrorKind::Corrupted),
            "bad xref table",
        )]);
        let processor = with_scripted(&s, &scripted);
        let file = s.source.join("doc.pdf");
        fs::write(&file, b"%PDF").unwrap();

        let outcome = processor.process_file(&file);

        assert!(!outcome.success);
        assert_eq!(scripted.calls.load(Ordering::SeqCst), 1);
        assert_eq!(processor.stats().failed_permanent, 1);
    }

    #[test]
    fn test_recovers_after_transient_failure() {
        let s = setup();
        let scripted = Scripted::new(vec![
            DocumentResult::failed(None, "connection reset"),
            DocumentResult::ok(4),
        ]);
        let processor = with_scripted(&s, &scripted);
        let file = s.source.join("doc.txt");
        fs::write(&file, b"x").unwrap();

        let outcome = processor.process_file(&file);

        assert!(outcome.success);
        assert!(s.saved.join("doc.txt").exists());
        assert_eq!(scripted.calls.load(Ordering::SeqCst), 2);
        assert_eq!(processor.stats().retries_attempted, 1);
    }

    #[test]
    fn test_unsupported_extension_fails_without_calling_processor() {
        let s = setup();
        let scripted = Scripted::new(vec![DocumentResult::ok(1)]);
        let processor = with_scripted(&s, &scripted);
        let file = s.source.join("image.png");
        fs::write(&file, b"png").unwrap();

        let outcome = processor.process_file(&file);

        assert!(!outcome.success);
        assert_eq!(outcome.error_class, Some(ErrorClass::Permanent));
        assert_eq!(scripted.calls.load(Ordering::SeqCst), 0);
        assert!(s.error.join("image.png").exists());
    }

    #[test]
    fn test_missing_file_fails_without_error_relocation() {
        let s = setup();
        let processor = baseline(&s);

        let outcome = processor.process_file(&s.source.join("ghost.txt"));

        assert!(!outcome.success);
        assert!(outcome.destination.is_none());
        assert_eq!(processor.stats().failed_after_retry, 1);
        assert_eq!(processor.stats().retries_attempted, 2);
    }

    #[test]
    fn test_cleanup_delegates() {
        let s = setup();
        let scripted = Scripted::new(vec![DocumentResult::ok(1)]);
        let processor = with_scripted(&s, &scripted);
        processor.cleanup();
        processor.cleanup();
        assert_eq!(scripted.cleaned.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_empty_directory_moved_with_marker() {
        let s = setup();
        let dir = s.source.join("incoming");
        fs::create_dir_all(dir.join("x/y")).unwrap();
        fs::create_dir_all(dir.join("z")).unwrap();

        let processor = baseline(&s);
        let outcome = processor.process_empty_directory(&dir);

        assert!(outcome.success);
        assert!(!dir.exists());
        assert!(s.error.join("incoming/x/y").is_dir());
        assert!(s.error.join("incoming").join(error_log::EMPTY_FOLDER_LOG).exists());
        assert_eq!(processor.stats().empty_directories_moved, 1);
    }

    #[test]
    fn test_non_empty_directory_untouched() {
        let s = setup();
        let dir = s.source.join("incoming");
        fs::create_dir_all(dir.join("x")).unwrap();
        fs::write(dir.join("x/file.txt"), b"data").unwrap();

        let outcome = baseline(&s).process_empty_directory(&dir);

        assert!(!outcome.success);
        assert!(dir.join("x/file.txt").exists());
        assert!(!s.error.exists());
    }

    #[test]
    fn test_source_root_never_moved() {
        let s = setup();
        let outcome = baseline(&s).process_empty_directory(&s.source);
        assert!(!outcome.success);
        assert!(s.source.is_dir());
    }

    #[test]
    fn test_invalid_ignore_pattern_rejected() {
        let s = setup();
        let mut config = s.config.clone();
        config.ignore_patterns = vec!["[z-a]".to_string()];
        assert!(RetryableProcessor::new(&config, None).is_err());
    }
}
