//! Pluggable document processing.
//!
//! The engine only needs a narrow contract from whatever turns a file into
//! content (embeddings, vector-store writes, ...). [`BaselineValidator`] is
//! the stand-in used when nothing else is configured.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::DocumentErrorKind;
use crate::Result;

/// Bytes read by the baseline readability check.
const PROBE_BYTES: usize = 1024;

/// Result of processing one document.
#[derive(Debug, Clone, Default)]
pub struct DocumentResult {
    /// Whether the document was processed.
    pub success: bool,
    /// Chunks written downstream.
    pub chunks_created: usize,
    /// Wall time spent.
    pub processing_time: Duration,
    /// Failure description.
    pub error_message: Option<String>,
    /// Structured failure kind.
    pub error_kind: Option<DocumentErrorKind>,
    /// Free-form details.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl DocumentResult {
    /// Successful result.
    #[must_use]
    pub fn ok(chunks_created: usize) -> Self {
        Self {
            success: true,
            chunks_created,
            ..Self::default()
        }
    }

    /// Failed result.
    pub fn failed(kind: Option<DocumentErrorKind>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            error_kind: kind,
            ..Self::default()
        }
    }

    /// Set the processing time.
    #[must_use]
    pub const fn with_time(mut self, elapsed: Duration) -> Self {
        self.processing_time = elapsed;
        self
    }
}

/// Something that can process a document file.
pub trait DocumentProcessor: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Prepare resources.
    ///
    /// # Errors
    ///
    /// Returns an error on unrecoverable setup failure.
    fn initialize(&self, config: &Config) -> Result<bool>;

    /// Extensions (lowercase, without dot) this processor accepts.
    fn supported_extensions(&self) -> HashSet<String>;

    /// Whether `path` has a supported extension.
    fn is_supported_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.supported_extensions().contains(&ext.to_lowercase()))
    }

    /// Process one file.
    fn process_document(&self, path: &Path) -> DocumentResult;

    /// Release resources. Must be safe to call more than once.
    fn cleanup(&self);
}

/// Validation-only processing: the file must be non-empty and readable.
#[derive(Debug, Default, Clone, Copy)]
pub struct BaselineValidator;

impl DocumentProcessor for BaselineValidator {
    fn name(&self) -> &str {
        "baseline"
    }

    fn initialize(&self, _config: &Config) -> Result<bool> {
        Ok(true)
    }

    fn supported_extensions(&self) -> HashSet<String> {
        HashSet::new()
    }

    fn is_supported_file(&self, _path: &Path) -> bool {
        true
    }

    fn process_document(&self, path: &Path) -> DocumentResult {
        let started = Instant::now();

        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) => return DocumentResult::failed(None, format!("cannot open file: {e}")),
        };

        let size = match file.metadata() {
            Ok(m) => m.len(),
            Err(e) => return DocumentResult::failed(None, format!("cannot stat file: {e}")),
        };
        if size == 0 {
            return DocumentResult::failed(
                Some(DocumentErrorKind::EmptyDocument),
                "file is empty (0 bytes)",
            );
        }

        let mut probe = [0u8; PROBE_BYTES];
        if let Err(e) = file.read(&mut probe) {
            return DocumentResult::failed(None, format!("cannot read file: {e}"));
        }

        let mut result = DocumentResult::ok(0).with_time(started.elapsed());
        result
            .metadata
            .insert("size_bytes".to_string(), serde_json::Value::from(size));
        result
    }

    fn cleanup(&self) {}
}
