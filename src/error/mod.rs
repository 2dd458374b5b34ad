//! Error types and Result aliases for Dropwatch.
//!
//! This module defines the error hierarchy used throughout the crate.
//! Lifecycle functions return `Result<T, Error>` or `Result<T>`; per-file
//! pipeline stages return `Result<T, ProcessError>` so the retry envelope
//! can classify failures without inspecting error chains.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Result type alias using Dropwatch's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Dropwatch operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// File watching error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// File relocation error.
    #[error("relocation error: {0}")]
    Relocate(#[from] RelocateError),

    /// Per-file processing error.
    #[error("processing error: {0}")]
    Process(#[from] ProcessError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// File watcher errors.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to subscribe to notifications for a path.
    #[error("failed to watch path '{path}': {reason}")]
    WatchFailed { path: String, reason: String },

    /// The source folder vanished or cannot be read.
    #[error("source folder '{path}' is unavailable: {reason}")]
    SourceUnavailable { path: String, reason: String },

    /// A background thread could not be spawned.
    #[error("failed to spawn {name} thread: {reason}")]
    SpawnFailed { name: &'static str, reason: String },

    /// Operation requires a started watcher.
    #[error("watcher is not running")]
    NotRunning,
}

/// Errors raised while moving files between trees.
#[derive(Error, Debug)]
pub enum RelocateError {
    /// The file to move is not there.
    #[error("source '{}' does not exist", path.display())]
    SourceMissing { path: PathBuf },

    /// Every numbered candidate name is already taken.
    #[error("could not resolve name conflict for '{}' after {attempts} candidates", path.display())]
    ConflictExhausted { path: PathBuf, attempts: u32 },

    /// Destination directory is read-only.
    #[error("destination directory '{}' is not writable", path.display())]
    NotWritable { path: PathBuf },

    /// Post-move checks did not hold.
    #[error("move of '{}' to '{}' could not be verified: {reason}", source_path.display(), destination.display())]
    Verification {
        source_path: PathBuf,
        destination: PathBuf,
        reason: String,
    },

    /// Underlying filesystem error.
    #[error("{operation} failed for '{}': {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RelocateError {
    /// Wrap an I/O error with the operation and path that produced it.
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Description without paths, so file names cannot sway classification.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::SourceMissing { .. } => "source does not exist".to_string(),
            Self::ConflictExhausted { attempts, .. } => {
                format!("name conflict unresolved after {attempts} candidates")
            }
            Self::NotWritable { .. } => "destination directory is not writable".to_string(),
            Self::Verification { reason, .. } => format!("move not verified: {reason}"),
            Self::Io {
                operation, source, ..
            } => format!("{operation} failed: {source}"),
        }
    }

    /// Whether retrying the move could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::ConflictExhausted { .. })
    }
}

/// Structured failure kinds reported by a document processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentErrorKind {
    UnsupportedFileType,
    EmptyDocument,
    InvalidFormat,
    Corrupted,
    TooLarge,
    Configuration,
    Malformed,
    EncodingError,
    RateLimit,
    Timeout,
    Network,
    Unavailable,
    Overloaded,
    QuotaExceeded,
    Storage,
}

impl DocumentErrorKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnsupportedFileType => "unsupported_file_type",
            Self::EmptyDocument => "empty_document",
            Self::InvalidFormat => "invalid_format",
            Self::Corrupted => "corrupted",
            Self::TooLarge => "too_large",
            Self::Configuration => "configuration",
            Self::Malformed => "malformed",
            Self::EncodingError => "encoding_error",
            Self::RateLimit => "rate_limit",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Unavailable => "unavailable",
            Self::Overloaded => "overloaded",
            Self::QuotaExceeded => "quota_exceeded",
            Self::Storage => "storage",
        }
    }

    /// Kinds that no amount of retrying will fix.
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        matches!(
            self,
            Self::UnsupportedFileType
                | Self::EmptyDocument
                | Self::InvalidFormat
                | Self::Corrupted
                | Self::TooLarge
                | Self::Configuration
                | Self::Malformed
                | Self::EncodingError
        )
    }
}

impl fmt::Display for DocumentErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentErrorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s.trim().to_lowercase().replace('-', "_").as_str() {
            "unsupported_file_type" | "unsupported" => Self::UnsupportedFileType,
            "empty_document" | "empty" => Self::EmptyDocument,
            "invalid_format" => Self::InvalidFormat,
            "corrupted" | "corrupt" => Self::Corrupted,
            "too_large" => Self::TooLarge,
            "configuration" | "config" | "init" | "initialization" => Self::Configuration,
            "malformed" => Self::Malformed,
            "encoding_error" | "encoding" => Self::EncodingError,
            "rate_limit" => Self::RateLimit,
            "timeout" => Self::Timeout,
            "network" => Self::Network,
            "unavailable" => Self::Unavailable,
            "overloaded" => Self::Overloaded,
            "quota_exceeded" => Self::QuotaExceeded,
            "storage" | "vector_store" => Self::Storage,
            other => return Err(Error::config(format!("unknown document error kind '{other}'"))),
        };
        Ok(kind)
    }
}

/// Where a processing failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessErrorKind {
    /// Filesystem error with its OS error kind.
    Io(io::ErrorKind),
    /// Content could not be decoded.
    Decode,
    /// File failed validation.
    Validation,
    /// Document processor failure, with its structured kind if it gave one.
    Document(Option<DocumentErrorKind>),
    /// Move between trees failed.
    Relocation,
    /// Destination name space exhausted.
    Conflict,
    /// Anything else.
    Other,
}

impl fmt::Display for ProcessErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(kind) => write!(f, "IoError({kind:?})"),
            Self::Decode => f.write_str("DecodeError"),
            Self::Validation => f.write_str("ValidationError"),
            Self::Document(Some(kind)) => write!(f, "DocumentError({kind})"),
            Self::Document(None) => f.write_str("DocumentError"),
            Self::Relocation => f.write_str("RelocationError"),
            Self::Conflict => f.write_str("ConflictError"),
            Self::Other => f.write_str("Error"),
        }
    }
}

/// A processing failure carrying enough structure to be classified.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ProcessError {
    kind: ProcessErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl ProcessError {
    /// Create an error of the given kind.
    pub fn new(kind: ProcessErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an I/O error with context.
    pub fn io(context: impl fmt::Display, err: io::Error) -> Self {
        Self {
            kind: ProcessErrorKind::Io(err.kind()),
            message: format!("{context}: {err}"),
            source: Some(Box::new(err)),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ProcessErrorKind::Validation, message)
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ProcessErrorKind::Decode, message)
    }

    /// Create a document-processor error.
    pub fn document(kind: Option<DocumentErrorKind>, message: impl Into<String>) -> Self {
        Self::new(ProcessErrorKind::Document(kind), message)
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Failure kind.
    #[must_use]
    pub const fn kind(&self) -> ProcessErrorKind {
        self.kind
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Messages of every cause below this error, outermost first.
    #[must_use]
    pub fn cause_chain(&self) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = std::error::Error::source(self);
        while let Some(err) = current {
            chain.push(err.to_string());
            current = err.source();
        }
        chain
    }
}

impl From<io::Error> for ProcessError {
    fn from(err: io::Error) -> Self {
        Self {
            kind: ProcessErrorKind::Io(err.kind()),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<RelocateError> for ProcessError {
    fn from(err: RelocateError) -> Self {
        let kind = match &err {
            RelocateError::ConflictExhausted { .. } => ProcessErrorKind::Conflict,
            RelocateError::Io { source, .. } => ProcessErrorKind::Io(source.kind()),
            RelocateError::SourceMissing { .. } => ProcessErrorKind::Io(io::ErrorKind::NotFound),
            RelocateError::NotWritable { .. } => {
                ProcessErrorKind::Io(io::ErrorKind::PermissionDenied)
            }
            RelocateError::Verification { .. } => ProcessErrorKind::Relocation,
        };
        Self {
            kind,
            message: err.reason(),
            source: Some(Box::new(err)),
        }
    }
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests;
