//! Failure classification for retry decisions.

use std::fmt;
use std::io;

use serde::Serialize;

use crate::error::{ProcessError, ProcessErrorKind};

/// Message fragments that indicate a passing condition.
const TRANSIENT_KEYWORDS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
    "timeout",
    "timed out",
    "network",
    "connection",
    "unavailable",
    "overload",
    "quota",
    "vector store",
    "storage backend",
    "database is locked",
];

/// Message fragments that indicate the input itself is bad.
const PERMANENT_KEYWORDS: &[&str] = &[
    "unsupported",
    "invalid format",
    "invalid_format",
    "corrupt",
    "empty",
    "malformed",
    "encoding",
    "decode",
];

/// Retry eligibility of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// Likely to succeed on retry.
    Transient,
    /// Will fail again; do not retry.
    Permanent,
    /// Unrecognised; retried like `Transient`.
    Unknown,
}

impl ErrorClass {
    /// Classify a processing error.
    ///
    /// Structured document kinds win, then message keywords, then the
    /// error's own kind.
    #[must_use]
    pub fn of(err: &ProcessError) -> Self {
        if let ProcessErrorKind::Document(Some(kind)) = err.kind() {
            return if kind.is_permanent() {
                Self::Permanent
            } else {
                Self::Transient
            };
        }

        if let Some(class) = Self::from_message(err.message()) {
            return class;
        }

        match err.kind() {
            ProcessErrorKind::Io(kind) => Self::from_io_kind(kind),
            ProcessErrorKind::Relocation => Self::Transient,
            ProcessErrorKind::Decode | ProcessErrorKind::Validation | ProcessErrorKind::Conflict => {
                Self::Permanent
            }
            ProcessErrorKind::Document(_) | ProcessErrorKind::Other => Self::Unknown,
        }
    }

    /// Classify from message content alone.
    #[must_use]
    pub fn from_message(message: &str) -> Option<Self> {
        let lower = message.to_lowercase();
        if TRANSIENT_KEYWORDS.iter().any(|k| lower.contains(k)) {
            return Some(Self::Transient);
        }
        if PERMANENT_KEYWORDS.iter().any(|k| lower.contains(k)) {
            return Some(Self::Permanent);
        }
        None
    }

    /// Filesystem errors may clear up: the file can reappear or a lock can lift.
    const fn from_io_kind(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::InvalidData => Self::Permanent,
            _ => Self::Transient,
        }
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        !matches!(self, Self::Permanent)
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DocumentErrorKind, RelocateError};
    use std::path::PathBuf;

    #[test]
    fn test_structured_kind_wins_over_message() {
        let err = ProcessError::document(
            Some(DocumentErrorKind::RateLimit),
            "document is empty",
        );
        assert_eq!(ErrorClass::of(&err), ErrorClass::Transient);

        let err = ProcessError::document(
            Some(DocumentErrorKind::UnsupportedFileType),
            "network hiccup",
        );
        assert_eq!(ErrorClass::of(&err), ErrorClass::Permanent);
    }

    #[test]
    fn test_every_permanent_kind() {
        for kind in [
            DocumentErrorKind::UnsupportedFileType,
            DocumentErrorKind::EmptyDocument,
            DocumentErrorKind::InvalidFormat,
            DocumentErrorKind::Corrupted,
            DocumentErrorKind::TooLarge,
            DocumentErrorKind::Configuration,
            DocumentErrorKind::Malformed,
            DocumentErrorKind::EncodingError,
        ] {
            let err = ProcessError::document(Some(kind), "failed");
            assert_eq!(ErrorClass::of(&err), ErrorClass::Permanent, "{kind}");
        }
    }

    #[test]
    fn test_every_transient_kind() {
        for kind in [
            DocumentErrorKind::RateLimit,
            DocumentErrorKind::Timeout,
            DocumentErrorKind::Network,
            DocumentErrorKind::Unavailable,
            DocumentErrorKind::Overloaded,
            DocumentErrorKind::QuotaExceeded,
            DocumentErrorKind::Storage,
        ] {
            let err = ProcessError::document(Some(kind), "failed");
            assert_eq!(ErrorClass::of(&err), ErrorClass::Transient, "{kind}");
        }
    }

    #[test]
    fn test_message_keywords() {
        let transient = ProcessError::document(None, "Upstream returned 429: rate limit hit");
        assert_eq!(ErrorClass::of(&transient), ErrorClass::Transient);

        let permanent = ProcessError::document(None, "PDF appears corrupted");
        assert_eq!(ErrorClass::of(&permanent), ErrorClass::Permanent);
    }

    #[test]
    fn test_transient_keywords_checked_first() {
        assert_eq!(
            ErrorClass::from_message("timeout while reading empty response"),
            Some(ErrorClass::Transient)
        );
    }

    #[test]
    fn test_io_errors_are_transient() {
        for kind in [
            io::ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied,
            io::ErrorKind::Other,
        ] {
            let err = ProcessError::from(io::Error::new(kind, "boom"));
            assert_eq!(ErrorClass::of(&err), ErrorClass::Transient);
        }
    }

    #[test]
    fn test_decode_and_validation_are_permanent() {
        assert_eq!(
            ErrorClass::of(&ProcessError::decode("bad bytes")),
            ErrorClass::Permanent
        );
        assert_eq!(
            ErrorClass::of(&ProcessError::validation("not a regular file")),
            ErrorClass::Permanent
        );
        let invalid = ProcessError::from(io::Error::new(io::ErrorKind::InvalidData, "bad utf-8"));
        assert_eq!(ErrorClass::of(&invalid), ErrorClass::Permanent);
    }

    #[test]
    fn test_conflict_exhaustion_is_permanent() {
        let err = ProcessError::from(RelocateError::ConflictExhausted {
            path: PathBuf::from("/saved/a.txt"),
            attempts: 999,
        });
        assert_eq!(ErrorClass::of(&err), ErrorClass::Permanent);
    }

    #[test]
    fn test_unrecognised_is_unknown_but_retryable() {
        let err = ProcessError::document(None, "something odd happened");
        let class = ErrorClass::of(&err);
        assert_eq!(class, ErrorClass::Unknown);
        assert!(class.is_retryable());
        assert!(!ErrorClass::Permanent.is_retryable());
    }
}
