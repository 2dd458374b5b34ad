//! Tests for error types.

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("polling interval too short");
        assert_eq!(
            err.to_string(),
            "configuration error: polling interval too short"
        );
    }

    #[test]
    fn test_error_internal() {
        let err = Error::internal("test internal error");
        assert_eq!(err.to_string(), "internal error: test internal error");
    }

    #[test]
    fn test_watcher_error_conversion() {
        let watch_err = WatcherError::WatchFailed {
            path: "/tmp/inbox".to_string(),
            reason: "permission denied".to_string(),
        };
        let err: Error = watch_err.into();
        assert!(matches!(err, Error::Watcher(_)));
    }

    #[test]
    fn test_watcher_error_source_unavailable() {
        let err = WatcherError::SourceUnavailable {
            path: "/data/inbox".to_string(),
            reason: "No such file or directory".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "source folder '/data/inbox' is unavailable: No such file or directory"
        );
    }

    #[test]
    fn test_relocate_error_conversion() {
        let err: Error = RelocateError::SourceMissing {
            path: PathBuf::from("/inbox/a.txt"),
        }
        .into();
        assert!(matches!(err, Error::Relocate(_)));
        assert!(err.to_string().contains("/inbox/a.txt"));
    }

    #[test]
    fn test_relocate_error_retryable() {
        let conflict = RelocateError::ConflictExhausted {
            path: PathBuf::from("/saved/a.txt"),
            attempts: 999,
        };
        assert!(!conflict.is_retryable());

        let io = RelocateError::io(
            "rename",
            "/inbox/a.txt",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(io.is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_process_error_from_io_keeps_kind() {
        let err = ProcessError::from(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert_eq!(
            err.kind(),
            ProcessErrorKind::Io(io::ErrorKind::PermissionDenied)
        );
        assert_eq!(err.cause_chain(), vec!["denied".to_string()]);
    }

    #[test]
    fn test_process_error_from_relocate_conflict() {
        let err = ProcessError::from(RelocateError::ConflictExhausted {
            path: PathBuf::from("/saved/a.txt"),
            attempts: 999,
        });
        assert_eq!(err.kind(), ProcessErrorKind::Conflict);
    }

    #[test]
    fn test_process_error_io_context() {
        let err = ProcessError::io(
            "failed to open /inbox/a.txt",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.message(), "failed to open /inbox/a.txt: gone");
        assert_eq!(err.to_string(), "failed to open /inbox/a.txt: gone");
    }

    #[test]
    fn test_process_error_kind_display() {
        assert_eq!(
            ProcessErrorKind::Io(io::ErrorKind::NotFound).to_string(),
            "IoError(NotFound)"
        );
        assert_eq!(
            ProcessErrorKind::Document(Some(DocumentErrorKind::RateLimit)).to_string(),
            "DocumentError(rate_limit)"
        );
        assert_eq!(ProcessErrorKind::Validation.to_string(), "ValidationError");
    }

    #[test]
    fn test_document_error_kind_parse() {
        assert_eq!(
            "rate-limit".parse::<DocumentErrorKind>().unwrap(),
            DocumentErrorKind::RateLimit
        );
        assert_eq!(
            "EMPTY_DOCUMENT".parse::<DocumentErrorKind>().unwrap(),
            DocumentErrorKind::EmptyDocument
        );
        assert!("bogus".parse::<DocumentErrorKind>().is_err());
    }

    #[test]
    fn test_document_error_kind_permanence() {
        assert!(DocumentErrorKind::UnsupportedFileType.is_permanent());
        assert!(DocumentErrorKind::EncodingError.is_permanent());
        assert!(!DocumentErrorKind::QuotaExceeded.is_permanent());
        assert!(!DocumentErrorKind::Storage.is_permanent());
    }

    #[test]
    fn test_error_propagation_with_question_mark() {
        fn inner() -> Result<i32> {
            Err(Error::config("inner error"))
        }

        fn outer() -> Result<i32> {
            let _ = inner()?;
            Ok(0)
        }

        let result = outer();
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "configuration error: inner error"
        );
    }
}
