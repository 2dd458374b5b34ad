//! Classify-and-retry envelope for pipeline stages.

use std::thread;

use super::classify::ErrorClass;
use crate::config::RetryPolicy;
use crate::error::ProcessError;

/// Result of running an operation through [`with_retry`].
#[derive(Debug)]
pub struct Attempted<T> {
    /// Final result.
    pub result: Result<T, ProcessError>,
    /// Attempts made, including the first.
    pub attempts: u32,
    /// Class of the final error, if the operation failed.
    pub class: Option<ErrorClass>,
}

impl<T> Attempted<T> {
    /// Attempts beyond the first.
    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Run `op` under `policy`.
///
/// Permanent errors stop immediately. Transient and unknown errors are
/// retried until `max_attempts` is reached, sleeping
/// `policy.delay_for(attempt)` between attempts. `op` receives the
/// zero-based attempt number.
pub fn with_retry<T, F>(policy: &RetryPolicy, operation: &str, mut op: F) -> Attempted<T>
where
    F: FnMut(u32) -> Result<T, ProcessError>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op(attempt) {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(operation, attempts = attempt + 1, "Succeeded after retry");
                }
                return Attempted {
                    result: Ok(value),
                    attempts: attempt + 1,
                    class: None,
                };
            }
            Err(err) => {
                let class = ErrorClass::of(&err);
                let attempts = attempt + 1;

                if !class.is_retryable() {
                    tracing::warn!(operation, %class, error = %err, "Permanent failure, not retrying");
                    return Attempted {
                        result: Err(err),
                        attempts,
                        class: Some(class),
                    };
                }

                if attempts >= max_attempts {
                    tracing::warn!(operation, %class, attempts, error = %err, "Retries exhausted");
                    return Attempted {
                        result: Err(err),
                        attempts,
                        class: Some(class),
                    };
                }

                let delay = policy.delay_for(attempt);
                if class == ErrorClass::Unknown {
                    tracing::warn!(
                        operation,
                        attempt = attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Unclassified failure, retrying"
                    );
                } else {
                    tracing::warn!(
                        operation,
                        attempt = attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Transient failure, retrying"
                    );
                }
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocumentErrorKind;
    use std::io;

    #[test]
    fn test_success_first_try() {
        let out = with_retry(&RetryPolicy::immediate(3), "op", |_| Ok::<_, ProcessError>(7));
        assert_eq!(out.attempts, 1);
        assert_eq!(out.retries(), 0);
        assert!(out.class.is_none());
        assert_eq!(out.result.unwrap(), 7);
    }

    #[test]
    fn test_transient_attempted_exactly_max_attempts() {
        let mut calls = 0;
        let out: Attempted<()> = with_retry(&RetryPolicy::immediate(4), "op", |_| {
            calls += 1;
            Err(ProcessError::from(io::Error::new(io::ErrorKind::Other, "busy")))
        });
        assert_eq!(calls, 4);
        assert_eq!(out.attempts, 4);
        assert_eq!(out.class, Some(ErrorClass::Transient));
    }

    #[test]
    fn test_permanent_attempted_once() {
        let mut calls = 0;
        let out: Attempted<()> = with_retry(&RetryPolicy::immediate(5), "op", |_| {
            calls += 1;
            Err(ProcessError::document(
                Some(DocumentErrorKind::UnsupportedFileType),
                "nope",
            ))
        });
        assert_eq!(calls, 1);
        assert_eq!(out.attempts, 1);
        assert_eq!(out.class, Some(ErrorClass::Permanent));
    }

    #[test]
    fn test_unknown_is_retried() {
        let mut calls = 0;
        let out: Attempted<()> = with_retry(&RetryPolicy::immediate(2), "op", |_| {
            calls += 1;
            Err(ProcessError::document(None, "mystery"))
        });
        assert_eq!(calls, 2);
        assert_eq!(out.class, Some(ErrorClass::Unknown));
    }

    #[test]
    fn test_recovers_after_transient() {
        let out = with_retry(&RetryPolicy::immediate(3), "op", |attempt| {
            if attempt < 2 {
                Err(ProcessError::document(
                    Some(DocumentErrorKind::Timeout),
                    "slow",
                ))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(out.attempts, 3);
        assert_eq!(out.retries(), 2);
        assert_eq!(out.result.unwrap(), 2);
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        let mut calls = 0;
        let _: Attempted<()> = with_retry(&RetryPolicy::immediate(0), "op", |_| {
            calls += 1;
            Err(ProcessError::document(None, "x"))
        });
        assert_eq!(calls, 1);
    }
}
