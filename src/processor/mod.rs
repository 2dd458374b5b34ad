//! File processing pipeline.
//!
//! Provides:
//! - Error classification (transient vs. permanent)
//! - A classify-and-retry envelope for pipeline stages
//! - The pluggable document processor contract
//! - Ignore rules for system and temporary files
//! - Failure logs written next to relocated files
//! - [`RetryableProcessor`], which ties them together

mod classify;
mod document;
pub mod error_log;
mod filter;
mod pipeline;
mod retry;

pub use classify::ErrorClass;
pub use document::{BaselineValidator, DocumentProcessor, DocumentResult};
pub use filter::{FileDisposition, FileFilter};
pub use pipeline::{ProcessingOutcome, ProcessorStats, ProcessorStatsSnapshot, RetryableProcessor};
pub use retry::{with_retry, Attempted};
