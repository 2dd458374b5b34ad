//! Dropwatch Library
//!
//! Unattended drop-folder ingestion: watch a source tree, run each new file
//! through a pluggable processing step, and move it into a saved or error
//! tree that mirrors the source layout.
//!
//! The engine is built from:
//! - [`relocator`]: structure-preserving moves, conflict resolution, empty-directory pruning
//! - [`processor`]: validation, classification, retry, and routing of single files
//! - [`watcher`]: notification and polling watchers behind a self-healing [`HybridWatcher`]

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod observability;
pub mod processor;
pub mod relocator;
pub mod watcher;

pub use config::{Config, MonitoringMode, RetryPolicy};
pub use error::{Error, Result};
pub use processor::{DocumentProcessor, ProcessingOutcome, RetryableProcessor};
pub use relocator::FileRelocator;
pub use watcher::{HybridWatcher, WatcherMode};
