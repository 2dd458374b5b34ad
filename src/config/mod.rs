//! Configuration management for Dropwatch.
//!
//! Supports configuration from:
//! - Command-line arguments (highest priority)
//! - Environment variables
//! - Built-in defaults (lowest priority)

mod retry;
mod settings;

pub use retry::RetryPolicy;
pub use settings::{Config, MonitoringMode, MIN_POLLING_INTERVAL};
