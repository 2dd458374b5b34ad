//! Structured logging setup.
//!
//! Provides:
//! - Structured logging with JSON output option
//! - `RUST_LOG` override of the configured level
//! - Span helpers shared by the watcher threads

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

use crate::{Error, Result};

/// Initialize tracing for the process.
///
/// `RUST_LOG`, when set, takes precedence over `level`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(level: &str, json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let installed = if json {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default().with(env_filter).with(json_layer).try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true);

        Registry::default().with(env_filter).with(fmt_layer).try_init()
    };
    installed.map_err(|e| Error::internal(format!("failed to install tracing subscriber: {e}")))?;

    tracing::debug!(level, json, "Tracing initialized");
    Ok(())
}

/// Span helpers.
pub mod spans {
    use std::path::Path;

    use tracing::{info_span, Span};

    /// Span covering the processing of one file.
    #[must_use]
    pub fn file_span(path: &Path) -> Span {
        info_span!("process_file", path = %path.display())
    }

    /// Span covering one manual rescan.
    #[must_use]
    pub fn rescan_span(source: &Path) -> Span {
        info_span!("rescan", source = %source.display())
    }
}
