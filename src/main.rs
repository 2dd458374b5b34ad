//! Dropwatch - drop-folder ingestion
//!
//! Entry point for the Dropwatch service.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dropwatch::observability::init_tracing;
use dropwatch::watcher::PollingWatcher;
use dropwatch::{Config, HybridWatcher, MonitoringMode, RetryPolicy, RetryableProcessor};
use tokio::signal;

/// How often the binary checks whether monitoring has been lost.
const FAILURE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Dropwatch - watch a folder and file every dropped document into saved/error trees
#[derive(Parser, Debug)]
#[command(name = "dropwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Folder to watch for new files
    #[arg(short, long, env = "DROPWATCH_SOURCE_FOLDER", default_value = "./data/source")]
    source_folder: PathBuf,

    /// Destination for successfully processed files
    #[arg(long, env = "DROPWATCH_SAVED_FOLDER", default_value = "./data/saved")]
    saved_folder: PathBuf,

    /// Destination for failed files and their logs
    #[arg(long, env = "DROPWATCH_ERROR_FOLDER", default_value = "./data/error")]
    error_folder: PathBuf,

    /// Monitoring strategy
    #[arg(short, long, env = "DROPWATCH_MONITORING_MODE", value_enum, default_value_t = MonitoringMode::Auto)]
    monitoring_mode: MonitoringMode,

    /// Seconds between polling cycles (minimum 0.5)
    #[arg(long, env = "DROPWATCH_POLLING_INTERVAL", default_value = "1.0")]
    polling_interval: f64,

    /// Tune polling for container volume mounts (shorter interval, batch processing)
    #[arg(long, env = "DROPWATCH_DOCKER_VOLUME_MODE")]
    docker_volume_mode: bool,

    /// Attempts per pipeline stage before giving up
    #[arg(long, env = "DROPWATCH_MAX_ATTEMPTS", default_value = "3")]
    max_attempts: u32,

    /// Seconds before the first retry
    #[arg(long, env = "DROPWATCH_BASE_DELAY", default_value = "1.0")]
    base_delay: f64,

    /// Upper bound on the delay between retries, in seconds
    #[arg(long, env = "DROPWATCH_MAX_DELAY", default_value = "30.0")]
    max_delay: f64,

    /// Growth factor of the retry delay
    #[arg(long, env = "DROPWATCH_BACKOFF_MULTIPLIER", default_value = "2.0")]
    backoff_multiplier: f64,

    /// Extra gitignore-style patterns for files to leave alone
    #[arg(long, env = "DROPWATCH_IGNORE", value_delimiter = ',')]
    ignore: Vec<String>,

    /// Seconds between watcher health checks
    #[arg(long, env = "DROPWATCH_HEALTH_CHECK_INTERVAL", default_value = "30")]
    health_check_interval: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DROPWATCH_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "DROPWATCH_LOG_JSON")]
    log_json: bool,

    /// Process everything currently in the source folder once, then exit
    #[arg(long)]
    scan_once: bool,
}

impl Cli {
    fn to_config(&self) -> anyhow::Result<Config> {
        Ok(Config {
            source_folder: self.source_folder.clone(),
            saved_folder: self.saved_folder.clone(),
            error_folder: self.error_folder.clone(),
            monitoring_mode: self.monitoring_mode,
            polling_interval: seconds("polling-interval", self.polling_interval)?,
            docker_volume_mode: self.docker_volume_mode,
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                base_delay: seconds("base-delay", self.base_delay)?,
                max_delay: seconds("max-delay", self.max_delay)?,
                backoff_multiplier: self.backoff_multiplier,
            },
            health_check_interval: seconds("health-check-interval", self.health_check_interval)?,
            ignore_patterns: self.ignore.clone(),
            log_level: self.log_level.clone(),
        })
    }
}

fn seconds(name: &str, value: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("invalid --{name}: {value}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.log_json)?;

    tracing::info!("Dropwatch v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = cli.to_config()?;
    tracing::debug!(?config, "Configuration loaded");

    config.validate()?;
    config
        .prepare_folders()
        .context("failed to prepare folders")?;

    tracing::info!(
        source = %config.source_folder.display(),
        saved = %config.saved_folder.display(),
        error = %config.error_folder.display(),
        mode = %config.monitoring_mode,
        "Folders ready"
    );

    let processor = Arc::new(RetryableProcessor::new(&config, None)?);

    if cli.scan_once {
        let scanner = PollingWatcher::new(&config, Arc::clone(&processor));
        let processed = tokio::task::spawn_blocking(move || scanner.rescan())
            .await
            .context("scan task failed")??;
        processor.cleanup();
        tracing::info!(
            processed,
            stats = %serde_json::to_string(&processor.stats())?,
            "Scan complete"
        );
        return Ok(());
    }

    let mut watcher = HybridWatcher::new(config, processor);
    watcher.start().context("failed to start monitoring")?;

    let lost = tokio::select! {
        () = shutdown_signal() => false,
        () = monitoring_lost(&watcher) => true,
    };

    let stats = tokio::task::spawn_blocking(move || {
        watcher.stop();
        watcher.stats()
    })
    .await
    .context("shutdown task failed")?;

    tracing::info!(stats = %serde_json::to_string(&stats)?, "Final statistics");

    if lost {
        anyhow::bail!("monitoring of the source folder failed and could not be recovered");
    }
    Ok(())
}

/// Resolve once the hybrid watcher gives up on monitoring.
async fn monitoring_lost(watcher: &HybridWatcher) {
    let mut ticks = tokio::time::interval(FAILURE_CHECK_INTERVAL);
    loop {
        ticks.tick().await;
        if watcher.has_failed() {
            tracing::error!(
                path = %watcher.source_folder().display(),
                "Monitoring lost, shutting down"
            );
            return;
        }
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
