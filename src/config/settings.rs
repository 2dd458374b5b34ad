//! Configuration settings and validation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use super::RetryPolicy;
use crate::{Error, Result};

/// Shortest polling interval accepted.
pub const MIN_POLLING_INTERVAL: Duration = Duration::from_millis(500);

/// Requested file monitoring strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MonitoringMode {
    /// Detect at startup.
    #[default]
    Auto,
    /// OS file-system notifications.
    Events,
    /// Periodic directory scans.
    Polling,
}

impl fmt::Display for MonitoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::Events => "events",
            Self::Polling => "polling",
        };
        f.write_str(name)
    }
}

impl FromStr for MonitoringMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "events" | "event" => Ok(Self::Events),
            "polling" | "poll" => Ok(Self::Polling),
            other => Err(Error::config(format!(
                "invalid monitoring mode '{other}', must be one of: auto, events, polling"
            ))),
        }
    }
}

/// Main configuration for the Dropwatch engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory tree watched for new files.
    pub source_folder: PathBuf,

    /// Destination tree for successfully processed files.
    pub saved_folder: PathBuf,

    /// Destination tree for failed files and their logs.
    pub error_folder: PathBuf,

    /// Watcher selection preference.
    pub monitoring_mode: MonitoringMode,

    /// Interval between polling scans.
    pub polling_interval: Duration,

    /// Source is a container volume mount (faster polling, batch stability checks).
    pub docker_volume_mode: bool,

    /// Retry tuning for pipeline stages.
    pub retry: RetryPolicy,

    /// Interval between hybrid health checks.
    pub health_check_interval: Duration,

    /// Extra gitignore-style patterns for files to leave alone.
    pub ignore_patterns: Vec<String>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_folder: PathBuf::from("./data/source"),
            saved_folder: PathBuf::from("./data/saved"),
            error_folder: PathBuf::from("./data/error"),
            monitoring_mode: MonitoringMode::Auto,
            polling_interval: Duration::from_secs(1),
            docker_volume_mode: false,
            retry: RetryPolicy::default(),
            health_check_interval: Duration::from_secs(30),
            ignore_patterns: Vec::new(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for the three given folders, defaults elsewhere.
    pub fn with_folders(
        source: impl Into<PathBuf>,
        saved: impl Into<PathBuf>,
        error: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_folder: source.into(),
            saved_folder: saved.into(),
            error_folder: error.into(),
            ..Self::default()
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        for (name, folder) in [
            ("source_folder", &self.source_folder),
            ("saved_folder", &self.saved_folder),
            ("error_folder", &self.error_folder),
        ] {
            if folder.as_os_str().is_empty() {
                return Err(Error::config(format!("{name} cannot be empty")));
            }
        }

        let source = normalize(&self.source_folder);
        let saved = normalize(&self.saved_folder);
        let error = normalize(&self.error_folder);

        if source == saved || source == error {
            return Err(Error::config(
                "source_folder must differ from saved_folder and error_folder",
            ));
        }
        if saved == error {
            return Err(Error::config("saved_folder and error_folder must differ"));
        }
        if saved.starts_with(&source) || error.starts_with(&source) {
            return Err(Error::config(
                "saved_folder and error_folder cannot be inside source_folder",
            ));
        }

        if self.polling_interval < MIN_POLLING_INTERVAL {
            return Err(Error::config(format!(
                "polling_interval must be at least {}s",
                MIN_POLLING_INTERVAL.as_secs_f64()
            )));
        }

        if self.health_check_interval.is_zero() {
            return Err(Error::config("health_check_interval cannot be 0"));
        }

        self.retry.validate()?;

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    /// Create the saved and error trees if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the source folder is missing or a destination
    /// cannot be created.
    pub fn prepare_folders(&self) -> Result<()> {
        if !self.source_folder.is_dir() {
            return Err(Error::config(format!(
                "source_folder '{}' does not exist or is not a directory",
                self.source_folder.display()
            )));
        }
        std::fs::create_dir_all(&self.saved_folder)?;
        std::fs::create_dir_all(&self.error_folder)?;
        Ok(())
    }
}

/// Absolute, canonical where possible, form of a configured folder.
fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
