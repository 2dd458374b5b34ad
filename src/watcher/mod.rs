//! Folder monitoring.
//!
//! This module provides:
//! - Notification-driven watching using notify-rs ([`EventWatcher`])
//! - Fingerprint-based polling for volumes where notifications are unreliable ([`PollingWatcher`])
//! - Environment detection to pick between the two ([`EnvironmentDetector`])
//! - A supervising façade with health checks and one-time failover ([`HybridWatcher`])

mod dedup;
mod detector;
mod events;
mod fingerprint;
mod hybrid;
mod polling;
mod scanner;
mod stability;
mod stats;

use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;

pub use dedup::{RecentPaths, RECENT_PATHS_CAPACITY};
pub use detector::{ContainerSignals, EnvironmentDetector, SELF_TEST_TIMEOUT};
pub use events::EventWatcher;
pub use fingerprint::FileFingerprint;
pub use hybrid::{HybridState, HybridStats, HybridWatcher};
pub use polling::{PollingOptions, PollingWatcher};
pub use scanner::{find_empty_directories, is_readable_dir, list_files};
pub use stability::{Stability, StabilityCheck};
pub use stats::{MonitoringStats, MonitoringStatsSnapshot};

use crate::Result;

/// How long `stop()` waits for a background thread before giving up on it.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Watching strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatcherMode {
    /// OS file-system notifications.
    Events,
    /// Periodic directory scans.
    Polling,
}

impl fmt::Display for WatcherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Events => f.write_str("events"),
            Self::Polling => f.write_str("polling"),
        }
    }
}

/// A watcher implementation the hybrid façade can supervise.
pub trait FolderWatcher: Send {
    /// Strategy this watcher implements.
    fn mode(&self) -> WatcherMode;

    /// Begin monitoring.
    ///
    /// # Errors
    ///
    /// Returns an error if the source folder cannot be watched or the
    /// background thread cannot be spawned.
    fn start(&mut self) -> Result<()>;

    /// Stop monitoring and wait (bounded) for the background thread.
    fn stop(&mut self);

    /// Background thread alive and source folder readable.
    fn is_healthy(&self) -> bool;

    /// Current counters.
    fn stats(&self) -> MonitoringStatsSnapshot;
}

/// Join `handle`, giving up after `timeout`.
///
/// Returns `false` (and leaves the thread detached) on timeout.
pub(crate) fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration, name: &str) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            tracing::warn!(
                thread = name,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "Background thread did not stop in time"
            );
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
    if handle.join().is_err() {
        tracing::error!(thread = name, "Background thread panicked");
    }
    true
}
