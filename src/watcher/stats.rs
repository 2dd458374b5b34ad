//! Monitoring counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::processor::ProcessingOutcome;

/// Counters owned by the active watcher.
#[derive(Debug, Default)]
pub struct MonitoringStats {
    pub events_received: AtomicU64,
    pub files_detected: AtomicU64,
    pub files_processed: AtomicU64,
    pub files_succeeded: AtomicU64,
    pub processing_errors: AtomicU64,
    pub duplicates_filtered: AtomicU64,
    pub files_ignored: AtomicU64,
    pub unstable_files: AtomicU64,
    pub empty_directories: AtomicU64,
    pub polling_cycles: AtomicU64,
    pub rescans: AtomicU64,
}

impl MonitoringStats {
    /// Count one processor outcome.
    pub fn record(&self, outcome: &ProcessingOutcome) {
        if outcome.ignored {
            self.files_ignored.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        if outcome.success {
            self.files_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.processing_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> MonitoringStatsSnapshot {
        MonitoringStatsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            files_detected: self.files_detected.load(Ordering::Relaxed),
            files_processed: self.files_processed.load(Ordering::Relaxed),
            files_succeeded: self.files_succeeded.load(Ordering::Relaxed),
            processing_errors: self.processing_errors.load(Ordering::Relaxed),
            duplicates_filtered: self.duplicates_filtered.load(Ordering::Relaxed),
            files_ignored: self.files_ignored.load(Ordering::Relaxed),
            unstable_files: self.unstable_files.load(Ordering::Relaxed),
            empty_directories: self.empty_directories.load(Ordering::Relaxed),
            polling_cycles: self.polling_cycles.load(Ordering::Relaxed),
            rescans: self.rescans.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of monitoring stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitoringStatsSnapshot {
    pub events_received: u64,
    pub files_detected: u64,
    pub files_processed: u64,
    pub files_succeeded: u64,
    pub processing_errors: u64,
    pub duplicates_filtered: u64,
    pub files_ignored: u64,
    pub unstable_files: u64,
    pub empty_directories: u64,
    pub polling_cycles: u64,
    pub rescans: u64,
}
