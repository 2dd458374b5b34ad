//! Fingerprint-based polling watcher.
//!
//! Used where notifications are unreliable, most often container volume
//! mounts. Each cycle lists the source tree, compares (mtime, size)
//! fingerprints against the previous cycle, and processes what is new or
//! changed.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use super::fingerprint::FileFingerprint;
use super::scanner::{find_empty_directories, is_readable_dir, list_files};
use super::stability::{Stability, StabilityCheck};
use super::stats::{MonitoringStats, MonitoringStatsSnapshot};
use super::{join_with_timeout, FolderWatcher, WatcherMode, STOP_TIMEOUT};
use crate::config::{Config, MIN_POLLING_INTERVAL};
use crate::error::WatcherError;
use crate::observability::spans;
use crate::processor::{FileDisposition, RetryableProcessor};
use crate::Result;

/// Factor applied to the interval in container volume mode.
const DOCKER_INTERVAL_FACTOR: f64 = 0.8;

/// Polling behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingOptions {
    /// Time between cycles (never below [`MIN_POLLING_INTERVAL`]).
    pub interval: Duration,
    /// Stability-check the whole queue before processing any of it.
    pub batch_mode: bool,
    /// Per-file stability sampling.
    pub stability: StabilityCheck,
}

impl PollingOptions {
    /// Options derived from configuration.
    ///
    /// Container volume mode shortens the interval by 20% and turns on batching.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let mut interval = config.polling_interval.max(MIN_POLLING_INTERVAL);
        if config.docker_volume_mode {
            interval = interval
                .mul_f64(DOCKER_INTERVAL_FACTOR)
                .max(MIN_POLLING_INTERVAL);
        }
        Self {
            interval,
            batch_mode: config.docker_volume_mode,
            stability: StabilityCheck::polling(),
        }
    }
}

/// State shared between the public handle and the polling thread.
struct PollState {
    source: PathBuf,
    processor: Arc<RetryableProcessor>,
    options: PollingOptions,
    fingerprints: Mutex<HashMap<PathBuf, FileFingerprint>>,
    /// Serialises timer cycles and manual rescans.
    cycle_lock: Mutex<()>,
    stats: MonitoringStats,
    source_lost: AtomicBool,
    /// Set by `stop()`; queue processing checks it between files.
    halted: AtomicBool,
}

/// Periodic scanning watcher.
pub struct PollingWatcher {
    state: Arc<PollState>,
    running: Arc<AtomicBool>,
    shutdown_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
    catch_up: bool,
}

impl PollingWatcher {
    /// Create a polling watcher for `config.source_folder`.
    #[must_use]
    pub fn new(config: &Config, processor: Arc<RetryableProcessor>) -> Self {
        Self::with_options(
            config.source_folder.clone(),
            processor,
            PollingOptions::from_config(config),
        )
    }

    /// Create a polling watcher with explicit options.
    #[must_use]
    pub fn with_options(
        source: PathBuf,
        processor: Arc<RetryableProcessor>,
        options: PollingOptions,
    ) -> Self {
        Self {
            state: Arc::new(PollState {
                source,
                processor,
                options,
                fingerprints: Mutex::new(HashMap::new()),
                cycle_lock: Mutex::new(()),
                stats: MonitoringStats::default(),
                source_lost: AtomicBool::new(false),
                halted: AtomicBool::new(false),
            }),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx: None,
            worker: None,
            catch_up: false,
        }
    }

    /// Run a full [`rescan`](Self::rescan) on the polling thread before the
    /// first timed cycle, so files already waiting are processed without
    /// blocking `start()`.
    #[must_use]
    pub const fn with_catch_up(mut self) -> Self {
        self.catch_up = true;
        self
    }

    /// Effective options.
    #[must_use]
    pub fn options(&self) -> PollingOptions {
        self.state.options
    }

    /// Whether the watcher has been started and not stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of fingerprints currently tracked.
    #[must_use]
    pub fn tracked_files(&self) -> usize {
        self.state.fingerprints.lock().len()
    }

    /// Record a fingerprint for every existing file without processing any.
    ///
    /// # Errors
    ///
    /// Returns an error if the source folder cannot be read.
    pub fn baseline(&self) -> Result<usize> {
        self.state.baseline()
    }

    /// Run one polling cycle. Returns the number of files handed to the processor.
    ///
    /// # Errors
    ///
    /// Returns an error if the source folder cannot be read.
    pub fn poll_once(&self) -> Result<usize> {
        self.state.poll_once()
    }

    /// Process every file currently in the source tree, ignoring fingerprints,
    /// then relocate empty directories.
    ///
    /// Independent of the timer; safe to call while the watcher runs. After
    /// `stop()` it processes nothing until the watcher is started again.
    ///
    /// # Errors
    ///
    /// Returns an error if the source folder cannot be read.
    pub fn rescan(&self) -> Result<usize> {
        self.state.rescan()
    }
}

impl FolderWatcher for PollingWatcher {
    fn mode(&self) -> WatcherMode {
        WatcherMode::Polling
    }

    fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let tracked = self.state.baseline()?;
        self.state.source_lost.store(false, Ordering::SeqCst);
        self.state.halted.store(false, Ordering::SeqCst);
        let catch_up = self.catch_up;

        let (shutdown_tx, shutdown_rx) = bounded(1);
        let state = Arc::clone(&self.state);
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        let worker = thread::Builder::new()
            .name("dropwatch-polling".to_string())
            .spawn(move || {
                if catch_up {
                    if let Err(e) = state.rescan() {
                        tracing::warn!(error = %e, "Catch-up scan failed");
                    }
                }
                poll_loop(&state, &running, &shutdown_rx);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                WatcherError::SpawnFailed {
                    name: "polling",
                    reason: e.to_string(),
                }
            })?;

        self.shutdown_tx = Some(shutdown_tx);
        self.worker = Some(worker);

        tracing::info!(
            path = %self.state.source.display(),
            interval_ms = u64::try_from(self.state.options.interval.as_millis()).unwrap_or(u64::MAX),
            batch_mode = self.state.options.batch_mode,
            baseline_files = tracked,
            catch_up,
            "Polling watcher started"
        );
        Ok(())
    }

    fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) && self.worker.is_none() {
            return;
        }

        self.state.halted.store(true, Ordering::SeqCst);
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(worker) = self.worker.take() {
            join_with_timeout(worker, STOP_TIMEOUT, "dropwatch-polling");
        }

        tracing::info!(path = %self.state.source.display(), "Polling watcher stopped");
    }

    fn is_healthy(&self) -> bool {
        if !self.is_running() || self.state.source_lost.load(Ordering::SeqCst) {
            return false;
        }
        if self.worker.as_ref().map_or(true, JoinHandle::is_finished) {
            tracing::warn!("Polling thread is not alive");
            return false;
        }
        is_readable_dir(&self.state.source)
    }

    fn stats(&self) -> MonitoringStatsSnapshot {
        self.state.stats.snapshot()
    }
}

impl Drop for PollingWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_loop(state: &PollState, running: &AtomicBool, shutdown: &Receiver<()>) {
    loop {
        match shutdown.recv_timeout(state.options.interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }

        if let Err(e) = state.poll_once() {
            tracing::error!(
                path = %state.source.display(),
                error = %e,
                "Source folder unavailable, polling stopped"
            );
            state.source_lost.store(true, Ordering::SeqCst);
            break;
        }
    }
    tracing::debug!("Polling thread exiting");
}

impl PollState {
    fn baseline(&self) -> Result<usize> {
        let _cycle = self.cycle_lock.lock();
        let files = list_files(&self.source)?;

        let mut fingerprints = self.fingerprints.lock();
        fingerprints.clear();
        for path in files {
            if let Ok(fp) = FileFingerprint::capture(&path) {
                fingerprints.insert(path, fp);
            }
        }

        tracing::debug!(count = fingerprints.len(), "Recorded baseline fingerprints");
        Ok(fingerprints.len())
    }

    fn poll_once(&self) -> Result<usize> {
        let _cycle = self.cycle_lock.lock();
        self.stats.polling_cycles.fetch_add(1, Ordering::Relaxed);

        let files = list_files(&self.source)?;
        let queue = self.detect_changes(files);
        if queue.is_empty() {
            return Ok(0);
        }

        tracing::debug!(count = queue.len(), "Detected new or changed files");
        Ok(self.process_queue(queue))
    }

    fn rescan(&self) -> Result<usize> {
        let _cycle = self.cycle_lock.lock();
        let span = spans::rescan_span(&self.source);
        let _guard = span.enter();
        self.stats.rescans.fetch_add(1, Ordering::Relaxed);
        tracing::info!(path = %self.source.display(), "Manual rescan started");

        let files = list_files(&self.source)?;
        {
            let mut fingerprints = self.fingerprints.lock();
            for path in &files {
                if let Ok(fp) = FileFingerprint::capture(path) {
                    fingerprints.insert(path.clone(), fp);
                }
            }
        }
        self.stats
            .files_detected
            .fetch_add(files.len() as u64, Ordering::Relaxed);
        let processed = self.process_queue(files);

        for dir in find_empty_directories(&self.source)? {
            if self.halted.load(Ordering::SeqCst) {
                break;
            }
            if self.processor.process_empty_directory(&dir).success {
                self.stats.empty_directories.fetch_add(1, Ordering::Relaxed);
            }
        }

        tracing::info!(processed, "Manual rescan finished");
        Ok(processed)
    }

    /// Compare fresh fingerprints to the stored map.
    ///
    /// Returns new or changed paths in traversal order and drops entries for
    /// paths that are gone. Queued paths get their fresh fingerprint stored.
    fn detect_changes(&self, files: Vec<PathBuf>) -> Vec<PathBuf> {
        let mut fingerprints = self.fingerprints.lock();
        {
            let present: HashSet<&Path> = files.iter().map(PathBuf::as_path).collect();
            fingerprints.retain(|path, _| present.contains(path.as_path()));
        }

        let mut queue = Vec::new();
        for path in files {
            let Ok(current) = FileFingerprint::capture(&path) else {
                continue;
            };
            let changed = fingerprints
                .get(&path)
                .map_or(true, |previous| current.differs_from(previous));
            if changed {
                tracing::debug!(path = %path.display(), size = current.size, "Fingerprint changed");
                fingerprints.insert(path.clone(), current);
                queue.push(path);
            }
        }

        self.stats
            .files_detected
            .fetch_add(queue.len() as u64, Ordering::Relaxed);
        queue
    }

    /// Stability-check and process `queue`. Returns the number processed.
    fn process_queue(&self, queue: Vec<PathBuf>) -> usize {
        let (ignorable, candidates): (Vec<PathBuf>, Vec<PathBuf>) = queue
            .into_iter()
            .partition(|p| self.processor.disposition(p) != FileDisposition::Process);

        // Ignored files keep their fingerprint so they are not re-flagged.
        for path in &ignorable {
            let outcome = self.processor.process_file(path);
            self.stats.record(&outcome);
        }

        let mut processed = 0;
        if self.options.batch_mode {
            let checks = self.options.stability.wait_batch(&candidates);
            for (path, stability) in candidates.iter().zip(checks) {
                if self.process_if_stable(path, stability) {
                    processed += 1;
                }
            }
        } else {
            for path in &candidates {
                let stability = self.options.stability.wait(path);
                if self.process_if_stable(path, stability) {
                    processed += 1;
                }
            }
        }
        processed
    }

    fn process_if_stable(&self, path: &Path, stability: Stability) -> bool {
        if self.halted.load(Ordering::SeqCst) {
            self.fingerprints.lock().remove(path);
            return false;
        }
        match stability {
            Stability::Stable => {}
            Stability::Vanished => {
                self.fingerprints.lock().remove(path);
                return false;
            }
            Stability::Unstable => {
                // Forget it so the next cycle sees it as new once the write finishes.
                self.fingerprints.lock().remove(path);
                self.stats.unstable_files.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(path = %path.display(), "File still being written, deferring");
                return false;
            }
        }

        let outcome = self.processor.process_file(path);
        self.stats.record(&outcome);
        self.fingerprints.lock().remove(path);
        true
    }
}
