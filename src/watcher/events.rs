//! Notification-driven watcher using notify-rs.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use super::dedup::{RecentPaths, RECENT_PATHS_CAPACITY};
use super::scanner::{find_empty_directories, is_readable_dir, list_files};
use super::stability::{Stability, StabilityCheck};
use super::stats::{MonitoringStats, MonitoringStatsSnapshot};
use super::{join_with_timeout, FolderWatcher, WatcherMode, STOP_TIMEOUT};
use crate::config::Config;
use crate::error::WatcherError;
use crate::processor::{FileDisposition, RetryableProcessor};
use crate::Result;

/// Enumeration attempts for a freshly created directory that looks empty.
const DIRECTORY_SCAN_ATTEMPTS: u32 = 3;

/// Base delay between those attempts; grows linearly.
const DIRECTORY_SCAN_DELAY: Duration = Duration::from_millis(500);

type NotifyResult = std::result::Result<Event, notify::Error>;

/// State shared with the dispatch thread.
struct Dispatch {
    source: PathBuf,
    processor: Arc<RetryableProcessor>,
    stability: StabilityCheck,
    recent: Mutex<RecentPaths>,
    stats: MonitoringStats,
    subscription_failed: AtomicBool,
}

/// Recursive notification watcher over the source folder.
///
/// A single dispatch thread handles events in delivery order, so a slow
/// file delays the ones behind it.
pub struct EventWatcher {
    dispatch: Arc<Dispatch>,
    running: Arc<AtomicBool>,
    watcher: Option<RecommendedWatcher>,
    shutdown_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl EventWatcher {
    /// Create an event watcher for `config.source_folder`.
    #[must_use]
    pub fn new(config: &Config, processor: Arc<RetryableProcessor>) -> Self {
        Self {
            dispatch: Arc::new(Dispatch {
                source: config.source_folder.clone(),
                processor,
                stability: StabilityCheck::events(),
                recent: Mutex::new(RecentPaths::new(RECENT_PATHS_CAPACITY)),
                stats: MonitoringStats::default(),
                subscription_failed: AtomicBool::new(false),
            }),
            running: Arc::new(AtomicBool::new(false)),
            watcher: None,
            shutdown_tx: None,
            worker: None,
        }
    }

    /// Override the write-stability sampling.
    ///
    /// Only takes effect before `start()`.
    #[must_use]
    pub fn with_stability(mut self, stability: StabilityCheck) -> Self {
        if let Some(dispatch) = Arc::get_mut(&mut self.dispatch) {
            dispatch.stability = stability;
        }
        self
    }

    /// Whether the watcher has been started and not stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl FolderWatcher for EventWatcher {
    fn mode(&self) -> WatcherMode {
        WatcherMode::Events
    }

    fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let source = self.dispatch.source.clone();
        if !is_readable_dir(&source) {
            return Err(WatcherError::SourceUnavailable {
                path: source.display().to_string(),
                reason: "not a readable directory".to_string(),
            }
            .into());
        }

        let (event_tx, event_rx) = unbounded::<NotifyResult>();
        let mut watcher = notify::recommended_watcher(move |res: NotifyResult| {
            let _ = event_tx.send(res);
        })
        .map_err(|e| WatcherError::WatchFailed {
            path: source.display().to_string(),
            reason: e.to_string(),
        })?;

        watcher
            .watch(&source, RecursiveMode::Recursive)
            .map_err(|e| WatcherError::WatchFailed {
                path: source.display().to_string(),
                reason: e.to_string(),
            })?;

        let (shutdown_tx, shutdown_rx) = bounded(1);
        let dispatch = Arc::clone(&self.dispatch);
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        let worker = thread::Builder::new()
            .name("dropwatch-events".to_string())
            .spawn(move || {
                dispatch.initial_scan(&running);
                dispatch_loop(&dispatch, &running, &event_rx, &shutdown_rx);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                WatcherError::SpawnFailed {
                    name: "event dispatch",
                    reason: e.to_string(),
                }
            })?;

        self.watcher = Some(watcher);
        self.shutdown_tx = Some(shutdown_tx);
        self.worker = Some(worker);

        tracing::info!(path = %source.display(), "Event watcher started");
        Ok(())
    }

    fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) && self.worker.is_none() {
            return;
        }

        // Dropping the subscription closes the event channel.
        self.watcher = None;
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(worker) = self.worker.take() {
            join_with_timeout(worker, STOP_TIMEOUT, "dropwatch-events");
        }

        tracing::info!(path = %self.dispatch.source.display(), "Event watcher stopped");
    }

    fn is_healthy(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        if self.worker.as_ref().map_or(true, JoinHandle::is_finished) {
            tracing::warn!("Event dispatch thread is not alive");
            return false;
        }
        if self.dispatch.subscription_failed.load(Ordering::SeqCst) {
            tracing::warn!("Notification subscription reported an error");
            return false;
        }
        if !is_readable_dir(&self.dispatch.source) {
            tracing::error!(path = %self.dispatch.source.display(), "Source folder is not readable");
            return false;
        }
        true
    }

    fn stats(&self) -> MonitoringStatsSnapshot {
        self.dispatch.stats.snapshot()
    }
}

impl Drop for EventWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch_loop(
    dispatch: &Dispatch,
    running: &AtomicBool,
    events: &Receiver<NotifyResult>,
    shutdown: &Receiver<()>,
) {
    loop {
        select! {
            recv(shutdown) -> _ => break,
            recv(events) -> msg => match msg {
                Ok(Ok(event)) => dispatch.handle_event(&event),
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Notification error");
                    dispatch.subscription_failed.store(true, Ordering::SeqCst);
                }
                Err(_) => break,
            },
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }
    }
    tracing::debug!("Event dispatch thread exiting");
}

impl Dispatch {
    /// Process everything already in the source tree.
    fn initial_scan(&self, running: &AtomicBool) {
        tracing::info!(path = %self.source.display(), "Scanning existing files");

        match list_files(&self.source) {
            Ok(files) => {
                tracing::info!(count = files.len(), "Found existing files");
                for file in files {
                    if !running.load(Ordering::SeqCst) {
                        return;
                    }
                    self.handle_file(&file);
                }
            }
            Err(e) => tracing::error!(error = %e, "Initial scan failed"),
        }

        match find_empty_directories(&self.source) {
            Ok(dirs) => {
                for dir in dirs {
                    if !running.load(Ordering::SeqCst) {
                        return;
                    }
                    self.handle_empty_directory(&dir);
                }
            }
            Err(e) => tracing::error!(error = %e, "Empty directory scan failed"),
        }
    }

    fn handle_event(&self, event: &Event) {
        let path = match event.kind {
            EventKind::Create(_) => event.paths.first(),
            // Files moved into the tree; for a from/to pair the last path is the new one.
            EventKind::Modify(ModifyKind::Name(_)) => event.paths.last(),
            _ => return,
        };
        let Some(path) = path else { return };

        self.stats.events_received.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(path = %path.display(), kind = ?event.kind, "Received event");

        if path.is_dir() {
            self.handle_directory(path);
        } else {
            self.handle_file(path);
        }
    }

    /// Process the files of a newly created directory.
    ///
    /// Copies onto mounted volumes can create the directory well before its
    /// contents, so an empty listing is retried with growing delay.
    fn handle_directory(&self, dir: &Path) {
        let mut files = Vec::new();
        for attempt in 1..=DIRECTORY_SCAN_ATTEMPTS {
            match list_files(dir) {
                Ok(found) => files = found,
                Err(e) => {
                    tracing::debug!(dir = %dir.display(), error = %e, "Directory vanished");
                    return;
                }
            }
            if !files.is_empty() || attempt == DIRECTORY_SCAN_ATTEMPTS {
                break;
            }
            thread::sleep(DIRECTORY_SCAN_DELAY * attempt);
        }

        if files.is_empty() {
            tracing::debug!(dir = %dir.display(), "New directory has no files yet");
            return;
        }

        tracing::info!(dir = %dir.display(), count = files.len(), "Processing files from new directory");
        for file in files {
            self.handle_file(&file);
        }
    }

    fn handle_file(&self, path: &Path) {
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "File no longer present");
            return;
        }

        if !self.recent.lock().insert(path) {
            self.stats.duplicates_filtered.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(path = %path.display(), "Duplicate notification");
            return;
        }
        self.stats.files_detected.fetch_add(1, Ordering::Relaxed);

        self.process(path);

        self.recent.lock().remove(path);
    }

    fn process(&self, path: &Path) {
        if self.processor.disposition(path) != FileDisposition::Process {
            let outcome = self.processor.process_file(path);
            self.stats.record(&outcome);
            return;
        }

        match self.stability.wait(path) {
            Stability::Stable => {}
            Stability::Vanished => {
                tracing::debug!(path = %path.display(), "File disappeared before it settled");
                return;
            }
            Stability::Unstable => {
                self.stats.unstable_files.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(path = %path.display(), "File size still changing, processing anyway");
            }
        }

        let outcome = self.processor.process_file(path);
        self.stats.record(&outcome);
    }

    fn handle_empty_directory(&self, dir: &Path) {
        let outcome = self.processor.process_empty_directory(dir);
        if outcome.success {
            self.stats.empty_directories.fetch_add(1, Ordering::Relaxed);
        }
    }
}
