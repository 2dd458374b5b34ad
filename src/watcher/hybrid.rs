//! Supervising watcher with mode selection and one-time failover.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::Serialize;

use super::detector::EnvironmentDetector;
use super::events::EventWatcher;
use super::polling::PollingWatcher;
use super::stats::MonitoringStatsSnapshot;
use super::{join_with_timeout, FolderWatcher, WatcherMode, STOP_TIMEOUT};
use crate::config::{Config, MonitoringMode};
use crate::error::WatcherError;
use crate::processor::{ProcessorStatsSnapshot, RetryableProcessor};
use crate::Result;

/// Lifecycle of the hybrid watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "mode")]
pub enum HybridState {
    Unstarted,
    SelectingMode,
    Active(WatcherMode),
    Recovering,
    /// Monitoring is lost and will not be recovered.
    Failed,
    Stopped,
}

/// Aggregated statistics.
#[derive(Debug, Clone, Serialize)]
pub struct HybridStats {
    pub state: HybridState,
    pub mode: Option<WatcherMode>,
    pub container_detected: bool,
    pub fallback_consumed: bool,
    pub health_checks: u64,
    pub failed_health_checks: u64,
    pub watcher: Option<MonitoringStatsSnapshot>,
    pub processor: ProcessorStatsSnapshot,
}

struct Supervisor {
    config: Config,
    processor: Arc<RetryableProcessor>,
    state: Mutex<HybridState>,
    active: Mutex<Option<Box<dyn FolderWatcher>>>,
    container_detected: AtomicBool,
    fallback_consumed: AtomicBool,
    shutting_down: AtomicBool,
    health_checks: AtomicU64,
    failed_health_checks: AtomicU64,
}

/// Picks a watcher, supervises it, and falls back to polling once if it fails.
pub struct HybridWatcher {
    supervisor: Arc<Supervisor>,
    detector: EnvironmentDetector,
    health_interval: Duration,
    health_tx: Option<Sender<()>>,
    health_thread: Option<JoinHandle<()>>,
}

impl HybridWatcher {
    /// Create a hybrid watcher. Nothing runs until [`start`](Self::start).
    #[must_use]
    pub fn new(config: Config, processor: Arc<RetryableProcessor>) -> Self {
        let health_interval = config.health_check_interval;
        Self {
            supervisor: Arc::new(Supervisor {
                config,
                processor,
                state: Mutex::new(HybridState::Unstarted),
                active: Mutex::new(None),
                container_detected: AtomicBool::new(false),
                fallback_consumed: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
                health_checks: AtomicU64::new(0),
                failed_health_checks: AtomicU64::new(0),
            }),
            detector: EnvironmentDetector::new(),
            health_interval,
            health_tx: None,
            health_thread: None,
        }
    }

    /// Use a specific environment detector.
    #[must_use]
    pub fn with_detector(mut self, detector: EnvironmentDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Select a mode, start that watcher, then start the health-check loop.
    ///
    /// Under `auto`, a notification watcher that fails to start is replaced
    /// by polling immediately, which uses up the one allowed fallback. An
    /// explicit `events` preference is never overridden at startup.
    ///
    /// # Errors
    ///
    /// Returns an error if no watcher can be started.
    pub fn start(&mut self) -> Result<()> {
        let sup = &self.supervisor;
        {
            let mut state = sup.state.lock();
            match *state {
                HybridState::Unstarted | HybridState::Stopped => *state = HybridState::SelectingMode,
                _ => return Ok(()),
            }
        }

        sup.shutting_down.store(false, Ordering::SeqCst);
        let source = sup.config.source_folder.clone();
        let preference = sup.config.monitoring_mode;
        sup.container_detected
            .store(self.detector.is_container(), Ordering::SeqCst);

        let mode = self.detector.recommend(preference, &source);
        tracing::info!(%mode, %preference, "Selected monitoring mode");

        let (watcher, mode) = match sup.start_watcher(mode) {
            Ok(watcher) => (watcher, mode),
            Err(e) if mode == WatcherMode::Events && preference == MonitoringMode::Auto => {
                tracing::warn!(error = %e, "Event watcher failed to start, falling back to polling");
                sup.fallback_consumed.store(true, Ordering::SeqCst);
                match sup.start_watcher(WatcherMode::Polling) {
                    Ok(watcher) => (watcher, WatcherMode::Polling),
                    Err(e) => {
                        sup.set_state(HybridState::Unstarted);
                        return Err(e);
                    }
                }
            }
            Err(e) => {
                sup.set_state(HybridState::Unstarted);
                return Err(e);
            }
        };

        *sup.active.lock() = Some(watcher);
        sup.set_state(HybridState::Active(mode));

        self.spawn_health_loop()?;
        tracing::info!(%mode, path = %source.display(), "Hybrid watcher started");
        Ok(())
    }

    fn spawn_health_loop(&mut self) -> Result<()> {
        let (tx, rx) = bounded(1);
        let sup = Arc::clone(&self.supervisor);
        let interval = self.health_interval;

        let handle = thread::Builder::new()
            .name("dropwatch-health".to_string())
            .spawn(move || health_loop(&sup, interval, &rx))
            .map_err(|e| WatcherError::SpawnFailed {
                name: "health check",
                reason: e.to_string(),
            })?;

        self.health_tx = Some(tx);
        self.health_thread = Some(handle);
        Ok(())
    }

    /// Stop the health-check loop, then the active watcher, then release
    /// the document processor.
    ///
    /// Each wait is bounded by [`STOP_TIMEOUT`].
    pub fn stop(&mut self) {
        self.supervisor.shutting_down.store(true, Ordering::SeqCst);
        if let Some(tx) = self.health_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.health_thread.take() {
            join_with_timeout(handle, STOP_TIMEOUT, "dropwatch-health");
        }

        let watcher = match self.supervisor.active.try_lock_for(STOP_TIMEOUT) {
            Some(mut active) => active.take(),
            None => {
                tracing::warn!("Active watcher is busy, leaving it to the health thread");
                None
            }
        };
        if let Some(mut watcher) = watcher {
            watcher.stop();
        }

        let mut state = self.supervisor.state.lock();
        if *state != HybridState::Stopped && *state != HybridState::Unstarted {
            self.supervisor.processor.cleanup();
            tracing::info!("Hybrid watcher stopped");
        }
        *state = HybridState::Stopped;
    }

    /// Whether monitoring has been lost for good.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.state() == HybridState::Failed
    }

    /// Run one health check now instead of waiting for the loop.
    ///
    /// Returns whether a healthy watcher is active afterwards.
    pub fn check_health_now(&self) -> bool {
        self.supervisor.check_health()
    }

    #[must_use]
    pub fn state(&self) -> HybridState {
        *self.supervisor.state.lock()
    }

    /// Mode of the active watcher.
    #[must_use]
    pub fn mode(&self) -> Option<WatcherMode> {
        self.supervisor.active.lock().as_ref().map(|w| w.mode())
    }

    #[must_use]
    pub fn is_fallback_consumed(&self) -> bool {
        self.supervisor.fallback_consumed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn source_folder(&self) -> &Path {
        &self.supervisor.config.source_folder
    }

    /// Hybrid metadata merged with the active watcher's and processor's counters.
    #[must_use]
    pub fn stats(&self) -> HybridStats {
        self.supervisor.stats()
    }
}

impl Drop for HybridWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn health_loop(sup: &Supervisor, interval: Duration, shutdown: &Receiver<()>) {
    loop {
        match shutdown.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        sup.check_health();
        if *sup.state.lock() == HybridState::Failed {
            break;
        }

        let stats = sup.stats();
        match serde_json::to_string(&stats) {
            Ok(json) => tracing::debug!(stats = %json, "Monitoring stats"),
            Err(e) => tracing::debug!(error = %e, "Could not serialize stats"),
        }
    }
    tracing::debug!("Health check thread exiting");
}

impl Supervisor {
    fn set_state(&self, state: HybridState) {
        *self.state.lock() = state;
    }

    fn start_watcher(&self, mode: WatcherMode) -> Result<Box<dyn FolderWatcher>> {
        let processor = Arc::clone(&self.processor);
        let mut watcher: Box<dyn FolderWatcher> = match mode {
            WatcherMode::Events => Box::new(EventWatcher::new(&self.config, processor)),
            WatcherMode::Polling => Box::new(PollingWatcher::new(&self.config, processor)),
        };
        watcher.start()?;
        Ok(watcher)
    }

    fn check_health(&self) -> bool {
        self.health_checks.fetch_add(1, Ordering::Relaxed);

        // Watchers are stopped and started outside the `active` lock.
        let failed = {
            let mut active = self.active.lock();
            let Some(watcher) = active.as_ref() else {
                return false;
            };
            if watcher.is_healthy() {
                tracing::debug!(mode = %watcher.mode(), "Health check passed");
                return true;
            }

            self.failed_health_checks.fetch_add(1, Ordering::Relaxed);
            let failed_mode = watcher.mode();

            if self.fallback_consumed.swap(true, Ordering::SeqCst) {
                tracing::error!(
                    mode = %failed_mode,
                    path = %self.config.source_folder.display(),
                    "Watcher unhealthy and fallback already used, monitoring has stopped"
                );
                self.set_state(HybridState::Failed);
                return false;
            }

            tracing::warn!(mode = %failed_mode, "Health check failed, falling back to polling");
            self.set_state(HybridState::Recovering);
            active.take()
        };

        if let Some(mut watcher) = failed {
            watcher.stop();
        }
        if self.shutting_down.load(Ordering::SeqCst) {
            return false;
        }

        // Files that arrived while the old watcher was failing are picked up
        // by the catch-up scan on the polling thread.
        let mut polling =
            PollingWatcher::new(&self.config, Arc::clone(&self.processor)).with_catch_up();
        if let Err(e) = polling.start() {
            tracing::error!(
                path = %self.config.source_folder.display(),
                error = %e,
                "Fallback to polling failed, monitoring has stopped"
            );
            if !self.shutting_down.load(Ordering::SeqCst) {
                self.set_state(HybridState::Failed);
            }
            return false;
        }

        {
            let mut active = self.active.lock();
            if !self.shutting_down.load(Ordering::SeqCst) {
                *active = Some(Box::new(polling));
                self.set_state(HybridState::Active(WatcherMode::Polling));
                tracing::info!("Now monitoring in polling mode");
                return true;
            }
        }
        polling.stop();
        false
    }

    fn stats(&self) -> HybridStats {
        let (mode, watcher) = {
            let active = self.active.lock();
            active
                .as_ref()
                .map_or((None, None), |w| (Some(w.mode()), Some(w.stats())))
        };
        HybridStats {
            state: *self.state.lock(),
            mode,
            container_detected: self.container_detected.load(Ordering::SeqCst),
            fallback_consumed: self.fallback_consumed.load(Ordering::SeqCst),
            health_checks: self.health_checks.load(Ordering::Relaxed),
            failed_health_checks: self.failed_health_checks.load(Ordering::Relaxed),
            watcher,
            processor: self.processor.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::processor::{DocumentProcessor, DocumentResult};
    use crate::watcher::ContainerSignals;
    use std::collections::HashSet;
    use std::fs;
    use std::path::PathBuf;
    use std::time::Instant;
    use tempfile::TempDir;

    struct Setup {
        _tmp: TempDir,
        source: PathBuf,
        saved: PathBuf,
        config: Config,
    }

    fn setup(mode: MonitoringMode) -> Setup {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source");
        let saved = tmp.path().join("saved");
        let error = tmp.path().join("error");
        fs::create_dir_all(&source).unwrap();
        let mut config = Config::with_folders(&source, &saved, &error);
        config.retry = RetryPolicy::immediate(1);
        config.monitoring_mode = mode;
        config.health_check_interval = Duration::from_secs(3600);
        Setup {
            _tmp: tmp,
            source,
            saved,
            config,
        }
    }

    fn hybrid(s: &Setup, signals: ContainerSignals) -> HybridWatcher {
        let processor = Arc::new(RetryableProcessor::new(&s.config, None).unwrap());
        HybridWatcher::new(s.config.clone(), processor)
            .with_detector(EnvironmentDetector::with_signals(signals))
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(25));
        }
        false
    }

    /// Accepts every file after a fixed delay.
    struct Slow(Duration);

    impl DocumentProcessor for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        fn initialize(&self, _config: &Config) -> Result<bool> {
            Ok(true)
        }

        fn supported_extensions(&self) -> HashSet<String> {
            HashSet::from(["txt".to_string()])
        }

        fn process_document(&self, _path: &Path) -> DocumentResult {
            thread::sleep(self.0);
            DocumentResult::ok(1)
        }

        fn cleanup(&self) {}
    }

    fn in_container() -> ContainerSignals {
        ContainerSignals {
            marker_file: Some(PathBuf::from("/.dockerenv")),
            ..ContainerSignals::default()
        }
    }

    #[test]
    fn test_explicit_events_mode() {
        let s = setup(MonitoringMode::Events);
        let mut w = hybrid(&s, in_container());

        w.start().unwrap();

        assert_eq!(w.mode(), Some(WatcherMode::Events));
        assert_eq!(w.state(), HybridState::Active(WatcherMode::Events));
        assert!(!w.is_fallback_consumed());
        assert!(w.stats().container_detected);
        w.stop();
        assert_eq!(w.state(), HybridState::Stopped);
    }

    #[test]
    fn test_auto_in_container_selects_polling() {
        let s = setup(MonitoringMode::Auto);
        let mut w = hybrid(&s, in_container());

        w.start().unwrap();

        assert_eq!(w.mode(), Some(WatcherMode::Polling));
        assert!(!w.is_fallback_consumed());
        w.stop();
    }

    #[test]
    fn test_start_fails_without_source() {
        let s = setup(MonitoringMode::Polling);
        fs::remove_dir(&s.source).unwrap();
        let mut w = hybrid(&s, ContainerSignals::default());

        assert!(w.start().is_err());
        assert_eq!(w.state(), HybridState::Unstarted);
        assert!(w.mode().is_none());
    }

    #[test]
    fn test_health_failure_falls_back_once() {
        let s = setup(MonitoringMode::Events);
        let mut w = hybrid(&s, ContainerSignals::default());
        w.start().unwrap();
        assert!(w.check_health_now());

        // Kill the event watcher, then drop a file it will never see.
        w.supervisor.active.lock().as_mut().unwrap().stop();
        fs::write(s.source.join("missed.txt"), b"missed").unwrap();

        assert!(w.check_health_now());
        assert_eq!(w.mode(), Some(WatcherMode::Polling));
        assert!(w.is_fallback_consumed());
        assert!(
            wait_for(|| s.saved.join("missed.txt").exists()),
            "catch-up scan should run"
        );

        let stats = w.stats();
        assert_eq!(stats.failed_health_checks, 1);
        assert_eq!(stats.state, HybridState::Active(WatcherMode::Polling));

        // A second failure is logged, not recovered.
        w.supervisor.active.lock().as_mut().unwrap().stop();
        assert!(!w.check_health_now());
        assert_eq!(w.mode(), Some(WatcherMode::Polling));
        assert_eq!(w.stats().failed_health_checks, 2);
        assert!(w.has_failed());

        w.stop();
    }

    #[test]
    fn test_stop_not_held_up_by_fallback_backlog() {
        let s = setup(MonitoringMode::Events);
        let slow: Arc<dyn DocumentProcessor> = Arc::new(Slow(Duration::from_secs(1)));
        let processor = Arc::new(RetryableProcessor::new(&s.config, Some(slow)).unwrap());
        let mut w = HybridWatcher::new(s.config.clone(), processor)
            .with_detector(EnvironmentDetector::with_signals(ContainerSignals::default()));
        w.start().unwrap();

        w.supervisor.active.lock().as_mut().unwrap().stop();
        for i in 0..4 {
            fs::write(s.source.join(format!("backlog_{i}.txt")), b"queued").unwrap();
        }

        let sup = Arc::clone(&w.supervisor);
        let checker = thread::spawn(move || sup.check_health());
        thread::sleep(Duration::from_millis(300));

        let started = Instant::now();
        w.stop();
        let elapsed = started.elapsed();

        assert!(elapsed < Duration::from_secs(3), "stop took {elapsed:?}");
        assert_eq!(w.state(), HybridState::Stopped);
        checker.join().unwrap();
    }

    #[test]
    fn test_stats_serialize() {
        let s = setup(MonitoringMode::Polling);
        let mut w = hybrid(&s, ContainerSignals::default());
        w.start().unwrap();

        let json = serde_json::to_value(w.stats()).unwrap();

        assert_eq!(json["mode"], "polling");
        assert_eq!(json["state"]["state"], "active");
        assert_eq!(json["state"]["mode"], "polling");
        assert_eq!(json["fallback_consumed"], false);
        assert!(json["watcher"]["polling_cycles"].is_u64());
        assert!(json["processor"]["total_processed"].is_u64());
        w.stop();
    }

    #[test]
    fn test_stop_without_start() {
        let s = setup(MonitoringMode::Polling);
        let mut w = hybrid(&s, ContainerSignals::default());
        w.stop();
        assert_eq!(w.state(), HybridState::Stopped);
    }
}
