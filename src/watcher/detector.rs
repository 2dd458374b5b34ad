//! Runtime environment detection.
//!
//! Decides whether OS notifications can be trusted for the source folder.
//! Container volume mounts commonly drop events, so containers always get
//! polling; on a native host a live self-test decides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecursiveMode, Watcher};
use uuid::Uuid;

use super::WatcherMode;
use crate::config::MonitoringMode;

/// How long the self-test waits for its creation event.
pub const SELF_TEST_TIMEOUT: Duration = Duration::from_secs(2);

const MARKER_FILES: &[&str] = &[".dockerenv", "run/.containerenv"];

const CONTAINER_ENV_VARS: &[&str] = &["DOCKER_CONTAINER", "container", "KUBERNETES_SERVICE_HOST"];

const CGROUP_MARKERS: &[&str] = &["docker", "kubepods", "containerd", "libpod", "lxc"];

const CONTAINER_INIT_NAMES: &[&str] = &["docker-init", "tini", "dumb-init", "catatonit", "s6-svscan"];

/// Evidence of running inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSignals {
    /// A container marker file exists.
    pub marker_file: Option<PathBuf>,
    /// A container-identifying environment variable is set.
    pub env_var: Option<String>,
    /// The init process cgroup names a container runtime.
    pub cgroup: bool,
    /// The init process is a known container init.
    pub init_process: Option<String>,
}

impl ContainerSignals {
    /// Probe the running system.
    #[must_use]
    pub fn probe() -> Self {
        Self::probe_at(Path::new("/"), |name| std::env::var(name).ok())
    }

    /// Probe with `root` standing in for `/` and `env` for the process environment.
    pub fn probe_at(root: &Path, env: impl Fn(&str) -> Option<String>) -> Self {
        let marker_file = MARKER_FILES
            .iter()
            .map(|m| root.join(m))
            .find(|p| p.exists());

        let env_var = CONTAINER_ENV_VARS
            .iter()
            .find(|name| env(name).is_some_and(|v| !v.is_empty()))
            .map(|name| (*name).to_string());

        let cgroup = fs::read_to_string(root.join("proc/1/cgroup"))
            .map(|text| CGROUP_MARKERS.iter().any(|m| text.contains(m)))
            .unwrap_or(false);

        let init_process = fs::read_to_string(root.join("proc/1/comm"))
            .ok()
            .map(|name| name.trim().to_string())
            .filter(|name| CONTAINER_INIT_NAMES.contains(&name.as_str()));

        Self {
            marker_file,
            env_var,
            cgroup,
            init_process,
        }
    }

    /// Whether any signal fired.
    #[must_use]
    pub fn is_container(&self) -> bool {
        self.marker_file.is_some() || self.env_var.is_some() || self.cgroup || self.init_process.is_some()
    }
}

/// Recommends a watcher mode.
#[derive(Debug, Clone)]
pub struct EnvironmentDetector {
    signals: ContainerSignals,
    self_test_timeout: Duration,
}

impl EnvironmentDetector {
    /// Detector for the running system.
    #[must_use]
    pub fn new() -> Self {
        Self::with_signals(ContainerSignals::probe())
    }

    /// Detector with pre-collected container signals.
    #[must_use]
    pub const fn with_signals(signals: ContainerSignals) -> Self {
        Self {
            signals,
            self_test_timeout: SELF_TEST_TIMEOUT,
        }
    }

    /// Override the self-test timeout.
    #[must_use]
    pub const fn with_self_test_timeout(mut self, timeout: Duration) -> Self {
        self.self_test_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn signals(&self) -> &ContainerSignals {
        &self.signals
    }

    #[must_use]
    pub fn is_container(&self) -> bool {
        self.signals.is_container()
    }

    /// Pick a mode for watching `dir`.
    ///
    /// An explicit preference is returned unchanged.
    #[must_use]
    pub fn recommend(&self, preference: MonitoringMode, dir: &Path) -> WatcherMode {
        match preference {
            MonitoringMode::Events => return WatcherMode::Events,
            MonitoringMode::Polling => return WatcherMode::Polling,
            MonitoringMode::Auto => {}
        }

        if self.is_container() {
            tracing::info!(signals = ?self.signals, "Container detected, using polling");
            return WatcherMode::Polling;
        }

        if self.notifications_work(dir) {
            tracing::info!("Notification self-test passed, using events");
            WatcherMode::Events
        } else {
            tracing::warn!("Notification self-test failed, using polling");
            WatcherMode::Polling
        }
    }

    /// Create a probe file in `dir` and wait for its creation event.
    ///
    /// Any setup failure counts as "notifications do not work". The probe
    /// file is removed on every path.
    #[must_use]
    pub fn notifications_work(&self, dir: &Path) -> bool {
        let (tx, rx) = crossbeam_channel::unbounded::<notify::Result<Event>>();
        let mut watcher = match notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        }) {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot create notification watcher");
                return false;
            }
        };

        if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
            tracing::warn!(dir = %dir.display(), error = %e, "Cannot watch directory for self-test");
            return false;
        }

        let probe = dir.join(format!(".dropwatch-probe-{}.tmp", Uuid::new_v4().simple()));
        let fired = match fs::write(&probe, b"probe") {
            Ok(()) => wait_for_event(&rx, &probe, self.self_test_timeout),
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Cannot write self-test file");
                false
            }
        };

        let _ = watcher.unwatch(dir);
        drop(watcher);
        if probe.exists() {
            if let Err(e) = fs::remove_file(&probe) {
                tracing::warn!(path = %probe.display(), error = %e, "Failed to remove self-test file");
            }
        }

        tracing::debug!(fired, "Notification self-test finished");
        fired
    }
}

impl Default for EnvironmentDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn wait_for_event(
    rx: &crossbeam_channel::Receiver<notify::Result<Event>>,
    probe: &Path,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        match rx.recv_timeout(remaining) {
            Ok(Ok(event)) => {
                let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_));
                if relevant && event.paths.iter().any(|p| p.file_name() == probe.file_name()) {
                    return true;
                }
            }
            Ok(Err(e)) => tracing::debug!(error = %e, "Notification error during self-test"),
            Err(_) => return false,
        }
    }
}
