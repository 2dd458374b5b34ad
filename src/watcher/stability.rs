//! Write-stability checks.
//!
//! A file whose size stops changing across a short sampling window is taken
//! to be fully written.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use super::fingerprint::file_size;

/// Result of a stability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    /// Size unchanged across the window.
    Stable,
    /// Size still changing after every round.
    Unstable,
    /// File disappeared while sampling.
    Vanished,
}

/// Sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityCheck {
    /// Resample rounds before giving up.
    pub rounds: u32,
    /// Sleep before the first resample.
    pub initial_delay: Duration,
    /// Added to the sleep for every further round.
    pub delay_step: Duration,
}

impl StabilityCheck {
    /// Used for notification-driven files: up to 5 rounds, 200ms growing by 200ms.
    #[must_use]
    pub const fn events() -> Self {
        Self {
            rounds: 5,
            initial_delay: Duration::from_millis(200),
            delay_step: Duration::from_millis(200),
        }
    }

    /// Used by the polling watcher: a single 100ms resample.
    #[must_use]
    pub const fn polling() -> Self {
        Self {
            rounds: 1,
            initial_delay: Duration::from_millis(100),
            delay_step: Duration::ZERO,
        }
    }

    /// No waiting at all.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            rounds: 1,
            initial_delay: Duration::ZERO,
            delay_step: Duration::ZERO,
        }
    }

    fn delay(&self, round: u32) -> Duration {
        self.initial_delay + self.delay_step.saturating_mul(round)
    }

    /// Block until `path` stops growing or the rounds run out.
    #[must_use]
    pub fn wait(&self, path: &Path) -> Stability {
        let Some(mut previous) = file_size(path) else {
            return Stability::Vanished;
        };

        for round in 0..self.rounds.max(1) {
            thread::sleep(self.delay(round));
            let Some(current) = file_size(path) else {
                return Stability::Vanished;
            };
            if current == previous {
                return Stability::Stable;
            }
            tracing::debug!(path = %path.display(), previous, current, round, "File still growing");
            previous = current;
        }

        Stability::Unstable
    }

    /// Check a whole batch with one shared wait.
    ///
    /// Results are in the same order as `paths`.
    #[must_use]
    pub fn wait_batch(&self, paths: &[PathBuf]) -> Vec<Stability> {
        if paths.is_empty() {
            return Vec::new();
        }

        let before: Vec<Option<u64>> = paths.iter().map(|p| file_size(p)).collect();
        thread::sleep(self.initial_delay);

        paths
            .iter()
            .zip(before)
            .map(|(path, before)| match (before, file_size(path)) {
                (Some(a), Some(b)) if a == b => Stability::Stable,
                (Some(_), Some(_)) => Stability::Unstable,
                _ => Stability::Vanished,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::time::Instant;
    use tempfile::TempDir;

    #[test]
    fn test_stable_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("done.txt");
        fs::write(&path, b"complete").unwrap();

        assert_eq!(StabilityCheck::immediate().wait(&path), Stability::Stable);
    }

    #[test]
    fn test_missing_file_vanished() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(
            StabilityCheck::immediate().wait(&tmp.path().join("gone.txt")),
            Stability::Vanished
        );
    }

    #[test]
    fn test_growing_file_unstable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("growing.bin");
        fs::write(&path, b"start").unwrap();

        let writer_path = path.clone();
        let writer = thread::spawn(move || {
            let mut file = fs::OpenOptions::new().append(true).open(writer_path).unwrap();
            for _ in 0..40 {
                file.write_all(b"more data").unwrap();
                file.flush().unwrap();
                thread::sleep(Duration::from_millis(5));
            }
        });

        let check = StabilityCheck {
            rounds: 2,
            initial_delay: Duration::from_millis(20),
            delay_step: Duration::ZERO,
        };
        thread::sleep(Duration::from_millis(10));
        assert_eq!(check.wait(&path), Stability::Unstable);
        writer.join().unwrap();
    }

    #[test]
    fn test_delays_grow() {
        let check = StabilityCheck::events();
        assert_eq!(check.delay(0), Duration::from_millis(200));
        assert_eq!(check.delay(4), Duration::from_millis(1000));
    }

    #[test]
    fn test_batch_single_wait() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.txt");
        let b = tmp.path().join("b.txt");
        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"b").unwrap();

        let check = StabilityCheck {
            rounds: 1,
            initial_delay: Duration::from_millis(50),
            delay_step: Duration::ZERO,
        };
        let started = Instant::now();
        let result = check.wait_batch(&[a, b, tmp.path().join("c.txt")]);

        assert_eq!(
            result,
            vec![Stability::Stable, Stability::Stable, Stability::Vanished]
        );
        assert!(started.elapsed() < Duration::from_millis(150));
    }
}
