//! Bounded set of recently seen paths.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use lru::LruCache;

/// Default number of paths remembered.
pub const RECENT_PATHS_CAPACITY: usize = 100;

/// Recently seen paths, evicting the least recently touched entry when full.
#[derive(Debug)]
pub struct RecentPaths {
    cache: LruCache<PathBuf, ()>,
}

impl RecentPaths {
    /// Create a set holding at most `capacity` paths (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
        }
    }

    /// Record `path`. Returns `false` if it was already present.
    pub fn insert(&mut self, path: &Path) -> bool {
        if self.cache.get(path).is_some() {
            return false;
        }
        self.cache.put(path.to_path_buf(), ());
        true
    }

    /// Forget `path`.
    pub fn remove(&mut self, path: &Path) {
        self.cache.pop(path);
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.cache.contains(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for RecentPaths {
    fn default() -> Self {
        Self::new(RECENT_PATHS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_rejected_until_removed() {
        let mut recent = RecentPaths::default();
        let path = Path::new("/in/a.txt");

        assert!(recent.insert(path));
        assert!(!recent.insert(path));

        recent.remove(path);
        assert!(!recent.contains(path));
        assert!(recent.insert(path));
    }

    #[test]
    fn test_bounded() {
        let mut recent = RecentPaths::new(3);
        for i in 0..10 {
            recent.insert(&PathBuf::from(format!("/in/{i}.txt")));
        }

        assert_eq!(recent.len(), 3);
        assert!(recent.contains(Path::new("/in/9.txt")));
        assert!(!recent.contains(Path::new("/in/0.txt")));
    }

    #[test]
    fn test_touch_keeps_entry_alive() {
        let mut recent = RecentPaths::new(2);
        recent.insert(Path::new("/a"));
        recent.insert(Path::new("/b"));
        assert!(!recent.insert(Path::new("/a")));
        recent.insert(Path::new("/c"));

        assert!(recent.contains(Path::new("/a")));
        assert!(!recent.contains(Path::new("/b")));
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut recent = RecentPaths::new(0);
        assert!(recent.is_empty());
        assert!(recent.insert(Path::new("/a")));
        assert_eq!(recent.len(), 1);
    }
}
