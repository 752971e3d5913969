//! Registry of directories with a live watch registration.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Concurrency-safe membership cache; one lock guards every operation.
#[derive(Debug, Default)]
pub struct WatchedSet {
    inner: Mutex<HashSet<PathBuf>>,
}

impl WatchedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, path: &Path) -> bool {
        self.inner.lock().contains(path)
    }

    /// Returns `false` if the path was already present.
    pub fn add(&self, path: impl Into<PathBuf>) -> bool {
        self.inner.lock().insert(path.into())
    }

    pub fn remove(&self, path: &Path) -> bool {
        self.inner.lock().remove(path)
    }

    /// Remove `root` and every tracked directory beneath it.
    pub fn remove_subtree(&self, root: &Path) -> Vec<PathBuf> {
        let mut set = self.inner.lock();
        let doomed: Vec<PathBuf> = set.iter().filter(|p| p.starts_with(root)).cloned().collect();
        for path in &doomed {
            set.remove(path);
        }
        doomed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Sorted copy of the current membership.
    pub fn snapshot(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.inner.lock().iter().cloned().collect();
        paths.sort();
        paths
    }
}
