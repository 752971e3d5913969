//! Per-path quiescence window for the event loop.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Clock entries kept before stale ones are pruned.
const PRUNE_THRESHOLD: usize = 4096;

/// Timestamp of the last processed event per path.
///
/// Discarded events do not move the clock, so a steady stream of events
/// closer together than the window still gets one event through per window.
#[derive(Debug)]
pub struct DebounceClock {
    window: Duration,
    last: HashMap<PathBuf, Instant>,
}

impl DebounceClock {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns `true` and records `at` if the event should be processed.
    pub fn admit(&mut self, path: &Path, at: Instant) -> bool {
        if let Some(prev) = self.last.get(path) {
            if at.saturating_duration_since(*prev) < self.window {
                return false;
            }
        }
        if self.last.len() >= PRUNE_THRESHOLD {
            self.prune(at);
        }
        self.last.insert(path.to_path_buf(), at);
        true
    }

    /// Forget paths whose last event is older than the window.
    pub fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.last
            .retain(|_, t| now.saturating_duration_since(*t) < window);
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}

impl Default for DebounceClock {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}
