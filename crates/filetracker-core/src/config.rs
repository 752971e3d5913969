//! Tracker configuration: roots, state paths and tuning knobs, loaded from
//! JSON with every field defaulted.

use crate::error::{Result, TrackerError};
use crate::ignore::{IgnoreRules, DEFAULT_IGNORE_SUFFIXES};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASELINE_PATH: &str = "/var/lib/filetracker/baseline.json";
pub const DEFAULT_LOG_FILE: &str = "/var/log/filetracker/filetracker.log";

/// Directories monitored when no configuration overrides them.
pub const DEFAULT_ROOTS: &[&str] = &[
    "/etc",
    "/bin",
    "/sbin",
    "/usr/bin",
    "/usr/sbin",
    "/boot",
    "/var/www",
    "/etc/apache2",
    "/home",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrackerConfig {
    pub roots: Vec<PathBuf>,
    pub baseline_path: PathBuf,
    pub log_file: PathBuf,
    pub debounce_ms: u64,
    pub ignore_suffixes: Vec<String>,
    /// Bound of the event and error channels between notify and the loop.
    pub event_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            roots: DEFAULT_ROOTS.iter().map(PathBuf::from).collect(),
            baseline_path: PathBuf::from(DEFAULT_BASELINE_PATH),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            debounce_ms: 200,
            ignore_suffixes: DEFAULT_IGNORE_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            event_capacity: 1024,
        }
    }
}

impl TrackerConfig {
    /// Read a JSON config file; absent fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|e| TrackerError::io(path, e))?;
        let config: TrackerConfig = serde_json::from_slice(&data)
            .map_err(|e| TrackerError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.roots.is_empty() {
            return Err(TrackerError::Config("at least one root is required".into()));
        }
        if let Some(root) = self.roots.iter().find(|r| !r.is_absolute()) {
            return Err(TrackerError::Config(format!(
                "root must be absolute: {}",
                root.display()
            )));
        }
        if self.baseline_path.as_os_str().is_empty() {
            return Err(TrackerError::Config("baseline_path must not be empty".into()));
        }
        if self.event_capacity == 0 {
            return Err(TrackerError::Config("event_capacity must be at least 1".into()));
        }
        Ok(())
    }

    pub fn ignore_rules(&self) -> IgnoreRules {
        IgnoreRules::new(&self.ignore_suffixes)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
