//! Per-entry outcomes of best-effort tree walks.
//!
//! Baseline population and watch registration never abort on a single bad
//! entry. Instead every skipped entry is recorded here with a reason, so the
//! caller can log a summary and tests can assert exact counts.

use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    PermissionDenied,
    /// Entry disappeared between listing and use.
    Vanished,
    /// FIFO, socket, device or a symlink to one of those.
    NotRegularFile,
    /// Path bytes are not valid UTF-8 and cannot be a snapshot key.
    NonUtf8Path,
    /// The notification primitive refused the registration.
    Registration(String),
    Other(String),
}

impl SkipReason {
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => SkipReason::PermissionDenied,
            io::ErrorKind::NotFound => SkipReason::Vanished,
            _ => SkipReason::Other(err.to_string()),
        }
    }

    pub fn from_walkdir(err: &walkdir::Error) -> Self {
        match err.io_error() {
            Some(io_err) => Self::from_io(io_err),
            None => SkipReason::Other(err.to_string()),
        }
    }

    pub fn kind(&self) -> SkipKind {
        match self {
            SkipReason::PermissionDenied => SkipKind::PermissionDenied,
            SkipReason::Vanished => SkipKind::Vanished,
            SkipReason::NotRegularFile => SkipKind::NotRegularFile,
            SkipReason::NonUtf8Path => SkipKind::NonUtf8Path,
            SkipReason::Registration(_) => SkipKind::Registration,
            SkipReason::Other(_) => SkipKind::Other,
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::PermissionDenied => write!(f, "permission denied"),
            SkipReason::Vanished => write!(f, "vanished"),
            SkipReason::NotRegularFile => write!(f, "not a regular file"),
            SkipReason::NonUtf8Path => write!(f, "path is not valid UTF-8"),
            SkipReason::Registration(msg) => write!(f, "registration failed: {msg}"),
            SkipReason::Other(msg) => write!(f, "{msg}"),
        }
    }
}

/// Payload-free discriminant of [`SkipReason`], used for counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipKind {
    PermissionDenied,
    Vanished,
    NotRegularFile,
    NonUtf8Path,
    Registration,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkSummary {
    /// Entries recorded (files hashed, or directories newly registered).
    pub processed: usize,
    /// Directories that were already registered.
    pub already_present: usize,
    /// Entries excluded by the ignore rules.
    pub ignored: usize,
    pub skipped: Vec<SkippedEntry>,
}

impl WalkSummary {
    pub fn skip(&mut self, path: impl Into<PathBuf>, reason: SkipReason) {
        self.skipped.push(SkippedEntry {
            path: path.into(),
            reason,
        });
    }

    pub fn count(&self, kind: SkipKind) -> usize {
        self.skipped.iter().filter(|s| s.reason.kind() == kind).count()
    }

    pub fn merge(&mut self, other: WalkSummary) {
        self.processed += other.processed;
        self.already_present += other.already_present;
        self.ignored += other.ignored;
        self.skipped.extend(other.skipped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_reasons() {
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        let gone = io::Error::from(io::ErrorKind::NotFound);
        let other = io::Error::new(io::ErrorKind::Other, "disk on fire");
        assert_eq!(SkipReason::from_io(&denied), SkipReason::PermissionDenied);
        assert_eq!(SkipReason::from_io(&gone), SkipReason::Vanished);
        assert_eq!(SkipReason::from_io(&other).kind(), SkipKind::Other);
    }

    #[test]
    fn counts_by_kind_and_merges() {
        let mut a = WalkSummary::default();
        a.processed = 3;
        a.skip("/a", SkipReason::PermissionDenied);
        a.skip("/b", SkipReason::PermissionDenied);

        let mut b = WalkSummary::default();
        b.processed = 1;
        b.ignored = 2;
        b.skip("/c", SkipReason::Vanished);

        a.merge(b);
        assert_eq!(a.processed, 4);
        assert_eq!(a.ignored, 2);
        assert_eq!(a.count(SkipKind::PermissionDenied), 2);
        assert_eq!(a.count(SkipKind::Vanished), 1);
        assert_eq!(a.count(SkipKind::Other), 0);
    }
}
