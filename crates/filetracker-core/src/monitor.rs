//! The single-consumer event loop: debounce, route, classify.
//!
//! Events are handled strictly one at a time in delivery order, so the
//! baseline is read without locking. Writes are checked against the baseline
//! under a strict policy: any content divergence is unauthorized until an
//! operator approves it. Creates and removals keep the watch registrations in
//! step with the directory tree.

use crate::audit::{AuditRecord, AuditSink};
use crate::baseline::BaselineStore;
use crate::debounce::DebounceClock;
use crate::digest::digest_and_owner;
use crate::error::TrackerError;
use crate::ignore::IgnoreRules;
use crate::walk::{SkipReason, WalkSummary};
use crate::watcher::{DirectoryWatchManager, FsEvent, Op, WatchBackend};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

/// What handling one event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Inside the quiescence window of the last processed event for the path.
    Debounced,
    /// Matched the ignore rules.
    Ignored,
    /// Could not be classified this cycle (vanished, directory, unreadable).
    Skipped(SkipReason),
    /// Content matches the baseline.
    Unchanged,
    Alert(AuditRecord),
    Registered(WalkSummary),
    Unregistered(Vec<PathBuf>),
}

pub struct Monitor<B> {
    baseline: BaselineStore,
    ignore: IgnoreRules,
    clock: DebounceClock,
    watches: DirectoryWatchManager<B>,
    audit: Arc<dyn AuditSink>,
}

impl<B: WatchBackend> Monitor<B> {
    pub fn new(
        baseline: BaselineStore,
        ignore: IgnoreRules,
        debounce: Duration,
        watches: DirectoryWatchManager<B>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            baseline,
            ignore,
            clock: DebounceClock::new(debounce),
            watches,
            audit,
        }
    }

    pub fn baseline(&self) -> &BaselineStore {
        &self.baseline
    }

    pub fn watches(&self) -> &DirectoryWatchManager<B> {
        &self.watches
    }

    /// Register every directory under each root.
    pub fn watch_roots(&mut self, roots: &[PathBuf]) -> WalkSummary {
        let mut total = WalkSummary::default();
        for root in roots {
            let summary = self.watches.register_subtree(root);
            if summary.processed == 0 && summary.already_present == 0 {
                warn!(root = %root.display(), "root is missing or not a directory, not watching");
            }
            total.merge(summary);
        }
        info!(
            directories = self.watches.watched().len(),
            skipped = total.skipped.len(),
            "watching configured roots"
        );
        total
    }

    /// Debounce and route one event. Ops are handled in order write, create,
    /// then remove/rename.
    pub fn handle_event(&mut self, event: &FsEvent) -> Vec<EventOutcome> {
        if !self.clock.admit(&event.path, event.at) {
            trace!(path = %event.path.display(), "debounced");
            return vec![EventOutcome::Debounced];
        }

        let mut outcomes = Vec::new();
        let path = event.path.as_path();

        if event.op.contains(Op::WRITE) {
            outcomes.push(self.classify_write(path));
        }

        if event.op.contains(Op::CREATE) && path.is_dir() {
            let summary = self.watches.register_subtree(path);
            debug!(path = %path.display(), added = summary.processed, "new directory watched");
            outcomes.push(EventOutcome::Registered(summary));
        }

        if event.op.intersects(Op::REMOVE | Op::RENAME) && self.watches.watched().has(path) {
            let removed = self.watches.unregister_subtree(path);
            outcomes.push(EventOutcome::Unregistered(removed));
        }

        outcomes
    }

    /// Compare the current content of `path` with its baseline entry.
    pub fn classify_write(&self, path: &Path) -> EventOutcome {
        if self.ignore.should_ignore(path) {
            return EventOutcome::Ignored;
        }

        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) => return EventOutcome::Skipped(SkipReason::from_io(&e)),
        };
        if !metadata.is_file() {
            return EventOutcome::Skipped(SkipReason::NotRegularFile);
        }

        let digest = match digest_and_owner(path) {
            Ok(d) => d,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cannot hash file during classify");
                let reason = match &e {
                    TrackerError::Io { source, .. } => SkipReason::from_io(source),
                    other => SkipReason::Other(other.to_string()),
                };
                return EventOutcome::Skipped(reason);
            }
        };

        let record = match self.baseline.get(path) {
            None => AuditRecord::UnauthorizedNewFile {
                path: path.to_path_buf(),
                hash: digest.hash,
                owner: digest.owner,
            },
            Some(entry) if entry.hash == digest.hash => return EventOutcome::Unchanged,
            Some(entry) => AuditRecord::UnauthorizedModification {
                path: path.to_path_buf(),
                expected_hash: entry.hash.clone(),
                actual_hash: digest.hash,
                expected_owner: entry.owner.clone(),
                actual_owner: digest.owner,
            },
        };

        self.audit.record(record.clone());
        EventOutcome::Alert(record)
    }

    /// Consume events until shutdown is signalled or the event stream ends.
    ///
    /// Errors from the notification primitive are logged and otherwise
    /// ignored.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<FsEvent>,
        mut errors: mpsc::Receiver<notify::Error>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Self {
        info!("monitor loop started");
        let mut errors_open = true;

        if *shutdown.borrow() {
            return self;
        }

        loop {
            tokio::select! {
                maybe_event = events.recv() => {
                    match maybe_event {
                        Some(event) => {
                            self.handle_event(&event);
                        }
                        None => {
                            debug!("event channel closed, monitor exiting");
                            break;
                        }
                    }
                }
                maybe_err = errors.recv(), if errors_open => {
                    match maybe_err {
                        Some(err) => warn!(error = %err, "file watcher error"),
                        None => errors_open = false,
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("monitor loop shutting down");
                        break;
                    }
                }
            }
        }

        self
    }
}
