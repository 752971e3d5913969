//! Directory watch management on top of the `notify` crate.
//!
//! Every directory gets its own non-recursive registration so newly created
//! subtrees can be picked up (and dropped) one directory at a time. Raw notify
//! events are flattened into per-path [`FsEvent`]s and handed to the monitor
//! loop through a bounded channel.

use crate::error::{Result, TrackerError};
use crate::walk::{SkipReason, WalkSummary};
use crate::watch_set::WatchedSet;
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::fmt;
use std::fs;
use std::ops::{BitOr, BitOrAssign};
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// Bitwise-composable set of filesystem operations.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Op(u8);

impl Op {
    pub const CREATE: Op = Op(1);
    pub const WRITE: Op = Op(1 << 1);
    pub const REMOVE: Op = Op(1 << 2);
    pub const RENAME: Op = Op(1 << 3);

    pub const fn empty() -> Op {
        Op(0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// All bits of `other` are set.
    pub const fn contains(self, other: Op) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    /// Any bit of `other` is set.
    pub const fn intersects(self, other: Op) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for Op {
    type Output = Op;

    fn bitor(self, rhs: Op) -> Op {
        Op(self.0 | rhs.0)
    }
}

impl BitOrAssign for Op {
    fn bitor_assign(&mut self, rhs: Op) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Op::CREATE, "CREATE"),
            (Op::WRITE, "WRITE"),
            (Op::REMOVE, "REMOVE"),
            (Op::RENAME, "RENAME"),
        ]
        .iter()
        .filter(|(op, _)| self.contains(*op))
        .map(|(_, name)| *name)
        .collect();
        if names.is_empty() {
            write!(f, "Op(empty)")
        } else {
            write!(f, "Op({})", names.join("|"))
        }
    }
}

/// One path-level event delivered by the notification primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub path: PathBuf,
    pub op: Op,
    /// When the primitive delivered the event.
    pub at: Instant,
}

impl FsEvent {
    pub fn new(path: impl Into<PathBuf>, op: Op, at: Instant) -> Self {
        Self {
            path: path.into(),
            op,
            at,
        }
    }
}

/// Flatten a notify event into per-path events.
///
/// Metadata-only and access events are dropped. A rename with both ends known
/// becomes a rename of the source plus a create of the destination.
pub fn translate_event(event: &Event, at: Instant) -> Vec<FsEvent> {
    let each = |op: Op| -> Vec<FsEvent> {
        event
            .paths
            .iter()
            .map(|p| FsEvent::new(p.clone(), op, at))
            .collect()
    };

    match &event.kind {
        EventKind::Create(_) => each(Op::CREATE),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::To => each(Op::CREATE),
            RenameMode::Both if event.paths.len() >= 2 => vec![
                FsEvent::new(event.paths[0].clone(), Op::RENAME, at),
                FsEvent::new(event.paths[1].clone(), Op::CREATE, at),
            ],
            _ => each(Op::RENAME),
        },
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => each(Op::WRITE),
        EventKind::Remove(_) => each(Op::REMOVE),
        _ => Vec::new(),
    }
}

/// The add/remove-watch surface of a notification primitive.
pub trait WatchBackend {
    fn add_watch(&mut self, dir: &Path) -> Result<()>;
    fn remove_watch(&mut self, dir: &Path) -> Result<()>;
}

/// Receiving ends of a [`NotifyBackend`].
pub struct EventStreams {
    pub events: mpsc::Receiver<FsEvent>,
    pub errors: mpsc::Receiver<notify::Error>,
}

/// `notify`-backed primitive with one non-recursive watch per directory.
pub struct NotifyBackend {
    watcher: RecommendedWatcher,
}

impl NotifyBackend {
    /// Create the watcher. Events and errors are delivered on two bounded
    /// channels of `capacity`.
    ///
    /// notify's callback only pushes onto an unbounded queue. A bridge thread
    /// drains that queue into the bounded channels, so a slow consumer stalls
    /// the bridge and never notify's own thread, which `watch`/`unwatch` need.
    pub fn new(capacity: usize) -> Result<(Self, EventStreams)> {
        let capacity = capacity.max(1);
        let (event_tx, events) = mpsc::channel::<FsEvent>(capacity);
        let (error_tx, errors) = mpsc::channel::<notify::Error>(capacity);
        let (sync_tx, sync_rx) = std_mpsc::channel::<(Instant, notify::Result<Event>)>();

        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = sync_tx.send((Instant::now(), res));
            },
            Config::default(),
        )?;

        thread::Builder::new()
            .name("filetracker-watch-bridge".into())
            .spawn(move || {
                while let Ok((at, res)) = sync_rx.recv() {
                    match res {
                        Ok(event) => {
                            for fs_event in translate_event(&event, at) {
                                if event_tx.blocking_send(fs_event).is_err() {
                                    debug!("event receiver dropped, stopping watch bridge");
                                    return;
                                }
                            }
                        }
                        // errors never hold up event delivery
                        Err(e) => {
                            if let Err(mpsc::error::TrySendError::Full(e)) = error_tx.try_send(e) {
                                warn!(error = %e, "watcher error dropped, error channel full");
                            }
                        }
                    }
                }
                debug!("watcher closed, stopping watch bridge");
            })
            .map_err(TrackerError::Bridge)?;

        Ok((Self { watcher }, EventStreams { events, errors }))
    }
}

impl WatchBackend for NotifyBackend {
    fn add_watch(&mut self, dir: &Path) -> Result<()> {
        self.watcher.watch(dir, RecursiveMode::NonRecursive)?;
        Ok(())
    }

    fn remove_watch(&mut self, dir: &Path) -> Result<()> {
        self.watcher.unwatch(dir)?;
        Ok(())
    }
}

/// Keeps the notification primitive's registrations in step with the
/// [`WatchedSet`].
pub struct DirectoryWatchManager<B> {
    backend: B,
    watched: Arc<WatchedSet>,
}

impl<B: WatchBackend> DirectoryWatchManager<B> {
    pub fn new(backend: B, watched: Arc<WatchedSet>) -> Self {
        Self { backend, watched }
    }

    pub fn watched(&self) -> &Arc<WatchedSet> {
        &self.watched
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Register every not-yet-watched directory under `root`.
    ///
    /// Idempotent: directories already in the watched set are left alone, so
    /// this is safe to call again whenever a directory appears. A missing or
    /// non-directory root is a no-op.
    pub fn register_subtree(&mut self, root: &Path) -> WalkSummary {
        let mut summary = WalkSummary::default();
        match fs::metadata(root) {
            Ok(meta) if meta.is_dir() => {}
            _ => return summary,
        }

        for entry in WalkDir::new(root).follow_links(false).follow_root_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    let path = e.path().unwrap_or(root).to_path_buf();
                    trace!(path = %path.display(), error = %e, "skipping entry during watch walk");
                    summary.skip(path, SkipReason::from_walkdir(&e));
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();
            if self.watched.has(path) {
                summary.already_present += 1;
                continue;
            }
            match self.backend.add_watch(path) {
                Ok(()) => {
                    self.watched.add(path);
                    summary.processed += 1;
                    trace!(path = %path.display(), "watching directory");
                }
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "failed to watch directory");
                    summary.skip(path, SkipReason::Registration(e.to_string()));
                }
            }
        }

        if !summary.skipped.is_empty() {
            warn!(
                root = %root.display(),
                skipped = summary.skipped.len(),
                "some directories could not be watched"
            );
        }
        summary
    }

    /// Drop the registration for `root` and any watched directory beneath it.
    ///
    /// Returns the paths that were dropped; empty if `root` was not watched.
    /// Deregistration failures are expected when the directory is already gone.
    pub fn unregister_subtree(&mut self, root: &Path) -> Vec<PathBuf> {
        if !self.watched.has(root) {
            return Vec::new();
        }
        let removed = self.watched.remove_subtree(root);
        for path in &removed {
            if let Err(e) = self.backend.remove_watch(path) {
                trace!(path = %path.display(), error = %e, "remove watch failed");
            }
        }
        debug!(root = %root.display(), count = removed.len(), "stopped watching");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};
    use std::collections::HashSet;
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeBackend {
        live: HashSet<PathBuf>,
        adds: usize,
        refuse: HashSet<PathBuf>,
    }

    impl WatchBackend for FakeBackend {
        fn add_watch(&mut self, dir: &Path) -> Result<()> {
            if self.refuse.contains(dir) {
                return Err(TrackerError::Watch(notify::Error::generic("refused")));
            }
            self.adds += 1;
            self.live.insert(dir.to_path_buf());
            Ok(())
        }

        fn remove_watch(&mut self, dir: &Path) -> Result<()> {
            if self.live.remove(dir) {
                Ok(())
            } else {
                Err(TrackerError::Watch(notify::Error::watch_not_found()))
            }
        }
    }

    fn tree() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        fs::create_dir_all(dir.path().join("d")).unwrap();
        fs::write(dir.path().join("a/file.txt"), b"not a dir").unwrap();
        dir
    }

    #[test]
    fn op_bits_compose() {
        let op = Op::CREATE | Op::WRITE;
        assert!(op.contains(Op::CREATE));
        assert!(op.contains(Op::WRITE));
        assert!(!op.contains(Op::REMOVE));
        assert!(op.intersects(Op::WRITE | Op::RENAME));
        assert!(!op.contains(Op::empty()));
        assert_eq!(format!("{op:?}"), "Op(CREATE|WRITE)");
    }

    #[test]
    fn translates_notify_kinds() {
        let at = Instant::now();
        let ev = |kind, paths: &[&str]| Event {
            kind,
            paths: paths.iter().map(PathBuf::from).collect(),
            attrs: Default::default(),
        };

        let created = translate_event(&ev(EventKind::Create(CreateKind::Folder), &["/x"]), at);
        assert_eq!(created, vec![FsEvent::new("/x", Op::CREATE, at)]);

        let written = translate_event(
            &ev(EventKind::Modify(ModifyKind::Data(DataChange::Content)), &["/f"]),
            at,
        );
        assert_eq!(written[0].op, Op::WRITE);

        let chmod = translate_event(
            &ev(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)), &["/f"]),
            at,
        );
        assert!(chmod.is_empty());

        let renamed = translate_event(
            &ev(EventKind::Modify(ModifyKind::Name(RenameMode::Both)), &["/old", "/new"]),
            at,
        );
        assert_eq!(
            renamed,
            vec![
                FsEvent::new("/old", Op::RENAME, at),
                FsEvent::new("/new", Op::CREATE, at),
            ]
        );

        let removed = translate_event(&ev(EventKind::Remove(RemoveKind::Any), &["/gone"]), at);
        assert_eq!(removed[0].op, Op::REMOVE);
    }

    #[test]
    fn register_subtree_watches_every_directory() {
        let dir = tree();
        let watched = Arc::new(WatchedSet::new());
        let mut manager = DirectoryWatchManager::new(FakeBackend::default(), watched.clone());

        let summary = manager.register_subtree(dir.path());
        assert_eq!(summary.processed, 5);
        assert_eq!(watched.len(), 5);
        assert!(watched.has(&dir.path().join("a/b/c")));
        assert!(!watched.has(&dir.path().join("a/file.txt")));
    }

    #[test]
    fn register_subtree_is_idempotent() {
        let dir = tree();
        let watched = Arc::new(WatchedSet::new());
        let mut manager = DirectoryWatchManager::new(FakeBackend::default(), watched.clone());

        manager.register_subtree(dir.path());
        let first = watched.snapshot();
        let again = manager.register_subtree(dir.path());

        assert_eq!(watched.snapshot(), first);
        assert_eq!(again.processed, 0);
        assert_eq!(again.already_present, first.len());
        assert_eq!(manager.backend().adds, first.len());
    }

    #[test]
    fn register_subtree_ignores_missing_and_file_roots() {
        let dir = tree();
        let watched = Arc::new(WatchedSet::new());
        let mut manager = DirectoryWatchManager::new(FakeBackend::default(), watched.clone());

        assert_eq!(manager.register_subtree(&dir.path().join("nope")), WalkSummary::default());
        assert_eq!(
            manager.register_subtree(&dir.path().join("a/file.txt")),
            WalkSummary::default()
        );
        assert!(watched.is_empty());
    }

    #[test]
    fn refused_registration_is_not_tracked() {
        let dir = tree();
        let watched = Arc::new(WatchedSet::new());
        let mut backend = FakeBackend::default();
        backend.refuse.insert(dir.path().join("d"));
        let mut manager = DirectoryWatchManager::new(backend, watched.clone());

        let summary = manager.register_subtree(dir.path());
        assert_eq!(summary.processed, 4);
        assert_eq!(summary.count(crate::walk::SkipKind::Registration), 1);
        assert!(!watched.has(&dir.path().join("d")));
    }

    #[test]
    fn unregister_drops_descendants() {
        let dir = tree();
        let watched = Arc::new(WatchedSet::new());
        let mut manager = DirectoryWatchManager::new(FakeBackend::default(), watched.clone());
        manager.register_subtree(dir.path());

        let removed = manager.unregister_subtree(&dir.path().join("a"));
        assert_eq!(removed.len(), 3);
        assert_eq!(watched.len(), 2);
        assert!(!manager.backend().live.contains(&dir.path().join("a/b")));

        // not watched anymore: no-op
        assert!(manager.unregister_subtree(&dir.path().join("a")).is_empty());
    }
}
