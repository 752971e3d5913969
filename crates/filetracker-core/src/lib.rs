//! Host file integrity monitor engine.
//!
//! A trusted baseline (SHA-256 + owner per file) is built once for a set of
//! roots. Every directory under those roots is watched individually; writes
//! are classified against the baseline and any divergence is reported as an
//! unauthorized change until an operator approves the new state.
//!
//! ```text
//! notify ──FsEvent──▶ Monitor ──┬─▶ DebounceClock
//!                               ├─▶ DirectoryWatchManager ─▶ WatchedSet
//!                               └─▶ BaselineStore ─▶ AuditSink
//! approve() ─────────────────────▶ BaselineStore ─▶ AuditSink
//! ```

pub mod approval;
pub mod audit;
pub mod baseline;
pub mod config;
pub mod debounce;
pub mod digest;
pub mod engine;
pub mod error;
pub mod ignore;
pub mod monitor;
pub mod walk;
pub mod watch_set;
pub mod watcher;

pub use approval::{approve, ApprovalOutcome, RejectReason};
pub use audit::{AuditRecord, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use baseline::{BaselineEntry, BaselineStore, LoadOutcome};
pub use config::TrackerConfig;
pub use debounce::DebounceClock;
pub use digest::{digest_and_owner, FileDigest};
pub use engine::{load_baseline, prepare_baseline, BaselineSource};
pub use error::{Result, TrackerError};
pub use ignore::IgnoreRules;
pub use monitor::{EventOutcome, Monitor};
pub use walk::{SkipKind, SkipReason, WalkSummary};
pub use watch_set::WatchedSet;
pub use watcher::{
    DirectoryWatchManager, EventStreams, FsEvent, NotifyBackend, Op, WatchBackend,
};
