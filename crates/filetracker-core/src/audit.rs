//! Audit records and the sinks that receive them.
//!
//! Findings are not errors: an unauthorized change is a successful detection
//! and is surfaced as a high-severity record while processing continues.

use parking_lot::Mutex;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// tracing target used for every audit line.
pub const AUDIT_TARGET: &str = "audit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditRecord {
    /// No persisted snapshot; starting with an empty baseline.
    BaselineNotFound { path: PathBuf },
    /// Snapshot exists but could not be decoded; treated as empty.
    BaselineCorrupt { path: PathBuf, error: String },
    BaselinePopulated {
        path: PathBuf,
        entries: usize,
        skipped: usize,
    },
    UnauthorizedNewFile {
        path: PathBuf,
        hash: String,
        owner: String,
    },
    UnauthorizedModification {
        path: PathBuf,
        expected_hash: String,
        actual_hash: String,
        expected_owner: String,
        actual_owner: String,
    },
    Approved {
        path: PathBuf,
        hash: String,
        owner: String,
    },
}

impl AuditRecord {
    pub fn is_finding(&self) -> bool {
        matches!(
            self,
            AuditRecord::UnauthorizedNewFile { .. } | AuditRecord::UnauthorizedModification { .. }
        )
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Writes audit records as structured tracing events on the `audit` target.
///
/// Timestamps and the final destination come from the installed subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        match record {
            AuditRecord::BaselineNotFound { path } => {
                info!(target: AUDIT_TARGET, path = %path.display(), "[AUDIT] baseline not found, starting fresh");
            }
            AuditRecord::BaselineCorrupt { path, error } => {
                warn!(target: AUDIT_TARGET, path = %path.display(), %error, "[AUDIT] baseline unreadable, starting fresh");
            }
            AuditRecord::BaselinePopulated { path, entries, skipped } => {
                info!(target: AUDIT_TARGET, path = %path.display(), entries, skipped, "[AUDIT] baseline populated");
            }
            AuditRecord::UnauthorizedNewFile { path, hash, owner } => {
                error!(
                    target: AUDIT_TARGET,
                    path = %path.display(),
                    %hash,
                    %owner,
                    "[AUDIT] UNAUTHORIZED NEW FILE DETECTED {}",
                    path.display()
                );
            }
            AuditRecord::UnauthorizedModification {
                path,
                expected_hash,
                actual_hash,
                expected_owner,
                actual_owner,
            } => {
                error!(
                    target: AUDIT_TARGET,
                    path = %path.display(),
                    %expected_hash,
                    %actual_hash,
                    %expected_owner,
                    %actual_owner,
                    "[AUDIT] UNAUTHORIZED FILE MODIFICATION {}",
                    path.display()
                );
            }
            AuditRecord::Approved { path, hash, owner } => {
                info!(
                    target: AUDIT_TARGET,
                    path = %path.display(),
                    %hash,
                    %owner,
                    "[AUDIT] APPROVED CHANGE {}",
                    path.display()
                );
            }
        }
    }
}

/// Keeps records in memory. Used by tests and embedders that forward alerts.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn findings(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.is_finding())
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.records.lock().push(record);
    }
}
