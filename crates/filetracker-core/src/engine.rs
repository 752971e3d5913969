//! Startup handling of the persisted baseline.

use crate::audit::{AuditRecord, AuditSink};
use crate::baseline::{BaselineStore, LoadOutcome};
use crate::error::Result;
use crate::ignore::IgnoreRules;
use crate::walk::WalkSummary;
use std::path::PathBuf;
use tracing::info;

/// How the baseline came to be in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaselineSource {
    Loaded(usize),
    Populated(WalkSummary),
}

/// Load the persisted snapshot and audit what was found.
pub fn load_baseline(store: &mut BaselineStore, audit: &dyn AuditSink) -> LoadOutcome {
    let outcome = store.load();
    match &outcome {
        LoadOutcome::Missing => audit.record(AuditRecord::BaselineNotFound {
            path: store.path().to_path_buf(),
        }),
        LoadOutcome::Corrupt(error) => audit.record(AuditRecord::BaselineCorrupt {
            path: store.path().to_path_buf(),
            error: error.clone(),
        }),
        LoadOutcome::Loaded(_) => {}
    }
    outcome
}

/// Load the baseline, rebuilding it from `roots` only when it is empty.
pub fn prepare_baseline(
    store: &mut BaselineStore,
    roots: &[PathBuf],
    ignore: &IgnoreRules,
    audit: &dyn AuditSink,
) -> Result<BaselineSource> {
    load_baseline(store, audit);
    if !store.is_empty() {
        info!(entries = store.len(), "using persisted baseline");
        return Ok(BaselineSource::Loaded(store.len()));
    }

    let summary = store.populate(roots, ignore)?;
    audit.record(AuditRecord::BaselinePopulated {
        path: store.path().to_path_buf(),
        entries: summary.processed,
        skipped: summary.skipped.len(),
    });
    Ok(BaselineSource::Populated(summary))
}
