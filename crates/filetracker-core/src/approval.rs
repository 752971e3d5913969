//! Operator approval: the only way trusted state advances after the initial
//! population.
//!
//! Callers must have checked privilege already; nothing here re-checks it.

use crate::audit::{AuditRecord, AuditSink};
use crate::baseline::{BaselineEntry, BaselineStore};
use crate::digest::digest_and_owner;
use crate::error::{Result, TrackerError};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Missing,
    Directory,
    NotRegularFile,
    NonUtf8Path,
    Unreadable(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Missing => write!(f, "path does not exist"),
            RejectReason::Directory => write!(f, "path is a directory"),
            RejectReason::NotRegularFile => write!(f, "path is not a regular file"),
            RejectReason::NonUtf8Path => write!(f, "path is not valid UTF-8"),
            RejectReason::Unreadable(msg) => write!(f, "path is unreadable: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved(BaselineEntry),
    /// Nothing was written to the baseline.
    Rejected { path: PathBuf, reason: RejectReason },
}

/// Make `path` absolute against the working directory without resolving
/// symlinks, so it lines up with keys produced by walking the roots.
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| TrackerError::io(path, e))?;
    Ok(cwd.join(path))
}

/// Record the current digest and owner of `path` as trusted, persist, and
/// audit the approval.
pub fn approve(
    store: &mut BaselineStore,
    path: &Path,
    audit: &dyn AuditSink,
) -> Result<ApprovalOutcome> {
    let path = absolutize(path)?;
    let reject = |reason: RejectReason| -> Result<ApprovalOutcome> {
        warn!(path = %path.display(), %reason, "approval rejected");
        Ok(ApprovalOutcome::Rejected {
            path: path.clone(),
            reason,
        })
    };

    if path.to_str().is_none() {
        return reject(RejectReason::NonUtf8Path);
    }

    let metadata = match fs::metadata(&path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return reject(RejectReason::Missing),
        Err(e) => return reject(RejectReason::Unreadable(e.to_string())),
    };
    if metadata.is_dir() {
        return reject(RejectReason::Directory);
    }
    if !metadata.is_file() {
        return reject(RejectReason::NotRegularFile);
    }

    let digest = match digest_and_owner(&path) {
        Ok(d) => d,
        Err(e) => return reject(RejectReason::Unreadable(e.to_string())),
    };

    let previous = store.get(&path).map(|e| e.hash.clone());
    let entry = BaselineEntry::from_digest(path.clone(), digest);
    store.set(entry.clone())?;

    info!(
        path = %path.display(),
        previous = previous.as_deref().unwrap_or("none"),
        hash = %entry.hash,
        "baseline entry approved"
    );
    audit.record(AuditRecord::Approved {
        path: entry.path.clone(),
        hash: entry.hash.clone(),
        owner: entry.owner.clone(),
    });

    Ok(ApprovalOutcome::Approved(entry))
}
