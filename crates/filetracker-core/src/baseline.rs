//! Trusted baseline: expected content hash and owner per monitored path.
//!
//! The snapshot on disk is a JSON object mapping absolute path to
//! `{ "hash": ..., "owner": ... }`. It is written atomically through a
//! sibling temp file and is only ever readable by its owner.

use crate::digest::{digest_and_owner, FileDigest};
use crate::error::{Result, TrackerError};
use crate::ignore::IgnoreRules;
use crate::walk::{SkipReason, WalkSummary};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A single approved file in the baseline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineEntry {
    pub path: PathBuf,
    pub hash: String,
    pub owner: String,
}

impl BaselineEntry {
    pub fn from_digest(path: impl Into<PathBuf>, digest: FileDigest) -> Self {
        Self {
            path: path.into(),
            hash: digest.hash,
            owner: digest.owner,
        }
    }
}

/// On-disk form of an entry; the path is the map key.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileRecord {
    hash: String,
    owner: String,
}

/// What `load` found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(usize),
    Missing,
    /// Present but unreadable or malformed.
    Corrupt(String),
}

#[derive(Debug)]
pub struct BaselineStore {
    path: PathBuf,
    entries: HashMap<PathBuf, BaselineEntry>,
}

impl BaselineStore {
    /// An empty store persisted at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: HashMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the in-memory baseline with the persisted snapshot.
    ///
    /// Any failure leaves the baseline empty; starting fresh is expected.
    pub fn load(&mut self) -> LoadOutcome {
        self.entries.clear();

        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "baseline not found, starting fresh");
                return LoadOutcome::Missing;
            }
            Err(e) => {
                info!(path = %self.path.display(), error = %e, "baseline unreadable, starting fresh");
                return LoadOutcome::Corrupt(e.to_string());
            }
        };

        let records: BTreeMap<PathBuf, FileRecord> = match serde_json::from_slice(&data) {
            Ok(records) => records,
            Err(e) => {
                info!(path = %self.path.display(), error = %e, "baseline malformed, starting fresh");
                return LoadOutcome::Corrupt(e.to_string());
            }
        };

        self.entries = records
            .into_iter()
            .map(|(path, record)| {
                let entry = BaselineEntry {
                    path: path.clone(),
                    hash: record.hash,
                    owner: record.owner,
                };
                (path, entry)
            })
            .collect();

        debug!(path = %self.path.display(), entries = self.entries.len(), "baseline loaded");
        LoadOutcome::Loaded(self.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, path: &Path) -> Option<&BaselineEntry> {
        self.entries.get(path)
    }

    pub fn entries(&self) -> impl Iterator<Item = &BaselineEntry> {
        self.entries.values()
    }

    /// Record `entry`, overwriting any prior entry for its path, and persist.
    ///
    /// Paths that cannot be written as snapshot keys are refused before the
    /// in-memory mapping is touched.
    pub fn set(&mut self, entry: BaselineEntry) -> Result<()> {
        if entry.path.to_str().is_none() {
            return Err(TrackerError::NonUtf8Path(entry.path));
        }
        self.entries.insert(entry.path.clone(), entry);
        self.save()
    }

    /// Hash every regular file under `roots` and persist once at the end.
    ///
    /// Unreadable entries are skipped and reported in the summary; a single
    /// bad file never aborts the scan.
    pub fn populate(&mut self, roots: &[PathBuf], ignore: &IgnoreRules) -> Result<WalkSummary> {
        info!(roots = roots.len(), "populating baseline");
        let mut summary = WalkSummary::default();

        for root in roots {
            for entry in WalkDir::new(root).follow_links(false).follow_root_links(false) {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        let path = e.path().unwrap_or(root.as_path()).to_path_buf();
                        summary.skip(path, SkipReason::from_walkdir(&e));
                        continue;
                    }
                };

                let file_type = entry.file_type();
                if file_type.is_dir() {
                    continue;
                }

                let path = entry.path();
                if ignore.should_ignore(path) {
                    summary.ignored += 1;
                    continue;
                }
                if path.to_str().is_none() {
                    summary.skip(path, SkipReason::NonUtf8Path);
                    continue;
                }

                if !file_type.is_file() {
                    // Symlinks count when they resolve to a regular file.
                    match fs::metadata(path) {
                        Ok(meta) if file_type.is_symlink() && meta.is_file() => {}
                        Ok(_) => {
                            summary.skip(path, SkipReason::NotRegularFile);
                            continue;
                        }
                        Err(e) => {
                            summary.skip(path, SkipReason::from_io(&e));
                            continue;
                        }
                    }
                }

                match digest_and_owner(path) {
                    Ok(digest) => {
                        self.entries
                            .insert(path.to_path_buf(), BaselineEntry::from_digest(path, digest));
                        summary.processed += 1;
                    }
                    Err(e) => {
                        let reason = match &e {
                            TrackerError::Io { source, .. } => SkipReason::from_io(source),
                            other => SkipReason::Other(other.to_string()),
                        };
                        debug!(path = %path.display(), %reason, "skipping unreadable file");
                        summary.skip(path, reason);
                    }
                }
            }
        }

        if !summary.skipped.is_empty() {
            warn!(skipped = summary.skipped.len(), "entries skipped during baseline population");
        }
        info!(files = summary.processed, ignored = summary.ignored, "baseline populated");

        self.save()?;
        Ok(summary)
    }

    /// Write the full mapping to disk with owner-only permissions.
    pub fn save(&self) -> Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        create_private_dir(&parent)?;

        let records: BTreeMap<&Path, FileRecord> = self
            .entries
            .values()
            .map(|e| {
                (
                    e.path.as_path(),
                    FileRecord {
                        hash: e.hash.clone(),
                        owner: e.owner.clone(),
                    },
                )
            })
            .collect();
        let json = serde_json::to_vec_pretty(&records)?;

        // NamedTempFile is created 0600 on unix.
        let mut tmp = tempfile::NamedTempFile::new_in(&parent)
            .map_err(|e| TrackerError::io(&parent, e))?;
        tmp.write_all(&json)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| TrackerError::io(tmp.path(), e))?;
        tmp.persist(&self.path).map_err(|e| TrackerError::Persist {
            path: self.path.clone(),
            source: e.error,
        })?;
        restrict_permissions(&self.path)?;

        debug!(path = %self.path.display(), entries = self.entries.len(), "baseline saved");
        Ok(())
    }
}

fn create_private_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir).map_err(|e| TrackerError::io(dir, e))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| TrackerError::io(path, e))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::hash_file;
    use crate::walk::SkipKind;
    use tempfile::tempdir;

    #[test]
    fn populate_skips_ignored_files() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.txt"), b"x").unwrap();
        fs::write(root.join("b.tmp"), b"scratch").unwrap();

        let baseline_path = dir.path().join("state").join("baseline.json");
        let mut store = BaselineStore::new(&baseline_path);
        assert_eq!(store.load(), LoadOutcome::Missing);
        assert!(store.is_empty());

        let summary = store.populate(&[root.clone()], &IgnoreRules::default()).unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.ignored, 1);
        assert!(summary.skipped.is_empty());

        assert_eq!(store.len(), 1);
        let entry = store.get(&root.join("a.txt")).unwrap();
        assert_eq!(
            entry.hash,
            "2d711642b726b04401627ca9fbac32f5c8530fb1903cc4db02258717921a4881"
        );
        assert!(store.get(&root.join("b.tmp")).is_none());

        // persisted once at the end
        let mut reloaded = BaselineStore::new(&baseline_path);
        assert_eq!(reloaded.load(), LoadOutcome::Loaded(1));
        assert_eq!(reloaded.get(&root.join("a.txt")), Some(entry));
    }

    #[test]
    fn populate_walks_nested_directories_and_missing_roots() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(root.join("x/y")).unwrap();
        fs::write(root.join("x/y/deep.conf"), b"deep").unwrap();
        fs::write(root.join("top.conf"), b"top").unwrap();

        let mut store = BaselineStore::new(dir.path().join("baseline.json"));
        let summary = store
            .populate(
                &[root.clone(), dir.path().join("does-not-exist")],
                &IgnoreRules::default(),
            )
            .unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.count(SkipKind::Vanished), 1);
        assert!(store.get(&root.join("x/y/deep.conf")).is_some());
    }

    #[cfg(unix)]
    #[test]
    fn populate_records_unreadable_files_as_skipped() {
        use std::os::unix::fs::PermissionsExt;

        if unsafe { libc::geteuid() } == 0 {
            // root reads through permission bits
            return;
        }
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("ok.txt"), b"ok").unwrap();
        for name in ["secret1", "secret2"] {
            let p = root.join(name);
            fs::write(&p, b"hidden").unwrap();
            fs::set_permissions(&p, fs::Permissions::from_mode(0o000)).unwrap();
        }

        let mut store = BaselineStore::new(dir.path().join("baseline.json"));
        let summary = store.populate(&[root.clone()], &IgnoreRules::default()).unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.count(SkipKind::PermissionDenied), 2);
        assert!(store.get(&root.join("secret1")).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn populate_skips_fifos() {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(&root).unwrap();
        let fifo = root.join("pipe");
        let c_path = CString::new(fifo.as_os_str().as_bytes()).unwrap();
        assert_eq!(unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) }, 0);

        let mut store = BaselineStore::new(dir.path().join("baseline.json"));
        let summary = store.populate(&[root], &IgnoreRules::default()).unwrap();
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.count(SkipKind::NotRegularFile), 1);
    }

    #[cfg(unix)]
    #[test]
    fn populate_skips_non_utf8_names_and_still_persists() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.txt"), b"x").unwrap();
        let bad = root.join(OsStr::from_bytes(b"bad\xffname"));
        fs::write(&bad, b"payload").unwrap();

        let baseline_path = dir.path().join("baseline.json");
        let mut store = BaselineStore::new(&baseline_path);
        let summary = store.populate(&[root.clone()], &IgnoreRules::default()).unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.count(SkipKind::NonUtf8Path), 1);
        assert!(store.get(&bad).is_none());

        let mut reloaded = BaselineStore::new(&baseline_path);
        assert_eq!(reloaded.load(), LoadOutcome::Loaded(1));

        // later mutations keep persisting
        let hosts = root.join("hosts");
        fs::write(&hosts, b"127.0.0.1").unwrap();
        store
            .set(BaselineEntry {
                path: hosts.clone(),
                hash: hash_file(&hosts).unwrap(),
                owner: "root".into(),
            })
            .unwrap();
        assert_eq!(reloaded.load(), LoadOutcome::Loaded(2));

        let err = store
            .set(BaselineEntry {
                path: bad.clone(),
                hash: "h".into(),
                owner: "root".into(),
            })
            .unwrap_err();
        assert!(matches!(err, TrackerError::NonUtf8Path(_)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn set_overwrites_and_persists() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("hosts");
        fs::write(&file, b"127.0.0.1 localhost").unwrap();
        let baseline_path = dir.path().join("baseline.json");

        let mut store = BaselineStore::new(&baseline_path);
        store
            .set(BaselineEntry {
                path: file.clone(),
                hash: "old".into(),
                owner: "root".into(),
            })
            .unwrap();
        store
            .set(BaselineEntry {
                path: file.clone(),
                hash: hash_file(&file).unwrap(),
                owner: "root".into(),
            })
            .unwrap();

        let mut reloaded = BaselineStore::new(&baseline_path);
        assert_eq!(reloaded.load(), LoadOutcome::Loaded(1));
        assert_eq!(reloaded.get(&file).unwrap().hash, hash_file(&file).unwrap());
    }

    #[test]
    fn snapshot_is_a_path_keyed_json_object() {
        let dir = tempdir().unwrap();
        let baseline_path = dir.path().join("baseline.json");
        let mut store = BaselineStore::new(&baseline_path);
        store
            .set(BaselineEntry {
                path: "/etc/passwd".into(),
                hash: "abc123".into(),
                owner: "root".into(),
            })
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&fs::read(&baseline_path).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"/etc/passwd": {"hash": "abc123", "owner": "root"}})
        );
    }

    #[cfg(unix)]
    #[test]
    fn snapshot_and_parent_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let state_dir = dir.path().join("var/lib/filetracker");
        let baseline_path = state_dir.join("baseline.json");
        let store = BaselineStore::new(&baseline_path);
        store.save().unwrap();

        let file_mode = fs::metadata(&baseline_path).unwrap().permissions().mode();
        assert_eq!(file_mode & 0o777, 0o600);
        let dir_mode = fs::metadata(&state_dir).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o077, 0);
    }

    #[test]
    fn corrupt_snapshot_loads_empty() {
        let dir = tempdir().unwrap();
        let baseline_path = dir.path().join("baseline.json");
        fs::write(&baseline_path, b"{ not json").unwrap();

        let mut store = BaselineStore::new(&baseline_path);
        assert!(matches!(store.load(), LoadOutcome::Corrupt(_)));
        assert!(store.is_empty());

        fs::write(&baseline_path, b"").unwrap();
        assert!(matches!(store.load(), LoadOutcome::Corrupt(_)));
        assert!(store.is_empty());
    }
}
