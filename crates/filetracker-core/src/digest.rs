//! SHA-256 content digests and owner resolution.
//!
//! Files are streamed through the hasher in 64KB chunks so large binaries never
//! sit in memory. Owner resolution degrades in two distinct steps: a uid that
//! the identity directory cannot resolve becomes the numeric uid, and a
//! platform without uid metadata yields [`UNKNOWN_OWNER`].

use crate::error::{Result, TrackerError};
use sha2::{Digest, Sha256};
use std::fs::{File, Metadata};
use std::io::{self, Read};
use std::path::Path;

/// Buffer size for streaming reads (64KB)
const BUFFER_SIZE: usize = 64 * 1024;

/// Owner reported when the platform exposes no uid metadata.
pub const UNKNOWN_OWNER: &str = "unknown";

/// Content hash and owning principal of a file at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub hash: String,
    pub owner: String,
}

/// Hash a file and resolve its owner.
///
/// Metadata is taken from the opened handle so hash and owner describe the
/// same inode even if the path is swapped underneath us.
pub fn digest_and_owner(path: &Path) -> Result<FileDigest> {
    let mut file = File::open(path).map_err(|e| TrackerError::io(path, e))?;
    let metadata = file.metadata().ok();
    let owner = owner_of(metadata.as_ref());
    let hash = hash_reader(&mut file).map_err(|e| TrackerError::io(path, e))?;
    Ok(FileDigest { hash, owner })
}

/// Hash a single file with SHA-256, hex encoded.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| TrackerError::io(path, e))?;
    hash_reader(&mut file).map_err(|e| TrackerError::io(path, e))
}

pub fn hash_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Resolve the owner name for file metadata using the system identity directory.
pub fn owner_of(metadata: Option<&Metadata>) -> String {
    owner_label(metadata.and_then(owner_uid), lookup_user_name)
}

/// Pick the owner label from an optional uid and a name lookup.
///
/// `None` uid means no ownership metadata at all; a failed lookup keeps the uid.
pub fn owner_label<F>(uid: Option<u32>, lookup: F) -> String
where
    F: FnOnce(u32) -> Option<String>,
{
    match uid {
        None => UNKNOWN_OWNER.to_string(),
        Some(uid) => lookup(uid).unwrap_or_else(|| uid.to_string()),
    }
}

#[cfg(unix)]
fn owner_uid(metadata: &Metadata) -> Option<u32> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.uid())
}

#[cfg(not(unix))]
fn owner_uid(_metadata: &Metadata) -> Option<u32> {
    None
}

/// Look up a user name by uid with `getpwuid_r`.
#[cfg(unix)]
pub fn lookup_user_name(uid: u32) -> Option<String> {
    use std::ffi::CStr;
    use std::{mem, ptr};

    const MAX_BUFFER: usize = 1024 * 1024;

    let mut buf: Vec<libc::c_char> = vec![0; 2048];
    let mut passwd = unsafe { mem::zeroed::<libc::passwd>() };
    let mut result = ptr::null_mut::<libc::passwd>();

    loop {
        let r = unsafe {
            libc::getpwuid_r(
                uid as libc::uid_t,
                &mut passwd,
                buf.as_mut_ptr(),
                buf.len(),
                &mut result,
            )
        };
        if r != libc::ERANGE {
            break;
        }
        let newsize = buf.len().checked_mul(2)?;
        if newsize > MAX_BUFFER {
            return None;
        }
        buf.resize(newsize, 0);
    }

    // No such user, or the lookup failed.
    if result.is_null() || passwd.pw_name.is_null() {
        return None;
    }

    let name = unsafe { CStr::from_ptr(passwd.pw_name) }
        .to_string_lossy()
        .into_owned();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[cfg(not(unix))]
pub fn lookup_user_name(_uid: u32) -> Option<String> {
    None
}
