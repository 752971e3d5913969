//! Error types for the tracker engine.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Baseline serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),

    #[error("Failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Failed to start watch bridge thread: {0}")]
    Bridge(#[source] io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl TrackerError {
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        TrackerError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// The underlying I/O error kind, if this is an I/O failure.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            TrackerError::Io { source, .. } | TrackerError::Persist { source, .. } => {
                Some(source.kind())
            }
            _ => None,
        }
    }
}
