//! Error types for store and migration operations.
//!
//! The taxonomy mirrors how callers recover:
//! - [`StoreError::Parse`] - a file exists but cannot be decoded. Collection
//!   loads skip the entity; single-file settings loads propagate it.
//! - [`StoreError::Io`] - a read or write failed. Absent files are handled
//!   before this is raised wherever an operation defines a default.
//! - [`StoreError::Verification`] - a post-write read-back check failed.
//!   Always fatal: the caller must not continue the migration.
//! - [`StoreError::InvalidName`] - an entity name or id that cannot be
//!   mapped to a file.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the stores and the migration coordinator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A file was read but its contents could not be decoded.
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An underlying filesystem operation failed.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A freshly written file failed its read-back check.
    #[error("read-back verification failed for {}", path.display())]
    Verification { path: PathBuf },

    /// An entity name or id that cannot form a file name.
    #[error("invalid entity name: {name:?}")]
    InvalidName { name: String },
}

impl StoreError {
    pub(crate) fn parse(
        path: impl Into<PathBuf>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Parse {
            path: path.into(),
            source: source.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn verification(path: impl Into<PathBuf>) -> Self {
        Self::Verification { path: path.into() }
    }

    pub(crate) fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName { name: name.into() }
    }
}

/// True when an i/o error means "the file is not there".
pub(crate) fn is_not_found(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound
}

/// Map an i/o result so that a missing file becomes `Ok(None)`.
pub(crate) fn absent_as_none<T>(result: io::Result<T>, path: &Path) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if is_not_found(&e) => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}
