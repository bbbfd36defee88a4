//! Error types for satchel-sync.

use std::path::PathBuf;

use thiserror::Error;

use satchel_core::SyncKey;

/// All errors that can arise from sync operations.
///
/// `Scan` and `List` abort the reconciliation pass that raised them;
/// `Operation` and `Cache` are per-key and are logged and skipped by the
/// engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local tree traversal failed.
    #[error("scan failed at {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Bucket listing failed (authentication or network).
    #[error("bucket listing failed: {0}")]
    List(String),

    /// A single upload/download/delete exhausted its retries.
    #[error("{op} of {key} failed after {attempts} attempts: {message}")]
    Operation {
        op: &'static str,
        key: SyncKey,
        attempts: u32,
        message: String,
    },

    /// Sync cache failure (open, read, or write).
    #[error("sync cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    /// A path with no object identity (outside the watched root, escaping
    /// it, or non-UTF-8).
    #[error("path {0} has no sync key under the watched root")]
    InvalidPath(PathBuf),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`SyncError::Scan`].
pub(crate) fn scan_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Scan {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`SyncError::Operation`].
pub(crate) fn operation_err(
    op: &'static str,
    key: &SyncKey,
    attempts: u32,
    message: String,
) -> SyncError {
    SyncError::Operation {
        op,
        key: key.clone(),
        attempts,
        message,
    }
}
