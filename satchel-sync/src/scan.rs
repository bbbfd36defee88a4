//! Local indexer — one snapshot of the watched tree.

use std::path::Path;

use chrono::{DateTime, Utc};

use satchel_core::{LocalSnapshot, SyncKey};

use crate::error::{scan_err, SyncError};

/// Walk the tree rooted at `root` and return a key → mtime snapshot.
///
/// The root entry itself is excluded, and only regular files are indexed:
/// directories and special files have no object representation. Any
/// traversal I/O error aborts the scan — fatal for the reconciliation
/// pass that asked for it, not for the process.
pub fn scan(root: &Path) -> Result<LocalSnapshot, SyncError> {
    let mut snapshot = LocalSnapshot::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| scan_err(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| scan_err(&dir, e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| scan_err(&path, e))?;

            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            if !file_type.is_file() {
                tracing::debug!(path = %path.display(), "skipping non-regular entry");
                continue;
            }

            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .map_err(|e| scan_err(&path, e))?;

            match SyncKey::from_path(root, &path) {
                Some(key) => {
                    snapshot.insert(key, DateTime::<Utc>::from(modified));
                }
                None => {
                    tracing::warn!(path = %path.display(), "entry has no sync key; skipping");
                }
            }
        }
    }

    Ok(snapshot)
}
