//! Domain types shared across the Satchel crates.
//!
//! All filesystem paths use `PathBuf`; the only string-shaped path is
//! [`SyncKey`], which is deliberately not a path but an object identity.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SyncKey
// ---------------------------------------------------------------------------

/// Identity of a file shared between the local tree and the bucket.
///
/// A `SyncKey` is the path relative to the watched root, joined with `/`
/// regardless of the platform separator. It is built from normal path
/// components only, so two distinct native paths can never collapse onto
/// the same key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SyncKey(String);

impl SyncKey {
    /// Normalize a native path under `root` into a key.
    ///
    /// Returns `None` when `path` does not live under `root`, escapes it
    /// (`..`), or contains a non-UTF-8 component — such entries have no
    /// remote identity and are skipped by callers.
    pub fn from_path(root: &Path, path: &Path) -> Option<SyncKey> {
        let relative = path.strip_prefix(root).ok()?;
        let mut parts: Vec<&str> = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(os) => parts.push(os.to_str()?),
                Component::CurDir => continue,
                _ => return None,
            }
        }
        if parts.is_empty() {
            return None;
        }
        Some(SyncKey(parts.join("/")))
    }

    /// Map the key back to a native absolute path under `root`.
    pub fn to_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for part in self.0.split('/') {
            path.push(part);
        }
        path
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SyncKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SyncKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// One full scan of the watched tree: key → last modification time.
///
/// Rebuilt for every reconciliation pass; never persisted. Ordered so a
/// pass visits keys deterministically.
pub type LocalSnapshot = BTreeMap<SyncKey, DateTime<Utc>>;

/// One full listing of the bucket: key → ETag.
pub type RemoteSnapshot = BTreeMap<SyncKey, String>;

// ---------------------------------------------------------------------------
// Actions and results
// ---------------------------------------------------------------------------

/// A single corrective step decided by the reconciler.
///
/// Consumed immediately by the engine; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Push the local file for `key` to the bucket.
    Upload(SyncKey),
    /// Fetch the object for `key` (known remote ETag) into the local tree.
    Download(SyncKey, String),
    /// Remove the object for `key` from the bucket.
    Delete(SyncKey),
}

impl SyncAction {
    pub fn key(&self) -> &SyncKey {
        match self {
            SyncAction::Upload(key) => key,
            SyncAction::Download(key, _) => key,
            SyncAction::Delete(key) => key,
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::Upload(key) => write!(f, "upload {key}"),
            SyncAction::Download(key, _) => write!(f, "download {key}"),
            SyncAction::Delete(key) => write!(f, "delete {key}"),
        }
    }
}

/// Outcome of a completed upload or download: the key that moved and the
/// ETag the store confirmed for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub key: SyncKey,
    pub etag: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_path_normalizes_to_forward_slashes() {
        let root = Path::new("/watched");
        let path = root.join("a").join("b").join("c.txt");
        let key = SyncKey::from_path(root, &path).expect("key");
        assert_eq!(key.as_str(), "a/b/c.txt");
    }

    #[test]
    fn key_round_trips_through_native_path() {
        let root = Path::new("/watched");
        let key = SyncKey::from("docs/notes/today.md");
        let path = key.to_path(root);
        assert_eq!(SyncKey::from_path(root, &path), Some(key));
    }

    #[test]
    fn path_outside_root_has_no_key() {
        let root = Path::new("/watched");
        assert_eq!(SyncKey::from_path(root, Path::new("/elsewhere/x")), None);
    }

    #[test]
    fn root_itself_has_no_key() {
        let root = Path::new("/watched");
        assert_eq!(SyncKey::from_path(root, root), None);
    }

    #[test]
    fn parent_escape_has_no_key() {
        let root = Path::new("/watched");
        let path = root.join("..").join("sibling.txt");
        assert_eq!(SyncKey::from_path(root, &path), None);
    }

    #[test]
    fn distinct_paths_produce_distinct_keys() {
        let root = Path::new("/watched");
        let a = SyncKey::from_path(root, &root.join("a").join("b.txt"));
        let b = SyncKey::from_path(root, &root.join("a_b.txt"));
        assert_ne!(a, b);
    }
}
