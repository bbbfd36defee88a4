//! Merge policy — the three-way diff at the heart of the mirror.
//!
//! `diff` compares one local snapshot, one remote snapshot, and the
//! durable cache of last-synced ETags, and decides what to do per key:
//!
//! | local | remote | cache          | action                          |
//! |-------|--------|----------------|---------------------------------|
//! | yes   | no     | —              | upload                          |
//! | no    | yes    | none           | download (never seen)           |
//! | no    | yes    | == remote ETag | delete remote (local removed)   |
//! | no    | yes    | != remote ETag | download (remote changed since; |
//! |       |        |                | remote is the surviving copy)   |
//! | yes   | yes    | == remote ETag | nothing — already synced        |
//! | yes   | yes    | none or !=     | download (diverged; remote wins |
//! |       |        |                | at cold start — live edits are  |
//! |       |        |                | pushed by the watch path first) |
//!
//! AddOnly suppresses every delete unconditionally. In-place local edits
//! are not visible to this diff (the cache tracks last-synced *remote*
//! state, not local content); the live watch path is what pushes them.

use satchel_core::{LocalSnapshot, RemoteSnapshot, SyncAction};

use crate::cache::SyncCache;
use crate::error::SyncError;

/// Compute the ordered action list for one reconciliation pass.
///
/// Evaluates the union of keys in `local` and `remote`: local-side keys
/// first, then remote-only keys, each in ascending key order, so a pass
/// is deterministic for a given pair of snapshots.
pub fn diff(
    local: &LocalSnapshot,
    remote: &RemoteSnapshot,
    cache: &SyncCache,
    add_only: bool,
) -> Result<Vec<SyncAction>, SyncError> {
    let mut actions = Vec::new();

    for key in local.keys() {
        match remote.get(key) {
            None => actions.push(SyncAction::Upload(key.clone())),
            Some(remote_etag) => match cache.get(key)? {
                Some(cached) if cached == *remote_etag => {}
                _ => actions.push(SyncAction::Download(key.clone(), remote_etag.clone())),
            },
        }
    }

    for (key, remote_etag) in remote {
        if local.contains_key(key) {
            continue;
        }
        match cache.get(key)? {
            None => actions.push(SyncAction::Download(key.clone(), remote_etag.clone())),
            Some(cached) if cached == *remote_etag => {
                if !add_only {
                    actions.push(SyncAction::Delete(key.clone()));
                }
            }
            // Remote was modified after the local copy was removed and
            // before that deletion was observed: the remote object is the
            // only surviving copy.
            Some(_) => actions.push(SyncAction::Download(key.clone(), remote_etag.clone())),
        }
    }

    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use tempfile::TempDir;

    use satchel_core::SyncKey;

    fn local(keys: &[&str]) -> LocalSnapshot {
        keys.iter()
            .map(|k| (SyncKey::from(*k), Utc::now()))
            .collect()
    }

    fn remote(entries: &[(&str, &str)]) -> RemoteSnapshot {
        entries
            .iter()
            .map(|(k, e)| (SyncKey::from(*k), (*e).to_string()))
            .collect()
    }

    fn cache_with(dir: &TempDir, entries: &[(&str, &str)]) -> SyncCache {
        let cache = SyncCache::open_at(&dir.path().join("cache.db")).unwrap();
        for (k, e) in entries {
            cache.set(&SyncKey::from(*k), e).unwrap();
        }
        cache
    }

    #[test]
    fn new_local_file_uploads() {
        let dir = TempDir::new().unwrap();
        let cache = cache_with(&dir, &[]);
        let actions = diff(&local(&["a.txt"]), &remote(&[]), &cache, false).unwrap();
        assert_eq!(actions, vec![SyncAction::Upload(SyncKey::from("a.txt"))]);
    }

    #[test]
    fn unseen_remote_object_downloads() {
        let dir = TempDir::new().unwrap();
        let cache = cache_with(&dir, &[]);
        let actions = diff(&local(&[]), &remote(&[("a.txt", "\"X\"")]), &cache, false).unwrap();
        assert_eq!(
            actions,
            vec![SyncAction::Download(
                SyncKey::from("a.txt"),
                "\"X\"".to_string()
            )]
        );
    }

    #[test]
    fn locally_removed_synced_key_propagates_delete() {
        let dir = TempDir::new().unwrap();
        let cache = cache_with(&dir, &[("a.txt", "\"X\"")]);
        let actions = diff(&local(&[]), &remote(&[("a.txt", "\"X\"")]), &cache, false).unwrap();
        assert_eq!(actions, vec![SyncAction::Delete(SyncKey::from("a.txt"))]);
    }

    #[test]
    fn add_only_suppresses_delete() {
        let dir = TempDir::new().unwrap();
        let cache = cache_with(&dir, &[("a.txt", "\"X\"")]);
        let actions = diff(&local(&[]), &remote(&[("a.txt", "\"X\"")]), &cache, true).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn remote_changed_after_local_removal_downloads_instead_of_deleting() {
        let dir = TempDir::new().unwrap();
        let cache = cache_with(&dir, &[("a.txt", "\"X\"")]);
        let actions = diff(&local(&[]), &remote(&[("a.txt", "\"Y\"")]), &cache, false).unwrap();
        assert_eq!(
            actions,
            vec![SyncAction::Download(
                SyncKey::from("a.txt"),
                "\"Y\"".to_string()
            )]
        );
    }

    #[test]
    fn synced_key_produces_no_action() {
        let dir = TempDir::new().unwrap();
        let cache = cache_with(&dir, &[("a.txt", "\"X\"")]);
        let actions = diff(
            &local(&["a.txt"]),
            &remote(&[("a.txt", "\"X\"")]),
            &cache,
            false,
        )
        .unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn diverged_key_on_both_sides_downloads_remote() {
        let dir = TempDir::new().unwrap();
        let cache = cache_with(&dir, &[("a.txt", "\"X\"")]);
        let actions = diff(
            &local(&["a.txt"]),
            &remote(&[("a.txt", "\"Y\"")]),
            &cache,
            false,
        )
        .unwrap();
        assert_eq!(
            actions,
            vec![SyncAction::Download(
                SyncKey::from("a.txt"),
                "\"Y\"".to_string()
            )]
        );
    }

    #[test]
    fn untracked_key_present_on_both_sides_downloads_remote() {
        let dir = TempDir::new().unwrap();
        let cache = cache_with(&dir, &[]);
        let actions = diff(
            &local(&["a.txt"]),
            &remote(&[("a.txt", "\"X\"")]),
            &cache,
            false,
        )
        .unwrap();
        assert_eq!(
            actions,
            vec![SyncAction::Download(
                SyncKey::from("a.txt"),
                "\"X\"".to_string()
            )]
        );
    }
}
