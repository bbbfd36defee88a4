//! End-to-end reconciler scenarios over a real on-disk cache.

use std::collections::BTreeMap;

use chrono::Utc;
use tempfile::TempDir;

use satchel_core::{LocalSnapshot, RemoteSnapshot, SyncAction, SyncKey};
use satchel_sync::{diff, SyncCache};

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

/// Pretend the engine applied every action: uploads land in the remote
/// snapshot with a fresh ETag, downloads and uploads record their ETag in
/// the cache, deletes drop the object and its cache entry.
fn apply_all(
    actions: &[SyncAction],
    local: &LocalSnapshot,
    remote: &mut RemoteSnapshot,
    cache: &SyncCache,
) {
    for action in actions {
        match action {
            SyncAction::Upload(key) => {
                assert!(local.contains_key(key), "upload of a key not on disk");
                let etag = format!("\"uploaded-{key}\"");
                remote.insert(key.clone(), etag.clone());
                cache.set(key, &etag).unwrap();
            }
            SyncAction::Download(key, etag) => {
                cache.set(key, etag).unwrap();
            }
            SyncAction::Delete(key) => {
                remote.remove(key);
                cache.delete(key).unwrap();
            }
        }
    }
}

#[test]
fn cold_start_scenario_uploads_untracked_and_downloads_unseen() {
    let dir = TempDir::new().unwrap();
    let cache = SyncCache::open_at(&dir.path().join("cache.db")).unwrap();
    cache.set(&SyncKey::from("b.txt"), "\"X\"").unwrap();

    let local = local(&["a.txt", "b.txt"]);
    let remote = remote(&[("b.txt", "\"X\""), ("c.txt", "\"Y\"")]);

    let actions = diff(&local, &remote, &cache, false).unwrap();
    assert_eq!(
        actions,
        vec![
            SyncAction::Upload(SyncKey::from("a.txt")),
            SyncAction::Download(SyncKey::from("c.txt"), "\"Y\"".to_string()),
        ],
        "b.txt is already synced and must produce no action",
    );
}

#[test]
fn second_pass_after_apply_is_empty() {
    let dir = TempDir::new().unwrap();
    let cache = SyncCache::open_at(&dir.path().join("cache.db")).unwrap();
    cache.set(&SyncKey::from("kept.txt"), "\"K\"").unwrap();
    cache.set(&SyncKey::from("gone.txt"), "\"G\"").unwrap();

    let local = local(&["new.txt", "kept.txt"]);
    let mut remote = remote(&[
        ("kept.txt", "\"K\""),
        ("gone.txt", "\"G\""),
        ("incoming.txt", "\"I\""),
    ]);

    let first = diff(&local, &remote, &cache, false).unwrap();
    assert_eq!(first.len(), 3, "upload, download, delete: {first:?}");
    apply_all(&first, &local, &mut remote, &cache);

    // The download landed locally too.
    let mut local = local.clone();
    local.insert(SyncKey::from("incoming.txt"), Utc::now());

    let second = diff(&local, &remote, &cache, false).unwrap();
    assert!(
        second.is_empty(),
        "no intervening change, second pass must be a no-op: {second:?}",
    );
}

#[test]
fn add_only_pass_never_deletes_and_stays_idempotent_for_the_rest() {
    let dir = TempDir::new().unwrap();
    let cache = SyncCache::open_at(&dir.path().join("cache.db")).unwrap();
    cache.set(&SyncKey::from("gone.txt"), "\"G\"").unwrap();

    let local = local(&["fresh.txt"]);
    let mut remote = remote(&[("gone.txt", "\"G\"")]);

    let actions = diff(&local, &remote, &cache, true).unwrap();
    assert_eq!(
        actions,
        vec![SyncAction::Upload(SyncKey::from("fresh.txt"))],
        "the locally-removed key must be left alone under add-only",
    );

    apply_all(&actions, &local, &mut remote, &cache);
    assert_eq!(
        cache.get(&SyncKey::from("gone.txt")).unwrap(),
        Some("\"G\"".to_string()),
        "suppressed delete leaves the cache entry untouched",
    );
}

#[test]
fn actions_are_ordered_locals_then_remote_only() {
    let dir = TempDir::new().unwrap();
    let cache = SyncCache::open_at(&dir.path().join("cache.db")).unwrap();

    let local = local(&["z-local.txt", "a-local.txt"]);
    let remote = remote(&[("m-remote.txt", "\"M\""), ("b-remote.txt", "\"B\"")]);

    let actions = diff(&local, &remote, &cache, false).unwrap();
    let keys: Vec<String> = actions.iter().map(|a| a.key().to_string()).collect();
    assert_eq!(
        keys,
        vec!["a-local.txt", "z-local.txt", "b-remote.txt", "m-remote.txt"],
        "ascending local keys first, then ascending remote-only keys",
    );

    let mut cache_snapshot: BTreeMap<String, String> = BTreeMap::new();
    for action in &actions {
        cache_snapshot.insert(action.key().to_string(), format!("{action}"));
    }
    assert_eq!(cache_snapshot.len(), 4, "one action per key");
}
