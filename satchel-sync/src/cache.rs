//! Sync cache — durable key → ETag store.
//!
//! One row per [`SyncKey`]: the last ETag this process confirmed was
//! written to, or read from, the bucket for that key. Rows are written
//! only after the corresponding remote operation succeeded, and removed
//! when the key is gone from both sides.
//!
//! # Durability
//!
//! The store is a single SQLite file opened with `journal_mode=DELETE`
//! and `synchronous=FULL`: a `set`/`delete` that returned `Ok` has been
//! committed and survives an immediate process kill. Nothing is deferred
//! or batched, so shutdown never has buffered writes to lose.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension};

use satchel_core::SyncKey;

use crate::error::{io_err, SyncError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS sync_state (
    key  TEXT PRIMARY KEY,
    etag TEXT NOT NULL
)";

/// Durable key-value store for last-synced ETags.
///
/// The connection sits behind a mutex: the engine already serializes its
/// writes, the lock makes the store safe on its own terms as well.
pub struct SyncCache {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SyncCache {
    /// Open (or create) the cache file at `path`.
    ///
    /// Called once at startup; the handle lives until [`close`].
    ///
    /// [`close`]: SyncCache::close
    pub fn open_at(path: &Path) -> Result<SyncCache, SyncError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;

        // Durable-on-return commits; the file is small and written rarely,
        // so the WAL profile buys nothing here.
        conn.execute_batch(
            "PRAGMA journal_mode=DELETE;
             PRAGMA synchronous=FULL;
             PRAGMA busy_timeout=5000;",
        )?;
        conn.execute(SCHEMA, [])?;

        Ok(SyncCache {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    /// Last confirmed ETag for `key`, if any.
    pub fn get(&self, key: &SyncKey) -> Result<Option<String>, SyncError> {
        let conn = self.conn.lock();
        let etag = conn
            .query_row(
                "SELECT etag FROM sync_state WHERE key = ?1",
                [key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(etag)
    }

    /// Record `etag` as the last confirmed value for `key`.
    pub fn set(&self, key: &SyncKey, etag: &str) -> Result<(), SyncError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sync_state (key, etag) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET etag = excluded.etag",
            [key.as_str(), etag],
        )?;
        Ok(())
    }

    /// Drop the entry for `key`. Removing an absent key is not an error.
    pub fn delete(&self, key: &SyncKey) -> Result<(), SyncError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM sync_state WHERE key = ?1", [key.as_str()])?;
        Ok(())
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the store, surfacing any failure to flush.
    pub fn close(self) -> Result<(), SyncError> {
        self.conn
            .into_inner()
            .close()
            .map_err(|(_conn, err)| SyncError::Cache(err))
    }
}
