//! # satchel-sync
//!
//! Synchronization library: the durable sync cache, local tree scanner,
//! three-way merge policy, and the retried S3 object store.
//!
//! The daemon crate wires these together; everything here is callable
//! without a running watcher.

pub mod cache;
pub mod error;
pub mod reconcile;
pub mod remote;
pub mod retry;
pub mod scan;

pub use cache::SyncCache;
pub use error::SyncError;
pub use reconcile::diff;
pub use remote::{ObjectStore, RemoteStore};
pub use retry::{with_retry, RetryPolicy};
pub use scan::scan;
