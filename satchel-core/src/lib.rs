//! Satchel core library — domain types, configuration, errors.
//!
//! Public API surface:
//! - [`types`] — [`SyncKey`], snapshots, [`SyncAction`]
//! - [`config`] — [`Config`] load / validate
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::ConfigError;
pub use types::{LocalSnapshot, RemoteSnapshot, SyncAction, SyncKey, Transfer};
