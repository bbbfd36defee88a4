//! Daemon configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.satchel/
//!   config.yaml   (immutable after load — edited by hand or a setup tool)
//!   cache.db      (sync cache, owned by satchel-sync)
//! ```
//!
//! # API pattern
//!
//! Loading functions come in two forms:
//! - `fn_at(home: &Path)` — explicit home; used in tests with `TempDir`
//! - `fn()` — derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Immutable daemon configuration, loaded once before engine start.
///
/// `secret` and `token` are the static access key id and secret access
/// key for the bucket — the field names predate this implementation and
/// are kept so existing config files keep working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Absolute path of the watched directory.
    pub root: PathBuf,
    /// Object store endpoint URL (S3-compatible, path-style addressed).
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub secret: String,
    pub token: String,
    /// Suppress all delete propagation: files are only ever added.
    #[serde(default)]
    pub add_only: bool,
    /// Verbose per-event logging.
    #[serde(default)]
    pub debug: bool,
}

impl Config {
    /// Check invariants that must hold before the engine may start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.root.is_dir() {
            return Err(ConfigError::RootMissing {
                path: self.root.clone(),
            });
        }
        Ok(())
    }
}

/// `<home>/.satchel/` — pure, no I/O.
pub fn satchel_root(home: &Path) -> PathBuf {
    home.join(".satchel")
}

/// `<home>/.satchel/config.yaml` — pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    satchel_root(home).join("config.yaml")
}

/// `<home>/.satchel/cache.db` — pure, no I/O.
pub fn cache_db_path_at(home: &Path) -> PathBuf {
    satchel_root(home).join("cache.db")
}

/// Load and parse the config file under `home`.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Err(ConfigError::NotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
}

/// `load_at` convenience wrapper over `dirs::home_dir()`.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&home()?)
}

/// Save the config file under `home`, creating `~/.satchel/` if needed.
pub fn save_at(home: &Path, config: &Config) -> Result<(), ConfigError> {
    let path = config_path_at(home);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&path, yaml)?;
    Ok(())
}

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}
