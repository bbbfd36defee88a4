//! Satchel daemon runtime: startup reconciliation, then watcher + action
//! processor until stopped.

mod error;
mod runtime;

use std::path::Path;

pub use error::DaemonError;
pub use runtime::{
    run, run_engine, EngineContext, EngineState, WatchEvent, WatchOp, DEBOUNCE_WINDOW,
};

use satchel_core::Config;

/// Start the engine and block the current thread until it exits.
pub fn start_blocking(home: &Path, config: Config) -> Result<(), DaemonError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| error::io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), config))
}

/// Install the tracing subscriber. The config `debug` flag lowers the
/// default filter to `debug`; `RUST_LOG` still overrides either default.
pub fn init_tracing(debug: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
