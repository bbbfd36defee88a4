//! `satcheld` — mirror a local directory against an S3-compatible bucket.
//!
//! Reads `~/.satchel/config.yaml`, runs one full reconciliation, then
//! watches the configured root until interrupted.

use std::process::ExitCode;

fn main() -> ExitCode {
    let Some(home) = dirs::home_dir() else {
        eprintln!("satcheld: cannot determine home directory; set $HOME or equivalent");
        return ExitCode::FAILURE;
    };

    let config = match satchel_core::config::load_at(&home) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("satcheld: {err}");
            return ExitCode::FAILURE;
        }
    };

    satchel_daemon::init_tracing(config.debug);

    match satchel_daemon::start_blocking(&home, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "engine terminated");
            eprintln!("satcheld: {err}");
            ExitCode::FAILURE
        }
    }
}
