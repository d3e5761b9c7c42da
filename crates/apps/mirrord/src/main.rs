//! mirrord - incremental InfluxDB mirror daemon
//!
//! Mirrors the configured buckets from a remote InfluxDB instance into a
//! local one on a fixed schedule. Run with no arguments for a normal
//! guarded start; run `mirrord forceOn` after an abnormal termination left
//! the single-instance lock behind. Stop with Ctrl-C.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use config::SettingsFile;
use log::error;
use mirror::db::InfluxFactory;
use mirror::guard::InstanceGuard;
use mirror::net::SystemPing;
use mirror::sync::CycleController;

/// CLI keyword that clears a stale lock before the guarded start
const FORCE_KEYWORD: &str = "forceOn";

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let guard = InstanceGuard::default_location();

    // Recovery path for locks left behind by an abnormal termination.
    // Any other argument falls through to a normal start.
    if std::env::args().nth(1).as_deref() == Some(FORCE_KEYWORD) {
        if let Err(e) = guard.force_reset() {
            error!("Failed to reset the instance lock: {e:#}");
            return ExitCode::FAILURE;
        }
    }

    match guard.try_acquire() {
        Ok(true) => {}
        Ok(false) => {
            // No writer exists yet, so this goes to the console only
            println!(
                "This program is already running on this device, or exited due to an error.\n\
                 It can be forceably started regardless of other instances with \
                 'mirrord {FORCE_KEYWORD}'."
            );
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            error!("Failed to acquire the instance lock: {e:#}");
            return ExitCode::FAILURE;
        }
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
        error!("Failed to install the Ctrl-C handler: {e}");
        let _ = guard.release();
        return ExitCode::FAILURE;
    }

    let mut controller = CycleController::new(
        SettingsFile::default_location(),
        InfluxFactory,
        SystemPing,
        guard,
    );

    match controller.run(&shutdown) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
