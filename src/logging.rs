//! Tracing setup.
//!
//! The attached terminal is raw and owned by a subprocess, so anything
//! printed to it mid-attach corrupts the tool's screen. Prefer a log file;
//! stderr only gets `warn` and above unless `TOOLMUX_LOG` says otherwise.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV: &str = "TOOLMUX_LOG";
const DEFAULT_FILTER: &str = "warn";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Appends to `log_file` when given.
pub fn init_tracing(log_file: Option<&Path>) -> io::Result<()> {
    let filter = env_filter();

    let result = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let file_layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_level(true)
                .with_timer(UtcTime::rfc_3339());
            tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .try_init()
        }
        None => {
            let stderr_layer = fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_level(true)
                .with_timer(UtcTime::rfc_3339());
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .try_init()
        }
    };

    // A subscriber installed earlier (tests, embedding) wins.
    if let Err(err) = result {
        tracing::debug!("tracing already initialised: {err}");
    }
    Ok(())
}
