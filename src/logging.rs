use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config;
use crate::error::Result;

/// Overrides the level chosen from `DEBUG`, e.g. `SCB_LOG=scb::history=trace`.
pub const LOG_FILTER_ENV: &str = "SCB_LOG";
pub const LOG_FILE: &str = "scb.log";

fn default_directive(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "error"
    }
}

/// Send tracing output to `<log_dir>/scb.log`. The terminal belongs to the
/// browser, so nothing is logged to stdout or stderr.
pub fn init(log_dir: &Path) -> Result<()> {
    fs::create_dir_all(log_dir)?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE))?;

    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config::debug_enabled())));

    // A second init (tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .try_init();
    Ok(())
}
