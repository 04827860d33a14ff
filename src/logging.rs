//! File logging
//!
//! The host terminal is in raw mode while a session runs, so log lines go to
//! `~/.nodeterm/nodeterm.log` instead of stderr.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Environment variable holding the log filter directives
const LOG_ENV: &str = "NODETERM_LOG";
const DEFAULT_FILTER: &str = "nodeterm=info";

pub fn log_path() -> Result<PathBuf> {
    Ok(Config::config_dir()?.join("nodeterm.log"))
}

/// Install the global subscriber writing to `path`
pub fn init(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))
}
