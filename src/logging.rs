use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

pub const LOG_ENV: &str = "REELS_LOG";

/// Installs the global subscriber. The terminal belongs to the UI, so
/// output goes to the configured file; with no file, logging is off.
pub fn init(cfg: &LogConfig) -> Result<()> {
    let Some(path) = cfg.file.as_deref() else {
        return Ok(());
    };
    let file = open_log_file(path)?;
    let filter = build_filter(cfg);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|err| anyhow!("install log subscriber: {err}"))?;
    tracing::info!(version = crate::VERSION, "reels-tui starting");
    Ok(())
}

fn build_filter(cfg: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(cfg.filter.trim()))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn open_log_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("log: failed to create directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("log: failed to open {}", path.display()))
}
