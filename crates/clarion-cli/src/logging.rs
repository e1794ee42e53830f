use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clarion_core::{AgentConfig, LoggingConfig};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

/// File the log goes to when none is configured (`~/.clarion/debug.log`)
///
/// # Errors
/// Returns an error if the home directory cannot be determined
pub fn default_log_path() -> Result<PathBuf> {
    Ok(AgentConfig::config_dir()?.join("debug.log"))
}

/// Installs the global subscriber.
///
/// `RUST_LOG` overrides the configured filter. Logs go to stderr when
/// `to_stderr` is set and to the configured (or default) log file otherwise.
///
/// # Errors
/// Returns an error if the log file cannot be opened
pub fn init_logging(config: &LoggingConfig, to_stderr: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    if to_stderr {
        Registry::default()
            .with(filter)
            .with(fmt::layer().with_writer(io::stderr).with_target(true))
            .try_init()?;
        return Ok(());
    }

    let log_path = match &config.log_file {
        Some(path) => path.clone(),
        None => default_log_path()?,
    };
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    Registry::default()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(Arc::new(log_file))
                .with_ansi(false)
                .with_target(true)
                .with_level(true),
        )
        .try_init()?;
    Ok(())
}
