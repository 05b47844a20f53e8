//! Tracing subscriber setup.
//!
//! Hosts usually discard a worker's stderr, so logs can be sent to a file
//! through a non-blocking `tracing-appender` writer instead. `RUST_LOG`
//! overrides the configured level when set, and `verbose` overrides both.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Keeps the file writer flushing until dropped.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file_writer: Option<WorkerGuard>,
}

/// Level used when verbose logging is requested.
pub const VERBOSE_LEVEL: &str = "debug";

/// Build the filter: `debug` when `verbose`, otherwise `RUST_LOG`, falling
/// back to `level`.
pub fn env_filter(level: &str, verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new(VERBOSE_LEVEL);
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber, logging to `file` when given and to
/// stderr otherwise.
pub fn init(level: &str, verbose: bool, file: Option<&Path>) -> Result<LogGuard> {
    let filter = env_filter(level, verbose);

    let Some(file) = file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| anyhow!("failed to install log subscriber: {}", e))?;
        return Ok(LogGuard { _file_writer: None });
    };

    let directory = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = file
        .file_name()
        .with_context(|| format!("log file has no file name: {}", file.display()))?;
    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create log directory: {}", directory.display()))?;

    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {}", e))?;

    Ok(LogGuard {
        _file_writer: Some(guard),
    })
}
