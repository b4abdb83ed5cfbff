// src/logging.rs
//! Logging setup
//!
//! Log lines go to stderr, or to a file when one is given, so they never interleave
//! with the terminal panel on stdout. The level comes from `RUST_LOG` when set.

use crate::error::{MapError, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Write here instead of stderr; truncated at start-up
    pub file: Option<PathBuf>,
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            file: None,
            default_filter: "info".to_string(),
        }
    }
}

/// Keep alive for as long as logging is needed. Dropping it flushes the file writer.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

pub fn init_logging(options: &LogOptions) -> Result<LoggingGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&options.default_filter));

    let Some(path) = &options.file else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .try_init()
            .map_err(|e| MapError::Other(format!("Failed to install logger: {}", e)))?;
        return Ok(LoggingGuard { _file_guard: None });
    };

    let (dir, name) = prepare_log_file(path)?;
    let appender = tracing_appender::rolling::never(dir, name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .try_init()
        .map_err(|e| MapError::Other(format!("Failed to install logger: {}", e)))?;

    Ok(LoggingGuard {
        _file_guard: Some(guard),
    })
}

/// Create the parent directory and clear the previous session's log.
fn prepare_log_file(path: &Path) -> Result<(PathBuf, PathBuf)> {
    let name = path
        .file_name()
        .ok_or_else(|| MapError::Config(format!("log path {} has no file name", path.display())))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    fs::create_dir_all(&dir)?;
    fs::write(path, "")?;
    Ok((dir, PathBuf::from(name)))
}
