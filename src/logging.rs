//! Tracing subscriber setup
//!
//! Installed once by the binary. Console output always; an extra plain-text
//! layer appends to a log file when one is configured.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to open log file {path}: {reason}")]
    File { path: PathBuf, reason: String },

    #[error("Failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Keeps the log file open; flushes it to disk on drop
pub struct LogGuard {
    file: Option<Arc<File>>,
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            let _ = file.sync_all();
        }
    }
}

/// Filter from `RUST_LOG` when set, otherwise `level` for everything
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(format!("{level},leaderboard_oracle={level}"))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

pub fn init(level: &str, file: Option<&Path>) -> Result<LogGuard, LoggingError> {
    let file = file.map(open_log_file).transpose()?.map(Arc::new);
    let file_layer = file
        .clone()
        .map(|writer| fmt::layer().with_ansi(false).with_writer(writer));

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))?;

    Ok(LogGuard { file })
}

fn open_log_file(path: &Path) -> Result<File, LoggingError> {
    let error = |e: std::io::Error| LoggingError::File {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(error)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(error)
}
