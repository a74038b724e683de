//! Logging setup for the battery voltage alarm daemon.
//!
//! Diagnostics go to a rotating JSON log file under the data directory and,
//! at WARN and above, to stderr. Stdout stays reserved for the live
//! per-sample stream and statistics blocks.

use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, format::FmtSpan, time::UtcTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Maximum number of rotated log files to retain.
const MAX_LOG_FILES: usize = 3;

/// Initialize the logging system.
///
/// Rotation occurs daily, retaining the last [`MAX_LOG_FILES`] files. The
/// returned guard must be held for the lifetime of the program.
pub fn init_logging(log_dir: &Path) -> Result<LogGuard, LoggingError> {
    std::fs::create_dir_all(log_dir).map_err(|e| LoggingError::DirectoryCreationFailed {
        path: log_dir.display().to_string(),
        source: e,
    })?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .filename_prefix("daemon")
        .filename_suffix("log")
        .build(log_dir)
        .map_err(|e| LoggingError::AppenderCreationFailed(e.to_string()))?;

    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // JSON layer for file output
    let file_layer = fmt::layer()
        .json()
        .with_timer(UtcTime::rfc_3339())
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(non_blocking_file);

    // Warnings and errors only on stderr, plain text, so the terminal stays
    // usable for the sample stream on stdout
    let stderr_layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}

/// Guard that keeps the non-blocking file writer alive.
pub struct LogGuard {
    _file_guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Errors related to logging initialization.
#[derive(Debug)]
pub enum LoggingError {
    /// Failed to create log directory
    DirectoryCreationFailed {
        path: String,
        source: std::io::Error,
    },
    /// Failed to create file appender
    AppenderCreationFailed(String),
}

impl std::fmt::Display for LoggingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoggingError::DirectoryCreationFailed { path, source } => {
                write!(f, "Failed to create log directory '{}': {}", path, source)
            }
            LoggingError::AppenderCreationFailed(msg) => {
                write!(f, "Failed to create log file appender: {}", msg)
            }
        }
    }
}

impl std::error::Error for LoggingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoggingError::DirectoryCreationFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
