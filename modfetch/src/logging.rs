//! Logging setup.
//!
//! Console output goes to stderr so that `--json` output on stdout stays
//! machine readable. `RUST_LOG` overrides the configured level. When a log
//! file is configured a second, non-blocking layer writes plain text to it;
//! the returned [`WorkerGuard`] must be kept alive until exit so buffered
//! lines are flushed.

use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::fmt::{self, time::LocalTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub use tracing_appender::non_blocking::WorkerGuard;

/// Default log level when none is configured.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level '{level}': {reason}")]
    InvalidLevel { level: String, reason: String },

    #[error("invalid log file path {}", .path.display())]
    InvalidFile { path: PathBuf },

    #[error("failed to create log directory {}: {source}", .path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `modfetch=debug`.
    pub level: String,

    /// Optional log file, written in addition to stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// Parse a filter directive without consulting the environment.
pub fn parse_level(level: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(level).map_err(|e| LoggingError::InvalidLevel {
        level: level.to_string(),
        reason: e.to_string(),
    })
}

/// Install the global subscriber. `verbose` raises the configured level to
/// `debug`.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Result<Option<WorkerGuard>, LoggingError> {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => parse_level(level)?,
    };

    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_timer(LocalTime::new(Rfc3339))
        .with_target(false);

    let Some(path) = &config.file else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console)
            .try_init()
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;
        return Ok(None);
    };

    let file_name = path
        .file_name()
        .ok_or_else(|| LoggingError::InvalidFile { path: path.clone() })?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| LoggingError::CreateDirFailed {
        path: dir.clone(),
        source: e,
    })?;

    let appender = tracing_appender::rolling::never(&dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_timer(LocalTime::new(Rfc3339));

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(Some(guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.file.is_none());
    }

    #[test]
    fn test_builder() {
        let config = LoggingConfig::default()
            .with_level("modfetch=debug")
            .with_file("/tmp/modfetch.log");
        assert_eq!(config.level, "modfetch=debug");
        assert_eq!(config.file, Some(PathBuf::from("/tmp/modfetch.log")));
    }

    #[test]
    fn test_parse_level() {
        assert!(parse_level("info").is_ok());
        assert!(parse_level("modfetch=debug,warn").is_ok());
        assert!(matches!(
            parse_level("modfetch=loud"),
            Err(LoggingError::InvalidLevel { .. })
        ));
    }
}
