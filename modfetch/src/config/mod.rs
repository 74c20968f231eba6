//! Configuration file support.
//!
//! The configuration is an INI file, by default
//! `~/.config/modfetch/config.ini`:
//!
//! ```ini
//! [engine]
//! identification_workers = 8
//! conflict_policy = newest
//! install_dir = ./lib
//!
//! [download]
//! threads_per_host = 4
//!
//! [repository.central]
//! platform = local
//! root = /srv/modules
//!
//! [modules]
//! module = org.example:app:[1.0,)
//!
//! [rules]
//! rule = exclude org.legacy:*
//! ```
//!
//! Every section is optional. Unknown keys are ignored with a warning.

mod engine;
mod file;
mod repository;

pub use engine::EngineConfig;
pub use file::ConfigFile;
pub use repository::RepositoryConfig;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    #[error("failed to parse config file: {0}")]
    ParseFailed(String),

    #[error("invalid value '{value}' for [{section}] {key}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },

    #[error("missing required key [{section}] {key}")]
    MissingKey { section: String, key: String },

    #[error("repository '{0}' is defined more than once")]
    DuplicateRepository(String),
}

impl ConfigError {
    fn invalid(section: &str, key: &str, value: &str) -> Self {
        Self::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// Get the configuration directory path (`~/.config/modfetch`).
pub fn config_directory() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("modfetch")
}

/// Get the default configuration file path.
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_path() {
        let path = config_file_path();
        assert!(path.ends_with("modfetch/config.ini"));
    }

    #[test]
    fn test_invalid_value_message() {
        let error = ConfigError::invalid("engine", "recursive", "maybe");
        assert_eq!(error.to_string(), "invalid value 'maybe' for [engine] recursive");
    }
}
