//! CLI error type.

use std::fmt;

use modfetch::config::ConfigError;
use modfetch::logging::LoggingError;
use modfetch::spec::SpecificationError;

/// Errors that end a CLI run.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded.
    Config(String),
    /// No modules on the command line or in the configuration.
    NoModules,
    /// Some modules could not be identified.
    Unidentified(usize),
    /// Report serialization failed.
    Output(String),
    /// Error raised by the library.
    Library(modfetch::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::NoModules => write!(
                f,
                "No modules to process. Pass specifications on the command line or add them to [modules]"
            ),
            CliError::Unidentified(count) => write!(f, "{} module(s) could not be identified", count),
            CliError::Output(msg) => write!(f, "Failed to write output: {}", msg),
            CliError::Library(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Library(e) => Some(e),
            _ => None,
        }
    }
}

impl From<modfetch::Error> for CliError {
    fn from(e: modfetch::Error) -> Self {
        CliError::Library(e)
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Library(e.into())
    }
}

impl From<SpecificationError> for CliError {
    fn from(e: SpecificationError) -> Self {
        CliError::Library(e.into())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Output(e.to_string())
    }
}
