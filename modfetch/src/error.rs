//! Crate-level error type.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::download::DownloadError;
use crate::logging::LoggingError;
use crate::platform::PlatformError;
use crate::repository::RepositoryError;
use crate::spec::SpecificationError;
use crate::state::StateError;

/// Result type for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Specification(#[from] SpecificationError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("I/O error on {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    /// Installation refused because modules could not be identified.
    #[error("{count} module(s) could not be identified: {}", .modules.join(", "))]
    Unidentified { count: usize, modules: Vec<String> },

    #[error("installation failed: {failed} of {total} transfer(s) failed")]
    InstallationFailed { failed: usize, total: usize },
}
