//! The repository capability.
//!
//! The engine reaches module metadata only through [`Repository`]. Methods
//! return boxed futures so implementations can be stored as
//! `Arc<dyn Repository>` and queried concurrently.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::identifier::ModuleIdentifier;
use crate::rule::{Rule, RuleOutcome};
use crate::spec::{ModuleSpecification, SpecificationError};
use crate::BoxFuture;

/// Errors raised by repositories.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("I/O error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid metadata in {}: {reason}", .path.display())]
    InvalidMetadata { path: PathBuf, reason: String },

    #[error("Invalid dependency in {}: {source}", .path.display())]
    InvalidDependency {
        path: PathBuf,
        #[source]
        source: SpecificationError,
    },

    #[error("Module {identifier} is not offered by repository '{repository}'")]
    UnknownModule { repository: String, identifier: String },

    #[error("Invalid artifact {}: {reason}", .path.display())]
    InvalidArtifact { path: PathBuf, reason: String },

    #[error("Repository task failed: {0}")]
    Task(String),
}

impl RepositoryError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// How the local file name of an artifact is derived.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactName {
    /// `name.<ext>` in the layout.
    Extension(String),
    /// A fixed file name.
    FileName(String),
}

/// One downloadable file of a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactSource {
    /// URL or local path the file is fetched from.
    pub locator: String,
    pub name: ArtifactName,
    /// Volatile files are installed once and may be edited by the user.
    pub volatile: bool,
}

/// A source of module metadata and artifacts.
pub trait Repository: Send + Sync {
    /// Unique repository name.
    fn name(&self) -> &str;

    /// Platform this repository belongs to.
    fn platform(&self) -> &str;

    /// All identifiers offered by this repository that satisfy
    /// `specification`.
    fn find_candidates<'a>(
        &'a self,
        specification: &'a ModuleSpecification,
    ) -> BoxFuture<'a, Result<Vec<ModuleIdentifier>, RepositoryError>>;

    /// Dependencies declared by `identifier`.
    fn fetch_dependencies<'a>(
        &'a self,
        identifier: &'a ModuleIdentifier,
    ) -> BoxFuture<'a, Result<Vec<ModuleSpecification>, RepositoryError>>;

    /// Files to install for `identifier`.
    fn artifacts<'a>(
        &'a self,
        identifier: &'a ModuleIdentifier,
    ) -> BoxFuture<'a, Result<Vec<ArtifactSource>, RepositoryError>>;

    /// Apply `rule` to the module requested by `specification`.
    fn apply_rule(&self, _specification: &ModuleSpecification, _rule: &Rule) -> RuleOutcome {
        RuleOutcome::Unsupported
    }

    /// Check a downloaded artifact. The default accepts everything.
    fn validate<'a>(
        &'a self,
        _identifier: &'a ModuleIdentifier,
        _source: &'a ArtifactSource,
        _file: &'a Path,
    ) -> BoxFuture<'a, Result<(), RepositoryError>> {
        Box::pin(async { Ok(()) })
    }
}
