//! Repository platforms.
//!
//! A platform knows how to build repositories of one kind from a
//! [`RepositoryConfig`]. Platforms are registered by name in a
//! [`PlatformRegistry`]; the built-in `local` platform is always available
//! and external code may register more.

mod local;

pub use local::{LocalPlatform, LocalRepository, LOCAL_PLATFORM, METADATA_FILE};

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RepositoryConfig;
use crate::notify::Notifier;
use crate::repository::Repository;
use crate::version;

/// Errors building repositories.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("repository '{repository}' uses unknown platform '{platform}'")]
    UnknownPlatform { repository: String, platform: String },

    #[error("repository '{repository}' is missing setting '{key}'")]
    MissingSetting { repository: String, key: String },

    #[error("repository '{repository}' has invalid setting '{key}': {reason}")]
    InvalidSetting {
        repository: String,
        key: String,
        reason: String,
    },
}

/// Builds repositories of one platform.
pub trait PlatformFactory: Send + Sync {
    /// Platform name referenced by `platform =` in repository sections.
    fn name(&self) -> &str;

    fn create(&self, config: &RepositoryConfig) -> Result<Arc<dyn Repository>, PlatformError>;

    /// Version order used by this platform.
    fn compare_versions(&self, a: &str, b: &str) -> Ordering {
        version::compare(a, b)
    }
}

/// Platform factories by name.
pub struct PlatformRegistry {
    factories: BTreeMap<String, Arc<dyn PlatformFactory>>,
}

impl PlatformRegistry {
    /// A registry without any platform.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry holding the built-in platforms.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(LocalPlatform));
        registry
    }

    /// Register `factory`, replacing any platform of the same name.
    pub fn register(&mut self, factory: Arc<dyn PlatformFactory>) {
        let name = factory.name().to_string();
        if self.factories.insert(name.clone(), factory).is_some() {
            warn!(platform = %name, "Replaced platform");
        }
    }

    pub fn get(&self, platform: &str) -> Option<&Arc<dyn PlatformFactory>> {
        self.factories.get(platform)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build the repository described by `config`.
    pub fn create_repository(&self, config: &RepositoryConfig) -> Result<Arc<dyn Repository>, PlatformError> {
        let factory = self.get(&config.platform).ok_or_else(|| PlatformError::UnknownPlatform {
            repository: config.name.clone(),
            platform: config.platform.clone(),
        })?;
        let repository = factory.create(config)?;
        debug!(repository = %config.name, platform = %config.platform, "Created repository");
        Ok(repository)
    }

    /// Build every repository in `configs`, keeping their order. Failures are
    /// reported through `notifier` and skipped.
    pub fn create_all(&self, configs: &[RepositoryConfig], notifier: &dyn Notifier) -> Vec<Arc<dyn Repository>> {
        configs
            .iter()
            .filter_map(|config| match self.create_repository(config) {
                Ok(repository) => Some(repository),
                Err(e) => {
                    notifier.error(&format!("Skipping repository: {e}"));
                    None
                }
            })
            .collect()
    }
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
