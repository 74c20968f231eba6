//! Repository definitions.

use std::collections::BTreeMap;

/// One `[repository.<name>]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    pub name: String,

    /// Name of the platform that builds this repository.
    pub platform: String,

    /// Lower values are consulted first.
    pub priority: i64,

    /// Platform-specific settings, e.g. `root` for the local platform.
    pub settings: BTreeMap<String, String>,
}

impl RepositoryConfig {
    pub fn new(name: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            platform: platform.into(),
            priority: 0,
            settings: BTreeMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }
}

/// Sort by priority, then name.
pub(crate) fn sort_by_priority(repositories: &mut [RepositoryConfig]) {
    repositories.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
}
