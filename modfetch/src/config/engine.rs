//! Engine settings.

use std::path::{Path, PathBuf};

use crate::conflict::ConflictPolicy;

/// Default number of concurrent identification tasks.
pub const DEFAULT_IDENTIFICATION_WORKERS: usize = 8;

/// Default install directory.
pub const DEFAULT_INSTALL_DIR: &str = "./lib";

/// State file name used when none is configured.
pub const DEFAULT_STATE_FILE_NAME: &str = ".modfetch-state";

/// Settings for identification, conflict resolution and installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Concurrent identification tasks.
    pub identification_workers: usize,

    /// Whether dependencies are identified recursively.
    pub recursive: bool,

    pub conflict_policy: ConflictPolicy,

    /// Root directory artifacts are installed into.
    pub install_dir: PathBuf,

    /// Use the flat `owner_name_version.ext` layout.
    pub flat_layout: bool,

    /// State file path. Defaults to `.modfetch-state` inside the install
    /// directory.
    pub state_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            identification_workers: DEFAULT_IDENTIFICATION_WORKERS,
            recursive: true,
            conflict_policy: ConflictPolicy::default(),
            install_dir: PathBuf::from(DEFAULT_INSTALL_DIR),
            flat_layout: false,
            state_file: None,
        }
    }
}

impl EngineConfig {
    /// Create a configuration installing into `install_dir`.
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_identification_workers(mut self, workers: usize) -> Self {
        self.identification_workers = workers.max(1);
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    pub fn with_flat_layout(mut self, flat: bool) -> Self {
        self.flat_layout = flat;
        self
    }

    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = Some(path.into());
        self
    }

    /// Effective state file path.
    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| self.install_dir.join(DEFAULT_STATE_FILE_NAME))
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }
}
