//! Shared setup for CLI commands.

use std::path::Path;
use std::sync::Arc;

use modfetch::config::ConfigFile;
use modfetch::installer::Installer;
use modfetch::logging::{init_logging, WorkerGuard};
use modfetch::notify::TracingNotifier;
use modfetch::platform::PlatformRegistry;
use modfetch::spec::ModuleSpecification;
use tracing::info;

use crate::error::CliError;

/// Loaded configuration and logging for one command.
pub struct CliRunner {
    config: ConfigFile,
    _log_guard: Option<WorkerGuard>,
}

impl CliRunner {
    /// Load configuration from `config_path`, or the default location, and
    /// initialize logging.
    pub fn new(config_path: Option<&Path>, verbose: bool) -> Result<Self, CliError> {
        let config = match config_path {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::load_default()?,
        };
        let log_guard = init_logging(&config.logging, verbose)?;
        Ok(Self {
            config,
            _log_guard: log_guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn log_startup(&self, command: &str) {
        info!(
            version = modfetch::VERSION,
            command,
            repositories = self.config.repositories.len(),
            install_dir = %self.config.engine.install_dir.display(),
            "modfetch starting"
        );
    }

    /// Specifications from the command line, or from `[modules]` when none
    /// were given.
    pub fn specifications(&self, args: &[String]) -> Result<Vec<ModuleSpecification>, CliError> {
        let specifications = if args.is_empty() {
            self.config.modules.clone()
        } else {
            args.iter()
                .map(|arg| arg.parse::<ModuleSpecification>())
                .collect::<Result<Vec<_>, _>>()?
        };
        if specifications.is_empty() {
            return Err(CliError::NoModules);
        }
        Ok(specifications)
    }

    pub fn installer(&self) -> Installer {
        Installer::from_config(&self.config, &PlatformRegistry::with_builtins(), Arc::new(TracingNotifier))
    }
}
