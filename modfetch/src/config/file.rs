//! INI configuration file parsing.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, ParseOption, Properties};
use tracing::{debug, warn};

use super::engine::EngineConfig;
use super::repository::{sort_by_priority, RepositoryConfig};
use super::{config_file_path, ConfigError};
use crate::download::DownloadConfig;
use crate::logging::{parse_level, LoggingConfig};
use crate::rule::Rule;
use crate::spec::ModuleSpecification;

const REPOSITORY_PREFIX: &str = "repository.";

/// Typed contents of the configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub engine: EngineConfig,
    pub download: DownloadConfig,
    pub logging: LoggingConfig,
    /// Repositories in priority order.
    pub repositories: Vec<RepositoryConfig>,
    /// Explicit modules to install.
    pub modules: Vec<ModuleSpecification>,
    pub rules: Vec<Rule>,
}

impl ConfigFile {
    /// Load configuration from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = Self::parse_str(&contents)?;
        debug!(
            path = %path.display(),
            repositories = config.repositories.len(),
            modules = config.modules.len(),
            rules = config.rules.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Load the default configuration file, or defaults if it does not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = config_file_path();
        if path.exists() {
            Self::load(&path)
        } else {
            debug!(path = %path.display(), "No configuration file, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse configuration from INI text.
    pub fn parse_str(contents: &str) -> Result<Self, ConfigError> {
        let options = ParseOption {
            enabled_escape: false,
            enabled_quote: false,
            ..Default::default()
        };
        let ini = Ini::load_from_str_opt(contents, options).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;

        let mut config = Self::default();
        for (section, properties) in ini.iter() {
            match section {
                None => {
                    for (key, _) in properties.iter() {
                        warn!(key, "Ignoring key outside of any section");
                    }
                }
                Some("engine") => config.engine = parse_engine(properties, config.engine)?,
                Some("download") => config.download = parse_download(properties, config.download)?,
                Some("logging") => config.logging = parse_logging(properties, config.logging)?,
                Some("modules") => {
                    for value in values_of(properties, "modules", "module") {
                        config.modules.push(parse_value("modules", "module", value)?);
                    }
                }
                Some("rules") => {
                    for value in values_of(properties, "rules", "rule") {
                        config.rules.push(parse_value("rules", "rule", value)?);
                    }
                }
                Some(name) => match name.strip_prefix(REPOSITORY_PREFIX) {
                    Some(repository) if !repository.is_empty() => {
                        if config.repositories.iter().any(|r| r.name == repository) {
                            return Err(ConfigError::DuplicateRepository(repository.to_string()));
                        }
                        config
                            .repositories
                            .push(parse_repository(name, repository, properties)?);
                    }
                    _ => warn!(section = name, "Ignoring unknown section"),
                },
            }
        }

        sort_by_priority(&mut config.repositories);
        Ok(config)
    }
}

/// Values of the repeated `key` in a list section; other keys are ignored.
fn values_of<'a>(properties: &'a Properties, section: &'a str, key: &'a str) -> impl Iterator<Item = &'a str> {
    properties.iter().filter_map(move |(k, v)| {
        if k == key {
            Some(v)
        } else {
            warn!(section, key = k, "Ignoring unknown key");
            None
        }
    })
}

fn parse_engine(properties: &Properties, mut engine: EngineConfig) -> Result<EngineConfig, ConfigError> {
    const SECTION: &str = "engine";
    for (key, value) in properties.iter() {
        engine = match key {
            "identification_workers" => engine.with_identification_workers(parse_value(SECTION, key, value)?),
            "recursive" => engine.with_recursive(parse_bool(SECTION, key, value)?),
            "conflict_policy" => engine.with_conflict_policy(parse_value(SECTION, key, value)?),
            "install_dir" => EngineConfig {
                install_dir: parse_path(SECTION, key, value)?,
                ..engine
            },
            "flat_layout" => engine.with_flat_layout(parse_bool(SECTION, key, value)?),
            "state_file" => engine.with_state_file(parse_path(SECTION, key, value)?),
            _ => {
                warn!(section = SECTION, key, "Ignoring unknown key");
                engine
            }
        };
    }
    Ok(engine)
}

fn parse_download(properties: &Properties, mut download: DownloadConfig) -> Result<DownloadConfig, ConfigError> {
    const SECTION: &str = "download";
    for (key, value) in properties.iter() {
        download = match key {
            "threads_per_host" => download.with_threads_per_host(parse_value(SECTION, key, value)?),
            "chunk_count" => download.with_chunk_count(parse_value(SECTION, key, value)?),
            "min_chunk_size" => download.with_min_chunk_size(parse_value(SECTION, key, value)?),
            "timeout_secs" => download.with_timeout(Duration::from_secs(parse_value(SECTION, key, value)?)),
            "chunk_delay_ms" => download.with_chunk_delay(Duration::from_millis(parse_value(SECTION, key, value)?)),
            "startup_delay_ms" => {
                download.with_startup_delay(Duration::from_millis(parse_value(SECTION, key, value)?))
            }
            _ => {
                warn!(section = SECTION, key, "Ignoring unknown key");
                download
            }
        };
    }
    Ok(download)
}

fn parse_logging(properties: &Properties, mut logging: LoggingConfig) -> Result<LoggingConfig, ConfigError> {
    const SECTION: &str = "logging";
    for (key, value) in properties.iter() {
        logging = match key {
            "level" => {
                parse_level(value).map_err(|_| ConfigError::invalid(SECTION, key, value))?;
                logging.with_level(value.trim())
            }
            "file" => logging.with_file(parse_path(SECTION, key, value)?),
            _ => {
                warn!(section = SECTION, key, "Ignoring unknown key");
                logging
            }
        };
    }
    Ok(logging)
}

fn parse_repository(section: &str, name: &str, properties: &Properties) -> Result<RepositoryConfig, ConfigError> {
    let platform = properties
        .get("platform")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ConfigError::MissingKey {
            section: section.to_string(),
            key: "platform".to_string(),
        })?;

    let mut repository = RepositoryConfig::new(name, platform);
    for (key, value) in properties.iter() {
        match key {
            "platform" => {}
            "priority" => repository.priority = parse_value(section, key, value)?,
            _ => repository = repository.with_setting(key, value.trim()),
        }
    }
    Ok(repository)
}

fn parse_value<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::invalid(section, key, value))
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::invalid(section, key, value)),
    }
}

fn parse_path(section: &str, key: &str, value: &str) -> Result<PathBuf, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::invalid(section, key, value));
    }
    Ok(PathBuf::from(value))
}
