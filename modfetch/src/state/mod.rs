//! Persisted installation state.
//!
//! The state file records which artifacts a previous run installed and which
//! explicit modules produced them. It is a flat, sorted key-value file:
//!
//! ```text
//! # modfetch 0.3.0 state, written 2026-01-01T00:00:00+00:00
//! artifact.0.digest=9f86d081...
//! artifact.0.file=/home/user/project/lib/settings.conf
//! artifact.0.source=/srv/modules/org/app/1.0/settings.conf
//! artifact.0.volatile=true
//! module.0.identifier=org:app:1.0
//! module.0.specification=org:app:[1.0,)
//! ```
//!
//! A missing file is an empty state. Records missing a required field are
//! skipped with a warning.

mod artifact;
mod reconcile;

pub use artifact::{normalize, Artifact};
pub use reconcile::{Reconciler, Reconciliation};

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ini::{EscapePolicy, Ini, ParseOption, WriteOption};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors reading or writing the state file.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read state file {}: {source}", .path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    #[error("failed to parse state file {}: {reason}", .path.display())]
    ParseFailed { path: PathBuf, reason: String },

    #[error("failed to write state file {}: {source}", .path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    #[error("failed to delete state file {}: {source}", .path.display())]
    DeleteFailed { path: PathBuf, source: io::Error },
}

/// An explicit module recorded in the state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleRecord {
    pub specification: String,
    pub identifier: String,
}

/// In-memory view of the state file.
#[derive(Debug)]
pub struct State {
    path: PathBuf,
    artifacts: BTreeMap<PathBuf, Artifact>,
    modules: Vec<ModuleRecord>,
    changed: bool,
}

fn parse_option() -> ParseOption {
    ParseOption {
        enabled_escape: false,
        enabled_quote: false,
        ..Default::default()
    }
}

impl State {
    /// An empty state that will be written to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            artifacts: BTreeMap::new(),
            modules: Vec::new(),
            changed: false,
        }
    }

    /// Load the state file at `path`. A missing file yields an empty state.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let path = path.into();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No state file, starting empty");
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(StateError::ReadFailed { path, source: e }),
        };

        let ini = Ini::load_from_str_opt(&contents, parse_option()).map_err(|e| StateError::ParseFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let mut records: BTreeMap<(String, u64), BTreeMap<String, String>> = BTreeMap::new();
        let general = ini.section(None::<String>).into_iter().flat_map(|section| section.iter());
        for (key, value) in general {
            let mut parts = key.splitn(3, '.');
            let (Some(prefix), Some(index), Some(field)) = (parts.next(), parts.next(), parts.next()) else {
                warn!(key, "Skipping malformed state key");
                continue;
            };
            let Ok(index) = index.parse::<u64>() else {
                warn!(key, "Skipping malformed state key");
                continue;
            };
            records
                .entry((prefix.to_string(), index))
                .or_default()
                .insert(field.to_string(), value.to_string());
        }

        let mut state = Self::empty(path);
        for ((prefix, index), fields) in records {
            match prefix.as_str() {
                "artifact" => match artifact_from_fields(&fields) {
                    Some(artifact) => {
                        state.artifacts.insert(artifact.file().to_path_buf(), artifact);
                    }
                    None => warn!(index, "Skipping incomplete artifact record"),
                },
                "module" => match (fields.get("specification"), fields.get("identifier")) {
                    (Some(specification), Some(identifier)) => state.modules.push(ModuleRecord {
                        specification: specification.clone(),
                        identifier: identifier.clone(),
                    }),
                    _ => warn!(index, "Skipping incomplete module record"),
                },
                other => warn!(prefix = other, index, "Skipping unknown state record"),
            }
        }

        debug!(
            path = %state.path.display(),
            artifacts = state.artifacts.len(),
            modules = state.modules.len(),
            "Loaded state"
        );
        Ok(state)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn get(&self, file: &Path) -> Option<&Artifact> {
        self.artifacts.get(&normalize(file))
    }

    pub fn modules(&self) -> &[ModuleRecord] {
        &self.modules
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Record `artifact`, replacing any record for the same file.
    pub fn insert(&mut self, artifact: Artifact) {
        let unchanged = self
            .artifacts
            .get(artifact.file())
            .is_some_and(|existing| existing.same_record(&artifact));
        if !unchanged {
            self.artifacts.insert(artifact.file().to_path_buf(), artifact);
            self.changed = true;
        }
    }

    pub fn remove(&mut self, file: &Path) -> Option<Artifact> {
        let removed = self.artifacts.remove(&normalize(file));
        if removed.is_some() {
            self.changed = true;
        }
        removed
    }

    /// Replace the explicit module records.
    pub fn set_modules(&mut self, modules: Vec<ModuleRecord>) {
        if self.modules != modules {
            self.modules = modules;
            self.changed = true;
        }
    }

    /// Serialize the state in its file format.
    pub fn to_file_contents(&self) -> String {
        let mut entries: BTreeMap<String, String> = BTreeMap::new();
        for (index, artifact) in self.artifacts.values().enumerate() {
            entries.insert(format!("artifact.{index}.file"), artifact.file().display().to_string());
            entries.insert(format!("artifact.{index}.source"), artifact.source.clone());
            entries.insert(format!("artifact.{index}.volatile"), artifact.volatile.to_string());
            if let Some(digest) = &artifact.digest {
                entries.insert(format!("artifact.{index}.digest"), digest.clone());
            }
        }
        for (index, module) in self.modules.iter().enumerate() {
            entries.insert(format!("module.{index}.specification"), module.specification.clone());
            entries.insert(format!("module.{index}.identifier"), module.identifier.clone());
        }

        let mut ini = Ini::new();
        for (key, value) in entries {
            ini.with_general_section().set(key, value);
        }

        let mut body = Vec::new();
        let option = WriteOption {
            escape_policy: EscapePolicy::Nothing,
            ..Default::default()
        };
        // Writing into a Vec cannot fail.
        let _ = ini.write_to_opt(&mut body, option);

        format!(
            "# modfetch {} state, written {}\n{}",
            crate::VERSION,
            chrono::Local::now().to_rfc3339(),
            String::from_utf8_lossy(&body)
        )
    }

    /// Write the state file unconditionally.
    pub fn save(&self) -> Result<(), StateError> {
        let write_failed = |e| StateError::WriteFailed {
            path: self.path.clone(),
            source: e,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }

        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);
        fs::write(&temp, self.to_file_contents()).map_err(write_failed)?;
        fs::rename(&temp, &self.path).map_err(write_failed)?;

        info!(path = %self.path.display(), artifacts = self.artifacts.len(), "State saved");
        Ok(())
    }

    /// Write the state file only if it changed since loading. Returns
    /// whether it was written.
    pub fn save_if_changed(&mut self) -> Result<bool, StateError> {
        if !self.changed {
            debug!(path = %self.path.display(), "State unchanged, not writing");
            return Ok(false);
        }
        self.save()?;
        self.changed = false;
        Ok(true)
    }

    /// Delete the state file so the next run starts clean.
    pub fn discard(&mut self) -> Result<(), StateError> {
        self.artifacts.clear();
        self.modules.clear();
        self.changed = false;
        match fs::remove_file(&self.path) {
            Ok(()) => {
                warn!(path = %self.path.display(), "State discarded");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateError::DeleteFailed {
                path: self.path.clone(),
                source: e,
            }),
        }
    }
}

fn artifact_from_fields(fields: &BTreeMap<String, String>) -> Option<Artifact> {
    let file = fields.get("file")?;
    let source = fields.get("source")?;
    let volatile = match fields.get("volatile").map(String::as_str) {
        None | Some("false") => false,
        Some("true") => true,
        Some(_) => return None,
    };
    let mut artifact = Artifact::new(file, source.clone(), volatile);
    artifact.digest = fields.get("digest").cloned();
    Some(artifact)
}
