//! Where installed artifacts land on disk.

use std::path::{Path, PathBuf};

use crate::identifier::ModuleIdentifier;
use crate::repository::ArtifactName;

/// Maps identifiers to paths below an install root.
///
/// Hierarchical layout: `root/owner/name/version/name.ext`.
/// Flat layout: `root/owner_name_version.ext`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
    flat: bool,
}

impl ArtifactLayout {
    pub fn hierarchical(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            flat: false,
        }
    }

    pub fn flat(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            flat: true,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_flat(&self) -> bool {
        self.flat
    }

    pub fn path_for(&self, identifier: &ModuleIdentifier, name: &ArtifactName) -> PathBuf {
        let (owner, module, version) = (identifier.owner(), identifier.name(), identifier.version());

        if self.flat {
            let stem = format!("{owner}_{module}_{version}");
            let file = match name {
                ArtifactName::Extension(ext) => with_extension(stem, ext),
                ArtifactName::FileName(file) => format!("{stem}_{file}"),
            };
            return self.root.join(file);
        }

        let file = match name {
            ArtifactName::Extension(ext) => with_extension(module.to_string(), ext),
            ArtifactName::FileName(file) => file.clone(),
        };
        self.root.join(owner).join(module).join(version).join(file)
    }
}

fn with_extension(stem: String, ext: &str) -> String {
    let ext = ext.trim_start_matches('.');
    if ext.is_empty() {
        stem
    } else {
        format!("{stem}.{ext}")
    }
}
