//! Installed artifact records.

use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

/// A file installed from a source locator.
///
/// Equality and hashing consider only the normalized file path.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    file: PathBuf,
    pub source: String,
    pub volatile: bool,
    /// SHA-256 of the file as installed, recorded for volatile artifacts.
    pub digest: Option<String>,
}

impl Artifact {
    pub fn new(file: impl AsRef<Path>, source: impl Into<String>, volatile: bool) -> Self {
        Self {
            file: normalize(file.as_ref()),
            source: source.into(),
            volatile,
            digest: None,
        }
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    /// Absolute, lexically normalized path of the installed file.
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Returns true if every recorded field matches `other`.
    pub fn same_record(&self, other: &Artifact) -> bool {
        self.file == other.file
            && self.source == other.source
            && self.volatile == other.volatile
            && self.digest == other.digest
    }
}

impl PartialEq for Artifact {
    fn eq(&self, other: &Self) -> bool {
        self.file == other.file
    }
}

impl Eq for Artifact {}

impl Hash for Artifact {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.file.hash(state);
    }
}

/// Make `path` absolute against the working directory and resolve `.` and
/// `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
