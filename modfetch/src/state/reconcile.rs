//! Reconcile the previous installation with the current one.
//!
//! Artifacts recorded in the previous state but not installed by this run are
//! redundant. Redundant non-volatile files are deleted. Redundant volatile
//! files are deleted only while their content still matches the digest
//! recorded at installation; modified ones are retained and reported.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::artifact::{normalize, Artifact};
use super::State;
use crate::checksum;

/// What reconciliation did with redundant artifacts.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub deleted: Vec<PathBuf>,
    /// Modified volatile files left in place.
    pub retained: Vec<PathBuf>,
    /// Redundant files that were already gone.
    pub missing: Vec<PathBuf>,
    /// Files that could not be deleted, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

impl Reconciliation {
    pub fn is_clean(&self) -> bool {
        self.retained.is_empty() && self.failed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    root: PathBuf,
}

impl Reconciler {
    /// `root` bounds directory pruning; it is never removed itself.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: normalize(root.as_ref()),
        }
    }

    /// Remove redundant artifacts from disk and from `state`, then record
    /// every artifact in `current`.
    pub fn reconcile(&self, state: &mut State, current: &[Artifact]) -> Reconciliation {
        let redundant: Vec<Artifact> = state
            .artifacts()
            .filter(|previous| !current.contains(previous))
            .cloned()
            .collect();

        let mut outcome = Reconciliation::default();
        for artifact in redundant {
            let file = artifact.file().to_path_buf();

            if !file.exists() {
                debug!(file = %file.display(), "Redundant artifact already removed");
                state.remove(&file);
                outcome.missing.push(file);
                continue;
            }

            if artifact.volatile && !self.unmodified(&artifact) {
                warn!(file = %file.display(), "Keeping modified file");
                outcome.retained.push(file);
                continue;
            }

            match fs::remove_file(&file) {
                Ok(()) => {
                    info!(file = %file.display(), "Deleted redundant artifact");
                    self.prune_empty_parents(&file);
                    state.remove(&file);
                    outcome.deleted.push(file);
                }
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "Failed to delete redundant artifact");
                    outcome.failed.push((file, e.to_string()));
                }
            }
        }

        for artifact in current {
            state.insert(artifact.clone());
        }

        outcome
    }

    fn unmodified(&self, artifact: &Artifact) -> bool {
        let Some(recorded) = &artifact.digest else {
            return false;
        };
        match checksum::file_digest(artifact.file()) {
            Ok(actual) => actual == *recorded,
            Err(e) => {
                warn!(file = %artifact.file().display(), error = %e, "Failed to read file");
                false
            }
        }
    }

    /// Remove now-empty directories from the file's parent up to, but not
    /// including, the root.
    fn prune_empty_parents(&self, file: &Path) {
        let mut dir = file.parent();
        while let Some(current) = dir {
            if current == self.root || !current.starts_with(&self.root) {
                break;
            }
            let empty = fs::read_dir(current)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !empty || fs::remove_dir(current).is_err() {
                break;
            }
            debug!(dir = %current.display(), "Removed empty directory");
            dir = current.parent();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn volatile(path: &Path, contents: &str) -> Artifact {
        write(path, contents);
        Artifact::new(path, "src", true).with_digest(checksum::bytes_digest(contents.as_bytes()))
    }

    #[test]
    fn test_unmodified_volatile_is_deleted() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("lib");
        let a = root.join("org/a/1.0/a.jar");
        let b = root.join("org/b/1.0/b.conf");
        write(&a, "a");

        let mut state = State::empty(temp.path().join("state"));
        state.insert(Artifact::new(&a, "src-a", false));
        state.insert(volatile(&b, "setting=1"));

        let current = vec![Artifact::new(&a, "src-a", false)];
        let outcome = Reconciler::new(&root).reconcile(&mut state, &current);

        assert_eq!(outcome.deleted, vec![normalize(&b)]);
        assert!(outcome.retained.is_empty());
        assert!(!b.exists());
        assert!(!root.join("org/b").exists());
        assert!(root.join("org").exists());
        assert!(a.exists());
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_modified_volatile_is_retained() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("lib");
        let b = root.join("b.conf");

        let mut state = State::empty(temp.path().join("state"));
        state.insert(volatile(&b, "setting=1"));
        fs::write(&b, "setting=2").unwrap();

        let outcome = Reconciler::new(&root).reconcile(&mut state, &[]);

        assert_eq!(outcome.retained, vec![normalize(&b)]);
        assert!(!outcome.is_clean());
        assert!(b.exists());
        assert!(state.get(&b).is_some());
    }

    #[test]
    fn test_missing_redundant_is_dropped() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("lib");
        let gone = root.join("gone.jar");

        let mut state = State::empty(temp.path().join("state"));
        state.insert(Artifact::new(&gone, "src", false));

        let outcome = Reconciler::new(&root).reconcile(&mut state, &[]);

        assert_eq!(outcome.missing, vec![normalize(&gone)]);
        assert!(state.is_empty());
        assert!(state.is_changed());
    }

    #[test]
    fn test_pruning_stops_at_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("lib");
        let a = root.join("deep/er/a.jar");
        write(&a, "a");

        let mut state = State::empty(temp.path().join("state"));
        state.insert(Artifact::new(&a, "src", false));

        Reconciler::new(&root).reconcile(&mut state, &[]);

        assert!(!root.join("deep").exists());
        assert!(root.exists());
    }

    #[test]
    fn test_current_artifacts_are_recorded() {
        let temp = TempDir::new().unwrap();
        let mut state = State::empty(temp.path().join("state"));
        let current = vec![Artifact::new(temp.path().join("lib/new.jar"), "src", false)];

        let outcome = Reconciler::new(temp.path().join("lib")).reconcile(&mut state, &current);

        assert_eq!(outcome, Reconciliation::default());
        assert_eq!(state.len(), 1);
        assert!(state.is_changed());
    }
}
