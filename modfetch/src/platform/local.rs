//! Repositories backed by a local directory tree.
//!
//! Layout: `<root>/<owner>/<name>/<version>/`. Every regular file in a
//! version directory is an artifact, except the optional `module.ini`
//! metadata file and `*.sha256` checksum files:
//!
//! ```ini
//! [dependencies]
//! module = org.example:core:[1.0,2.0)
//! module = org.example:util
//!
//! [artifacts]
//! volatile = settings.conf
//! ```
//!
//! A `<file>.sha256` next to an artifact is used to validate the installed
//! copy.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ini::{Ini, ParseOption};
use tracing::{debug, trace};

use super::{PlatformError, PlatformFactory};
use crate::checksum;
use crate::config::RepositoryConfig;
use crate::identifier::ModuleIdentifier;
use crate::repository::{ArtifactName, ArtifactSource, Repository, RepositoryError};
use crate::rule::{apply_standard_rule, Rule, RuleOutcome};
use crate::spec::ModuleSpecification;
use crate::state::normalize;
use crate::BoxFuture;

/// Name of the built-in local platform.
pub const LOCAL_PLATFORM: &str = "local";

/// Per-version metadata file.
pub const METADATA_FILE: &str = "module.ini";

const CHECKSUM_EXTENSION: &str = "sha256";

/// Builds [`LocalRepository`] instances from a `root` setting.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalPlatform;

impl PlatformFactory for LocalPlatform {
    fn name(&self) -> &str {
        LOCAL_PLATFORM
    }

    fn create(&self, config: &RepositoryConfig) -> Result<Arc<dyn Repository>, PlatformError> {
        let root = config.setting("root").ok_or_else(|| PlatformError::MissingSetting {
            repository: config.name.clone(),
            key: "root".to_string(),
        })?;
        if root.is_empty() {
            return Err(PlatformError::InvalidSetting {
                repository: config.name.clone(),
                key: "root".to_string(),
                reason: "empty path".to_string(),
            });
        }
        Ok(Arc::new(LocalRepository::new(&config.name, root)))
    }
}

/// A repository reading modules from a directory tree.
#[derive(Debug, Clone)]
pub struct LocalRepository {
    name: String,
    root: PathBuf,
}

#[derive(Debug, Default)]
struct ModuleMetadata {
    dependencies: Vec<ModuleSpecification>,
    volatile: Vec<String>,
}

impl LocalRepository {
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            root: normalize(root.as_ref()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn module_dir(&self, identifier: &ModuleIdentifier) -> PathBuf {
        self.root
            .join(identifier.owner())
            .join(identifier.name())
            .join(identifier.version())
    }

    /// Run blocking filesystem work off the async workers.
    async fn blocking<T, F>(&self, work: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(LocalRepository) -> Result<T, RepositoryError> + Send + 'static,
    {
        let repository = self.clone();
        tokio::task::spawn_blocking(move || work(repository))
            .await
            .map_err(|e| RepositoryError::Task(e.to_string()))?
    }

    fn scan_candidates(&self, specification: &ModuleSpecification) -> Result<Vec<ModuleIdentifier>, RepositoryError> {
        if let Some((owner, name, version)) = specification.trivial_target() {
            let identifier = self.identifier(&owner, &name, version);
            let found = self.module_dir(&identifier).is_dir() && specification.is_satisfied_by(&identifier);
            trace!(repository = %self.name, module = %identifier, found, "Probed module directory");
            return Ok(if found { vec![identifier] } else { Vec::new() });
        }

        let mut candidates = Vec::new();
        for owner in subdirectories(&self.root)? {
            for name in subdirectories(&self.root.join(&owner))? {
                for version in subdirectories(&self.root.join(&owner).join(&name))? {
                    let identifier = self.identifier(&owner, &name, &version);
                    if specification.is_satisfied_by(&identifier) {
                        candidates.push(identifier);
                    }
                }
            }
        }
        debug!(
            repository = %self.name,
            specification = %specification,
            candidates = candidates.len(),
            "Scanned repository"
        );
        Ok(candidates)
    }

    fn identifier(&self, owner: &str, name: &str, version: &str) -> ModuleIdentifier {
        ModuleIdentifier::new(LOCAL_PLATFORM, &self.name, owner, name, version)
    }

    fn existing_module_dir(&self, identifier: &ModuleIdentifier) -> Result<PathBuf, RepositoryError> {
        let dir = self.module_dir(identifier);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(RepositoryError::UnknownModule {
                repository: self.name.clone(),
                identifier: identifier.to_string(),
            })
        }
    }

    fn metadata(&self, dir: &Path) -> Result<ModuleMetadata, RepositoryError> {
        let path = dir.join(METADATA_FILE);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ModuleMetadata::default()),
            Err(e) => return Err(RepositoryError::io(&path, e)),
        };
        parse_metadata(&path, &contents)
    }

    fn list_artifacts(&self, identifier: &ModuleIdentifier) -> Result<Vec<ArtifactSource>, RepositoryError> {
        let dir = self.existing_module_dir(identifier)?;
        let metadata = self.metadata(&dir)?;

        let mut files = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| RepositoryError::io(&dir, e))? {
            let entry = entry.map_err(|e| RepositoryError::io(&dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
                continue;
            };
            if file_name == METADATA_FILE || is_checksum_file(&path) {
                continue;
            }
            files.push((file_name, path));
        }
        files.sort();

        Ok(files
            .into_iter()
            .map(|(file_name, path)| ArtifactSource {
                locator: path.display().to_string(),
                volatile: metadata.volatile.contains(&file_name),
                name: artifact_name(identifier.name(), &file_name),
            })
            .collect())
    }
}

impl Repository for LocalRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> &str {
        LOCAL_PLATFORM
    }

    fn find_candidates<'a>(
        &'a self,
        specification: &'a ModuleSpecification,
    ) -> BoxFuture<'a, Result<Vec<ModuleIdentifier>, RepositoryError>> {
        let specification = specification.clone();
        Box::pin(self.blocking(move |repository| repository.scan_candidates(&specification)))
    }

    fn fetch_dependencies<'a>(
        &'a self,
        identifier: &'a ModuleIdentifier,
    ) -> BoxFuture<'a, Result<Vec<ModuleSpecification>, RepositoryError>> {
        let identifier = identifier.clone();
        Box::pin(self.blocking(move |repository| {
            let dir = repository.existing_module_dir(&identifier)?;
            Ok(repository.metadata(&dir)?.dependencies)
        }))
    }

    fn artifacts<'a>(
        &'a self,
        identifier: &'a ModuleIdentifier,
    ) -> BoxFuture<'a, Result<Vec<ArtifactSource>, RepositoryError>> {
        let identifier = identifier.clone();
        Box::pin(self.blocking(move |repository| repository.list_artifacts(&identifier)))
    }

    fn apply_rule(&self, specification: &ModuleSpecification, rule: &Rule) -> RuleOutcome {
        apply_standard_rule(specification, rule)
    }

    fn validate<'a>(
        &'a self,
        _identifier: &'a ModuleIdentifier,
        source: &'a ArtifactSource,
        file: &'a Path,
    ) -> BoxFuture<'a, Result<(), RepositoryError>> {
        let checksum_path = PathBuf::from(format!("{}.{CHECKSUM_EXTENSION}", source.locator));
        let file = file.to_path_buf();
        Box::pin(self.blocking(move |_| validate_checksum(&checksum_path, &file)))
    }
}

fn parse_metadata(path: &Path, contents: &str) -> Result<ModuleMetadata, RepositoryError> {
    let options = ParseOption {
        enabled_escape: false,
        enabled_quote: false,
        ..Default::default()
    };
    let ini = Ini::load_from_str_opt(contents, options).map_err(|e| RepositoryError::InvalidMetadata {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut metadata = ModuleMetadata::default();
    if let Some(section) = ini.section(Some("dependencies")) {
        for value in section.get_all("module") {
            let specification = value.parse().map_err(|e| RepositoryError::InvalidDependency {
                path: path.to_path_buf(),
                source: e,
            })?;
            metadata.dependencies.push(specification);
        }
    }
    if let Some(section) = ini.section(Some("artifacts")) {
        metadata.volatile = section
            .get_all("volatile")
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect();
    }
    Ok(metadata)
}

fn validate_checksum(checksum_path: &Path, file: &Path) -> Result<(), RepositoryError> {
    let contents = match fs::read_to_string(checksum_path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(RepositoryError::io(checksum_path, e)),
    };
    let expected = checksum::parse_checksum_file(&contents).ok_or_else(|| RepositoryError::InvalidMetadata {
        path: checksum_path.to_path_buf(),
        reason: "empty checksum file".to_string(),
    })?;
    let actual = checksum::file_digest(file).map_err(|e| RepositoryError::io(file, e))?;

    if actual != expected {
        return Err(RepositoryError::InvalidArtifact {
            path: file.to_path_buf(),
            reason: format!("checksum mismatch: expected {expected}, got {actual}"),
        });
    }
    Ok(())
}

/// `name.ext` files map to the layout's extension form, everything else
/// keeps its file name.
fn artifact_name(module: &str, file_name: &str) -> ArtifactName {
    match Path::new(file_name).extension().and_then(|e| e.to_str()) {
        Some(ext) if file_name == format!("{module}.{ext}") => ArtifactName::Extension(ext.to_string()),
        _ => ArtifactName::FileName(file_name.to_string()),
    }
}

fn is_checksum_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(CHECKSUM_EXTENSION)
}

/// Names of the directories directly below `dir`, sorted.
fn subdirectories(dir: &Path) -> Result<Vec<String>, RepositoryError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| RepositoryError::io(dir, e))? {
        let entry = entry.map_err(|e| RepositoryError::io(dir, e))?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn module(root: &Path, owner: &str, name: &str, version: &str, files: &[(&str, &str)]) {
        let dir = root.join(owner).join(name).join(version);
        fs::create_dir_all(&dir).unwrap();
        for (file, contents) in files {
            fs::write(dir.join(file), contents).unwrap();
        }
    }

    fn fixture() -> (TempDir, LocalRepository) {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        module(root, "org", "app", "1.0", &[
            ("app.jar", "app-1.0"),
            ("settings.conf", "a=1"),
            (
                "module.ini",
                "[dependencies]\nmodule = org:lib:[1.0,2.0)\nmodule = org:util\n\n[artifacts]\nvolatile = settings.conf\n",
            ),
        ]);
        module(root, "org", "lib", "1.0", &[("lib.jar", "lib-1.0")]);
        module(root, "org", "lib", "1.5", &[("lib.jar", "lib-1.5")]);
        module(root, "org", "lib", "2.0", &[("lib.jar", "lib-2.0")]);
        module(root, "com", "lib", "1.0", &[]);
        let repository = LocalRepository::new("central", root);
        (temp, repository)
    }

    fn spec(text: &str) -> ModuleSpecification {
        text.parse().unwrap()
    }

    #[tokio::test]
    async fn test_find_candidates_by_range() {
        let (_temp, repository) = fixture();
        let mut found: Vec<String> = repository
            .find_candidates(&spec("org:lib:[1.0,2.0)"))
            .await
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        found.sort();
        assert_eq!(found, vec!["org:lib:1.0", "org:lib:1.5"]);
    }

    #[tokio::test]
    async fn test_find_candidates_by_glob() {
        let (_temp, repository) = fixture();
        let found = repository.find_candidates(&spec("*:lib:1.0")).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|id| id.repository() == "central"));
        assert!(found.iter().all(|id| id.platform() == LOCAL_PLATFORM));
    }

    #[tokio::test]
    async fn test_trivial_specification_probes_directory() {
        let (_temp, repository) = fixture();
        let found = repository.find_candidates(&spec("org:lib:1.5")).await.unwrap();
        assert_eq!(found.len(), 1);

        let missing = repository.find_candidates(&spec("org:lib:9.9")).await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let repository = LocalRepository::new("nowhere", "/nonexistent/modfetch/root");
        let result = repository.find_candidates(&spec("org:*")).await;
        assert!(matches!(result, Err(RepositoryError::Io { .. })));
    }

    #[tokio::test]
    async fn test_dependencies_and_artifacts() {
        let (_temp, repository) = fixture();
        let app = ModuleIdentifier::new(LOCAL_PLATFORM, "central", "org", "app", "1.0");

        let dependencies = repository.fetch_dependencies(&app).await.unwrap();
        let rendered: Vec<String> = dependencies.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["org:lib:[1.0,2.0)", "org:util"]);

        let artifacts = repository.artifacts(&app).await.unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].name, ArtifactName::Extension("jar".into()));
        assert!(!artifacts[0].volatile);
        assert_eq!(artifacts[1].name, ArtifactName::FileName("settings.conf".into()));
        assert!(artifacts[1].volatile);
        assert!(Path::new(&artifacts[1].locator).is_absolute());
    }

    #[tokio::test]
    async fn test_unknown_module() {
        let (_temp, repository) = fixture();
        let ghost = ModuleIdentifier::new(LOCAL_PLATFORM, "central", "org", "ghost", "1.0");
        assert!(matches!(
            repository.fetch_dependencies(&ghost).await,
            Err(RepositoryError::UnknownModule { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_dependency() {
        let temp = TempDir::new().unwrap();
        module(temp.path(), "org", "bad", "1.0", &[("module.ini", "[dependencies]\nmodule = nonsense\n")]);
        let repository = LocalRepository::new("central", temp.path());
        let bad = ModuleIdentifier::new(LOCAL_PLATFORM, "central", "org", "bad", "1.0");

        assert!(matches!(
            repository.fetch_dependencies(&bad).await,
            Err(RepositoryError::InvalidDependency { .. })
        ));
    }

    #[tokio::test]
    async fn test_validate_against_checksum_file() {
        let temp = TempDir::new().unwrap();
        module(temp.path(), "org", "x", "1.0", &[
            ("x.jar", "payload"),
            ("x.jar.sha256", &format!("{}  x.jar\n", checksum::bytes_digest(b"payload"))),
        ]);
        let repository = LocalRepository::new("central", temp.path());
        let id = ModuleIdentifier::new(LOCAL_PLATFORM, "central", "org", "x", "1.0");
        let artifacts = repository.artifacts(&id).await.unwrap();
        assert_eq!(artifacts.len(), 1);

        let good = temp.path().join("good.jar");
        fs::write(&good, "payload").unwrap();
        repository.validate(&id, &artifacts[0], &good).await.unwrap();

        let bad = temp.path().join("bad.jar");
        fs::write(&bad, "tampered").unwrap();
        assert!(matches!(
            repository.validate(&id, &artifacts[0], &bad).await,
            Err(RepositoryError::InvalidArtifact { .. })
        ));
    }

    #[test]
    fn test_rules_use_standard_kinds() {
        let repository = LocalRepository::new("central", "/srv");
        let rule: Rule = "exclude org:*".parse().unwrap();
        assert!(matches!(
            repository.apply_rule(&spec("org:x"), &rule),
            RuleOutcome::Command(_)
        ));
        let unknown: Rule = "frobnicate".parse().unwrap();
        assert_eq!(repository.apply_rule(&spec("org:x"), &unknown), RuleOutcome::Unsupported);
    }

    #[test]
    fn test_platform_requires_root() {
        let result = LocalPlatform.create(&RepositoryConfig::new("central", LOCAL_PLATFORM));
        assert!(matches!(result, Err(PlatformError::MissingSetting { .. })));
    }
}
