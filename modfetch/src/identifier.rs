//! Concrete, resolved module identifiers.
//!
//! A [`ModuleIdentifier`] names exactly one module version offered by one
//! repository. Identifiers sharing a [`Coordinate`] are different versions of
//! the same logical module and are candidates for conflict resolution.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::version;

/// Returned when two identifiers from different platforms are compared.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot compare {left} ({left_platform}) with {right} ({right_platform})")]
pub struct IncompatibleIdentifiers {
    pub left: String,
    pub left_platform: String,
    pub right: String,
    pub right_platform: String,
}

/// The version-independent part of an identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Coordinate {
    pub platform: String,
    pub owner: String,
    pub name: String,
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner, self.name)
    }
}

/// A resolved module: platform, repository, coordinate fields and version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ModuleIdentifier {
    platform: String,
    repository: String,
    owner: String,
    name: String,
    version: String,
}

impl ModuleIdentifier {
    /// Create a new identifier.
    pub fn new(
        platform: impl Into<String>,
        repository: impl Into<String>,
        owner: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            platform: platform.into(),
            repository: repository.into(),
            owner: owner.into(),
            name: name.into(),
            version: version.into(),
        }
    }

    /// Platform that produced this identifier.
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Name of the repository offering this identifier.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw version string.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The coordinate shared by all versions of this module.
    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            platform: self.platform.clone(),
            owner: self.owner.clone(),
            name: self.name.clone(),
        }
    }

    /// Compare by version.
    ///
    /// Identifiers from different platforms have no defined order and
    /// produce an error instead.
    pub fn try_cmp(&self, other: &Self) -> Result<Ordering, IncompatibleIdentifiers> {
        if self.platform != other.platform {
            return Err(self.incompatible_with(other));
        }
        Ok(version::compare(&self.version, &other.version))
    }

    fn incompatible_with(&self, other: &Self) -> IncompatibleIdentifiers {
        IncompatibleIdentifiers {
            left: self.to_string(),
            left_platform: self.platform.clone(),
            right: other.to_string(),
            right_platform: other.platform.clone(),
        }
    }
}

impl fmt::Display for ModuleIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.owner, self.name, self.version)
    }
}

/// Sort identifiers by version, oldest first.
///
/// Fails without reordering when the slice mixes platforms.
pub fn sort_by_version(identifiers: &mut [ModuleIdentifier]) -> Result<(), IncompatibleIdentifiers> {
    if let Some(first) = identifiers.first() {
        if let Some(other) = identifiers.iter().find(|i| i.platform != first.platform) {
            return Err(first.incompatible_with(other));
        }
    }
    identifiers.sort_by(|a, b| version::compare(&a.version, &b.version));
    Ok(())
}

/// Sort identifiers by raw version string only, ignoring platforms.
pub fn sort_by_raw_version(identifiers: &mut [ModuleIdentifier]) {
    identifiers.sort_by(|a, b| a.version.cmp(&b.version));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(platform: &str, version: &str) -> ModuleIdentifier {
        ModuleIdentifier::new(platform, "central", "org.x", "y", version)
    }

    #[test]
    fn test_display() {
        assert_eq!(id("local", "1.5").to_string(), "org.x:y:1.5");
    }

    #[test]
    fn test_coordinate_ignores_version_and_repository() {
        let a = ModuleIdentifier::new("local", "one", "org.x", "y", "1.0");
        let b = ModuleIdentifier::new("local", "two", "org.x", "y", "2.0");
        assert_eq!(a.coordinate(), b.coordinate());
        assert_ne!(a, b);
    }

    #[test]
    fn test_try_cmp_same_platform() {
        assert_eq!(id("local", "1.0").try_cmp(&id("local", "1.2")), Ok(Ordering::Less));
    }

    #[test]
    fn test_try_cmp_incompatible() {
        let err = id("local", "1.0").try_cmp(&id("remote", "1.0")).unwrap_err();
        assert_eq!(err.left_platform, "local");
        assert_eq!(err.right_platform, "remote");
    }

    #[test]
    fn test_sort_by_version() {
        let mut ids = vec![id("local", "1.10"), id("local", "1.2"), id("local", "1.0")];
        sort_by_version(&mut ids).unwrap();
        let versions: Vec<&str> = ids.iter().map(|i| i.version()).collect();
        assert_eq!(versions, vec!["1.0", "1.2", "1.10"]);
    }

    #[test]
    fn test_sort_mixed_platforms_fails() {
        let mut ids = vec![id("local", "2.0"), id("remote", "1.0")];
        assert!(sort_by_version(&mut ids).is_err());
        assert_eq!(ids[0].version(), "2.0");

        sort_by_raw_version(&mut ids);
        assert_eq!(ids[0].version(), "1.0");
    }
}
