//! Module specifications and matching.
//!
//! A [`ModuleSpecification`] requests a module through one or more
//! [`SpecOption`]s. Options combine with OR, and any matching exclude option
//! vetoes the match.
//!
//! # Textual form
//!
//! ```text
//! org.example:core:[1.0,2.0) | org.example:core-compat | !org.example:core:[1.5]
//! ```
//!
//! Each option is `owner:name[:constraint]`, optionally prefixed by `!`. A
//! missing constraint is the wildcard `*`. Owner and name are glob patterns
//! unless the specification is strict.

mod constraint;
mod pattern;

pub use constraint::{VersionConstraint, VersionRange};
pub use pattern::glob_matches;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::identifier::ModuleIdentifier;

/// Errors produced while parsing specifications.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecificationError {
    #[error("empty specification")]
    Empty,

    #[error("invalid option '{option}': expected owner:name[:constraint]")]
    InvalidOption { option: String },

    #[error("invalid version constraint '{constraint}': {reason}")]
    InvalidConstraint { constraint: String, reason: String },
}

/// One alternative of a specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpecOption {
    pub owner: String,
    pub name: String,
    pub version: VersionConstraint,
    pub exclude: bool,
}

impl SpecOption {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, version: VersionConstraint) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            version,
            exclude: false,
        }
    }

    /// Turn this option into an exclude option.
    pub fn excluding(mut self) -> Self {
        self.exclude = true;
        self
    }

    /// Returns true if the identifier matches this option's fields,
    /// ignoring the exclude flag.
    pub fn matches(&self, identifier: &ModuleIdentifier, strict: bool) -> bool {
        let coordinate_matches = if strict {
            self.owner == identifier.owner() && self.name == identifier.name()
        } else {
            glob_matches(&self.owner, identifier.owner()) && glob_matches(&self.name, identifier.name())
        };
        coordinate_matches && self.version.matches(identifier.version())
    }

    fn is_literal(&self, strict: bool) -> bool {
        strict || (!pattern::has_wildcards(&self.owner) && !pattern::has_wildcards(&self.name))
    }

    fn parse(text: &str) -> Result<Self, SpecificationError> {
        let trimmed = text.trim();
        let (exclude, body) = match trimmed.strip_prefix('!') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, trimmed),
        };

        let invalid = || SpecificationError::InvalidOption {
            option: trimmed.to_string(),
        };

        let mut parts = body.splitn(3, ':');
        let owner = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let name = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let version = match parts.next() {
            Some(constraint) => VersionConstraint::parse(constraint)?,
            None => VersionConstraint::Any,
        };

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            version,
            exclude,
        })
    }
}

impl fmt::Display for SpecOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exclude {
            f.write_str("!")?;
        }
        write!(f, "{}:{}", self.owner, self.name)?;
        if self.version != VersionConstraint::Any {
            write!(f, ":{}", self.version)?;
        }
        Ok(())
    }
}

/// An immutable request for a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleSpecification {
    options: Vec<SpecOption>,
    strict: bool,
}

impl ModuleSpecification {
    /// Build a specification from options.
    pub fn new(options: Vec<SpecOption>) -> Result<Self, SpecificationError> {
        if options.is_empty() {
            return Err(SpecificationError::Empty);
        }
        Ok(Self {
            options,
            strict: false,
        })
    }

    /// Specification requesting exactly one version of one module.
    pub fn exact(owner: &str, name: &str, version: &str) -> Self {
        Self {
            options: vec![SpecOption::new(
                escape(owner),
                escape(name),
                VersionConstraint::Exact(version.to_string()),
            )],
            strict: false,
        }
    }

    /// Compare coordinate fields by equality instead of glob matching.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn options(&self) -> &[SpecOption] {
        &self.options
    }

    /// Options that are not exclude options.
    pub fn including_options(&self) -> impl Iterator<Item = &SpecOption> {
        self.options.iter().filter(|o| !o.exclude)
    }

    /// Returns true if at least one including option matches and no exclude
    /// option does.
    pub fn is_satisfied_by(&self, identifier: &ModuleIdentifier) -> bool {
        let mut included = false;
        for option in &self.options {
            if option.matches(identifier, self.strict) {
                if option.exclude {
                    return false;
                }
                included = true;
            }
        }
        included
    }

    /// The single literal `(owner, name, version)` this specification
    /// requests, if it is trivial.
    ///
    /// A specification is trivial when it has exactly one including option,
    /// no exclude options, literal coordinate fields and an exact version.
    pub fn trivial_target(&self) -> Option<(String, String, &str)> {
        let [option] = self.options.as_slice() else {
            return None;
        };
        if option.exclude || !option.is_literal(self.strict) {
            return None;
        }
        let VersionConstraint::Exact(version) = &option.version else {
            return None;
        };
        if self.strict {
            Some((option.owner.clone(), option.name.clone(), version))
        } else {
            Some((pattern::unescape(&option.owner), pattern::unescape(&option.name), version))
        }
    }

    pub fn is_trivial(&self) -> bool {
        self.trivial_target().is_some()
    }
}

fn escape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        if matches!(c, '*' | '?' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl FromStr for ModuleSpecification {
    type Err = SpecificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(SpecificationError::Empty);
        }
        let options = s
            .split('|')
            .map(SpecOption::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(options)
    }
}

impl fmt::Display for ModuleSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, option) in self.options.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{option}")?;
        }
        Ok(())
    }
}
