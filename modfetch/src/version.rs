//! Version parsing and ordering.
//!
//! Versions are dot-separated integer runs optionally followed by a qualifier
//! made of a keyword and a number (`1.2.0-beta3`, `2.0rc1`, `1.0.SNAPSHOT`).
//!
//! # Ordering
//!
//! ```text
//! 1.0 < 1.0.1 < 1.1 < 2.0-dev < 2.0-m1 < 2.0-alpha1 < 2.0-beta1 < 2.0-rc1 < 2.0
//! ```
//!
//! Missing trailing components count as zero, so `1.0` and `1.0.0` have the
//! same numeric value; they are then ordered by their raw text so that two
//! distinct strings never compare equal. Versions that do not parse, or whose
//! qualifier keyword is unknown, compare lexicographically among themselves
//! and sort below every parseable version. This keeps the order total and
//! transitive, which sorting relies on.

use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// Release qualifier, ordered from least to most mature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Qualifier {
    /// `dev`, `snapshot`
    Dev,
    /// `milestone`, `m`
    Milestone,
    /// `alpha`, `a`
    Alpha,
    /// `beta`, `b`
    Beta,
    /// `rc`, `cr`
    ReleaseCandidate,
    /// No qualifier, or `final`/`ga`/`release`.
    Release,
}

impl Qualifier {
    /// Fixed weight used when comparing qualifiers.
    pub fn weight(self) -> i32 {
        match self {
            Self::Dev => -5,
            Self::Milestone => -4,
            Self::Alpha => -3,
            Self::Beta => -2,
            Self::ReleaseCandidate => -1,
            Self::Release => 0,
        }
    }

    /// Map a qualifier keyword (case-insensitive) to a qualifier.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "dev" | "snapshot" => Some(Self::Dev),
            "milestone" | "m" => Some(Self::Milestone),
            "alpha" | "a" => Some(Self::Alpha),
            "beta" | "b" => Some(Self::Beta),
            "rc" | "cr" => Some(Self::ReleaseCandidate),
            "final" | "ga" | "release" => Some(Self::Release),
            _ => None,
        }
    }
}

/// A version string broken into its comparable parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVersion {
    components: Vec<u64>,
    qualifier: Qualifier,
    qualifier_number: u64,
}

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d+(?:\.\d+)*)(?:[-._]?([A-Za-z]+)(\d*))?$").expect("valid version regex")
    })
}

impl ParsedVersion {
    /// Parse a version string.
    ///
    /// Returns `None` when the string does not follow the numeric layout or
    /// carries an unknown qualifier keyword.
    pub fn parse(raw: &str) -> Option<Self> {
        let captures = version_pattern().captures(raw.trim())?;

        let components = captures[1]
            .split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;

        let (qualifier, qualifier_number) = match captures.get(2) {
            None => (Qualifier::Release, 0),
            Some(keyword) => {
                let qualifier = Qualifier::from_keyword(keyword.as_str())?;
                let number = match captures.get(3).map(|m| m.as_str()) {
                    None | Some("") => 0,
                    Some(digits) => digits.parse::<u64>().ok()?,
                };
                (qualifier, number)
            }
        };

        Some(Self {
            components,
            qualifier,
            qualifier_number,
        })
    }

    /// Numeric components, in order.
    pub fn components(&self) -> &[u64] {
        &self.components
    }

    /// The release qualifier.
    pub fn qualifier(&self) -> Qualifier {
        self.qualifier
    }

    fn compare(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            let a = self.components.get(i).copied().unwrap_or(0);
            let b = other.components.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ordering => return ordering,
            }
        }

        self.qualifier
            .weight()
            .cmp(&other.qualifier.weight())
            .then(self.qualifier_number.cmp(&other.qualifier_number))
    }
}

/// Compare two raw version strings.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (ParsedVersion::parse(a), ParsedVersion::parse(b)) {
        (Some(pa), Some(pb)) => pa.compare(&pb).then_with(|| a.cmp(b)),
        (None, None) => a.cmp(b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
    }
}

/// A raw version string ordered with [`compare`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(String);

impl Version {
    /// Wrap a raw version string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw version text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse into comparable parts, if possible.
    pub fn parsed(&self) -> Option<ParsedVersion> {
        ParsedVersion::parse(&self.0)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(&self.0, &other.0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Version {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}
