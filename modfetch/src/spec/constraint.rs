//! Version constraints: wildcard, exact version or a union of ranges.

use std::cmp::Ordering;
use std::fmt;

use super::SpecificationError;
use crate::version;

/// One bracketed interval. A missing bound is unbounded on that side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    pub lower: Option<String>,
    pub lower_inclusive: bool,
    pub upper: Option<String>,
    pub upper_inclusive: bool,
}

impl VersionRange {
    /// Returns true if `version` lies within this interval.
    pub fn contains(&self, version: &str) -> bool {
        if let Some(lower) = &self.lower {
            match version::compare(version, lower) {
                Ordering::Less => return false,
                Ordering::Equal if !self.lower_inclusive => return false,
                _ => {}
            }
        }
        if let Some(upper) = &self.upper {
            match version::compare(version, upper) {
                Ordering::Greater => return false,
                Ordering::Equal if !self.upper_inclusive => return false,
                _ => {}
            }
        }
        true
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = if self.lower_inclusive { '[' } else { '(' };
        let close = if self.upper_inclusive { ']' } else { ')' };
        match (&self.lower, &self.upper) {
            (Some(lower), Some(upper)) if lower == upper && self.lower_inclusive && self.upper_inclusive => {
                write!(f, "[{lower}]")
            }
            (lower, upper) => write!(
                f,
                "{open}{},{}{close}",
                lower.as_deref().unwrap_or(""),
                upper.as_deref().unwrap_or("")
            ),
        }
    }
}

/// Constraint on the version part of an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionConstraint {
    /// Matches every version.
    Any,
    /// Matches a version whose raw text is identical.
    Exact(String),
    /// Matches a version contained in at least one range.
    Ranges(Vec<VersionRange>),
}

impl VersionConstraint {
    pub fn matches(&self, version: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected == version,
            Self::Ranges(ranges) => ranges.iter().any(|r| r.contains(version)),
        }
    }

    /// Parse the constraint text of an option.
    pub fn parse(text: &str) -> Result<Self, SpecificationError> {
        let text = text.trim();
        if text.is_empty() || text == "*" {
            return Ok(Self::Any);
        }
        if !text.starts_with('[') && !text.starts_with('(') {
            if text.contains([',', '[', ']', '(', ')']) {
                return Err(SpecificationError::InvalidConstraint {
                    constraint: text.to_string(),
                    reason: "unbracketed range".to_string(),
                });
            }
            return Ok(Self::Exact(text.to_string()));
        }
        parse_ranges(text).map(Self::Ranges)
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Exact(version) => f.write_str(version),
            Self::Ranges(ranges) => {
                for range in ranges {
                    write!(f, "{range}")?;
                }
                Ok(())
            }
        }
    }
}

fn parse_ranges(text: &str) -> Result<Vec<VersionRange>, SpecificationError> {
    let invalid = |reason: &str| SpecificationError::InvalidConstraint {
        constraint: text.to_string(),
        reason: reason.to_string(),
    };

    let mut ranges = Vec::new();
    let mut rest = text;
    loop {
        rest = rest.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
        if rest.is_empty() {
            break;
        }

        let lower_inclusive = match rest.chars().next() {
            Some('[') => true,
            Some('(') => false,
            _ => return Err(invalid("expected '[' or '('")),
        };
        let close = rest
            .find([']', ')'])
            .ok_or_else(|| invalid("unterminated range"))?;
        let upper_inclusive = rest[close..].starts_with(']');
        let body = &rest[1..close];
        rest = &rest[close + 1..];

        let bound = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };

        let range = match body.split_once(',') {
            Some((lower, upper)) => {
                if upper.contains(',') {
                    return Err(invalid("too many bounds"));
                }
                VersionRange {
                    lower: bound(lower),
                    lower_inclusive,
                    upper: bound(upper),
                    upper_inclusive,
                }
            }
            None => {
                let exact = bound(body).ok_or_else(|| invalid("empty range"))?;
                if !lower_inclusive || !upper_inclusive {
                    return Err(invalid("single-version range must use brackets"));
                }
                VersionRange {
                    lower: Some(exact.clone()),
                    lower_inclusive: true,
                    upper: Some(exact),
                    upper_inclusive: true,
                }
            }
        };
        ranges.push(range);
    }

    if ranges.is_empty() {
        return Err(invalid("no ranges"));
    }
    Ok(ranges)
}
