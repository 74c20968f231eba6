//! Identification rules.
//!
//! A rule is a kind, an optional target specification and an optional
//! argument, written as `kind [target] [argument]`:
//!
//! ```text
//! exclude org.legacy:*
//! restrict org.example:* central,mirror
//! exclude-dependencies org.example:fat-jar
//! ```
//!
//! Repositories decide which kinds they understand; see
//! [`Repository::apply_rule`](crate::repository::Repository::apply_rule).

use std::fmt;
use std::str::FromStr;

use crate::spec::{glob_matches, ModuleSpecification, SpecificationError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    pub kind: String,
    pub target: Option<ModuleSpecification>,
    pub argument: Option<String>,
}

impl Rule {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            target: None,
            argument: None,
        }
    }

    pub fn with_target(mut self, target: ModuleSpecification) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_argument(mut self, argument: impl Into<String>) -> Self {
        self.argument = Some(argument.into());
        self
    }

    /// Returns true if this rule targets `specification`: the rule has no
    /// target, or the owner and name patterns of some target option match
    /// the owner and name of some option of the specification.
    pub fn targets(&self, specification: &ModuleSpecification) -> bool {
        let Some(target) = &self.target else {
            return true;
        };
        target.including_options().any(|t| {
            specification
                .including_options()
                .any(|o| glob_matches(&t.owner, &o.owner) && glob_matches(&t.name, &o.name))
        })
    }
}

impl FromStr for Rule {
    type Err = SpecificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let kind = parts.next().ok_or(SpecificationError::Empty)?;
        let mut rule = Rule::new(kind);
        if let Some(target) = parts.next() {
            rule.target = Some(target.parse()?);
        }
        let rest: Vec<&str> = parts.collect();
        if !rest.is_empty() {
            rule.argument = Some(rest.join(" "));
        }
        Ok(rule)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind)?;
        if let Some(target) = &self.target {
            write!(f, " {}", target.to_string().replace(' ', ""))?;
        }
        if let Some(argument) = &self.argument {
            write!(f, " {argument}")?;
        }
        Ok(())
    }
}

/// What a repository asks the engine to do after applying a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleCommand {
    /// Do not identify the module; record it as excluded.
    ExcludeModule,
    /// Identify the module but do not recurse into its dependencies.
    ExcludeDependencies,
    /// Consult only the named repositories for the module and its
    /// dependencies.
    RestrictRepositories(Vec<String>),
    /// The rule was understood and needs no further action.
    Handled,
}

/// Result of offering a rule to a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// The repository does not know this rule kind.
    Unsupported,
    /// The kind is known but the rule does not target this module.
    NotApplicable,
    Command(RuleCommand),
}

/// Apply the rule kinds understood by the built-in platforms:
/// `exclude`, `exclude-dependencies`, `restrict` and `note`.
pub fn apply_standard_rule(specification: &ModuleSpecification, rule: &Rule) -> RuleOutcome {
    let command = match rule.kind.as_str() {
        "exclude" => RuleCommand::ExcludeModule,
        "exclude-dependencies" => RuleCommand::ExcludeDependencies,
        "restrict" => {
            let names = rule
                .argument
                .as_deref()
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect();
            RuleCommand::RestrictRepositories(names)
        }
        "note" => RuleCommand::Handled,
        _ => return RuleOutcome::Unsupported,
    };
    if rule.targets(specification) {
        RuleOutcome::Command(command)
    } else {
        RuleOutcome::NotApplicable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        let rule: Rule = "note".parse().unwrap();
        assert_eq!(rule, Rule::new("note"));

        let rule: Rule = "restrict org.example:* central,mirror".parse().unwrap();
        assert_eq!(rule.kind, "restrict");
        assert_eq!(rule.argument.as_deref(), Some("central,mirror"));
        assert_eq!(rule.to_string(), "restrict org.example:* central,mirror");

        assert!("".parse::<Rule>().is_err());
        assert!("exclude not-a-spec".parse::<Rule>().is_err());
    }

    #[test]
    fn test_targets() {
        let rule: Rule = "exclude org.legacy:*".parse().unwrap();
        assert!(rule.targets(&"org.legacy:*:[1.0,)".parse().unwrap()));
        assert!(rule.targets(&"org.legacy:core".parse().unwrap()));
        assert!(!rule.targets(&"org.current:core".parse().unwrap()));
        assert!(Rule::new("note").targets(&"a:b".parse().unwrap()));
    }

    #[test]
    fn test_standard_rules() {
        let spec: ModuleSpecification = "org.example:core".parse().unwrap();

        let restrict: Rule = "restrict org.example:* central, mirror".parse().unwrap();
        assert_eq!(
            apply_standard_rule(&spec, &restrict),
            RuleOutcome::Command(RuleCommand::RestrictRepositories(vec![
                "central".to_string(),
                "mirror".to_string()
            ]))
        );

        let other: Rule = "exclude org.other:*".parse().unwrap();
        assert_eq!(apply_standard_rule(&spec, &other), RuleOutcome::NotApplicable);
        assert_eq!(apply_standard_rule(&spec, &Rule::new("note")), RuleOutcome::Command(RuleCommand::Handled));
        assert_eq!(apply_standard_rule(&spec, &Rule::new("bogus")), RuleOutcome::Unsupported);
    }
}
