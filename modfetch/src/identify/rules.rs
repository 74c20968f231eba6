//! Rule pipeline run before a module is identified.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::notify::Notifier;
use crate::repository::Repository;
use crate::rule::{Rule, RuleCommand, RuleOutcome};
use crate::spec::ModuleSpecification;

/// Combined effect of every rule on one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleDirectives {
    pub exclude: bool,
    pub exclude_dependencies: bool,
    pub restrict: Option<Vec<String>>,
}

impl RuleDirectives {
    fn restrict_to(&mut self, names: Vec<String>) {
        self.restrict = Some(match self.restrict.take() {
            None => names,
            Some(current) => current.into_iter().filter(|n| names.contains(n)).collect(),
        });
    }
}

pub struct RulePipeline {
    rules: Vec<Rule>,
    reported: Mutex<HashSet<String>>,
}

impl RulePipeline {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            reported: Mutex::new(HashSet::new()),
        }
    }

    /// Offer each rule to the repositories in priority order. The first
    /// repository that knows the rule kind decides its outcome.
    pub fn evaluate(
        &self,
        specification: &ModuleSpecification,
        repositories: &[Arc<dyn Repository>],
        notifier: &dyn Notifier,
    ) -> RuleDirectives {
        let mut directives = RuleDirectives::default();

        for rule in &self.rules {
            let outcome = repositories
                .iter()
                .map(|repository| (repository.name(), repository.apply_rule(specification, rule)))
                .find(|(_, outcome)| *outcome != RuleOutcome::Unsupported);

            let Some((repository, outcome)) = outcome else {
                self.report_unsupported(rule, notifier);
                continue;
            };

            let RuleOutcome::Command(command) = outcome else {
                continue;
            };
            debug!(rule = %rule, module = %specification, repository, command = ?command, "Rule applied");

            match command {
                RuleCommand::ExcludeModule => directives.exclude = true,
                RuleCommand::ExcludeDependencies => directives.exclude_dependencies = true,
                RuleCommand::RestrictRepositories(names) => directives.restrict_to(names),
                RuleCommand::Handled => {}
            }
        }

        directives
    }

    fn report_unsupported(&self, rule: &Rule, notifier: &dyn Notifier) {
        if self.reported.lock().insert(rule.kind.clone()) {
            warn!(kind = %rule.kind, "No repository supports rule kind");
            notifier.error(&format!("Unsupported rule kind '{}' in rule '{}'", rule.kind, rule));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NullNotifier;
    use crate::testing::MemoryRepository;

    fn spec(text: &str) -> ModuleSpecification {
        text.parse().unwrap()
    }

    fn rule(text: &str) -> Rule {
        text.parse().unwrap()
    }

    #[test]
    fn test_restrictions_intersect() {
        let repositories: Vec<Arc<dyn Repository>> = vec![Arc::new(MemoryRepository::new("central"))];
        let pipeline = RulePipeline::new(vec![
            rule("restrict org:* central,mirror"),
            rule("restrict org:lib mirror,backup"),
        ]);

        let directives = pipeline.evaluate(&spec("org:lib"), &repositories, &NullNotifier);
        assert_eq!(directives.restrict, Some(vec!["mirror".to_string()]));
        assert!(!directives.exclude);
    }

    #[test]
    fn test_exclude_and_unsupported() {
        let repositories: Vec<Arc<dyn Repository>> = vec![Arc::new(MemoryRepository::new("central"))];
        let pipeline = RulePipeline::new(vec![rule("exclude org:legacy"), rule("frobnicate")]);

        let directives = pipeline.evaluate(&spec("org:legacy"), &repositories, &NullNotifier);
        assert!(directives.exclude);

        let directives = pipeline.evaluate(&spec("org:other"), &repositories, &NullNotifier);
        assert!(!directives.exclude);
        assert_eq!(pipeline.reported.lock().len(), 1);
    }
}
