//! Dependency policies: configuration model, rules, failure actions and the runner
//!
//! # Flow
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────┐   ┌───────────────┐
//! │  Policy  │──▶│ PolicyRunner │──▶│    Rule     │──▶│ FailureAction │
//! │ (parsed) │   │ (per dep)    │   │ (evaluate)  │   │ (log/escalate)│
//! └──────────┘   └──────────────┘   └─────────────┘   └───────────────┘
//!                       │
//!                       ▼
//!                ┌──────────────┐
//!                │ VersionSource│
//!                │   (cached)   │
//!                └──────────────┘
//! ```

pub mod compliance;
pub mod error;
pub mod failure;
pub mod retrieval;
pub mod rule;
pub mod runner;
pub mod threshold;

use serde_yaml::Value;

use crate::policy::error::FieldError;
use crate::policy::retrieval::RetrievalSpec;
use crate::policy::rule::Rule;

const SERVER: &str = "server";
const GIT: &str = "git";
const RULES: &str = "rules";

/// Every rule and the retrieval method configured for one dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    name: String,
    retrieval: Result<RetrievalSpec, Vec<FieldError>>,
    rules: Vec<Rule>,
    entry_errors: Vec<FieldError>,
}

impl Policy {
    /// Builds a policy from already typed parts
    pub fn new(name: impl Into<String>, retrieval: RetrievalSpec, rules: Vec<Rule>) -> Self {
        let name = name.into();
        let entry_errors = if rules.is_empty() {
            vec![no_rules_error(&name)]
        } else {
            Vec::new()
        };

        Self {
            name,
            retrieval: Ok(retrieval),
            rules,
            entry_errors,
        }
    }

    /// Parses the configuration entry of dependency `name`
    ///
    /// Never fails: problems are kept as field errors and reported by [`Policy::errors`].
    pub fn parse(name: &str, value: &Value) -> Self {
        let Value::Mapping(map) = value else {
            let error = FieldError::new(
                name,
                format!(
                    "Expected a Hash with [{RULES}] and one of [{SERVER}, {GIT}]. Received [{}]",
                    type_name(value)
                ),
            );
            return Self {
                name: name.to_string(),
                retrieval: Err(Vec::new()),
                rules: Vec::new(),
                entry_errors: vec![error],
            };
        };

        let mut entry_errors = Vec::new();

        let unexpected: Vec<String> = map
            .keys()
            .filter(|k| !matches!(k.as_str(), Some(SERVER | GIT | RULES)))
            .map(|k| k.as_str().map_or_else(|| type_name(k).to_string(), str::to_string))
            .collect();
        if !unexpected.is_empty() {
            entry_errors.push(FieldError::new(
                name,
                format!(
                    "Contained unexpected keys. Only [{RULES}, {SERVER}, {GIT}] are allowed. Found [{}]",
                    unexpected.join(", ")
                ),
            ));
        }

        let rules = match map.get(RULES) {
            Some(Value::Sequence(items)) if !items.is_empty() => items
                .iter()
                .enumerate()
                .map(|(index, item)| Rule::parse(name, index, item))
                .collect(),
            None | Some(Value::Null) | Some(Value::Sequence(_)) => {
                entry_errors.push(no_rules_error(name));
                Vec::new()
            }
            Some(other) => {
                entry_errors.push(FieldError::new(
                    format!("{name}.{RULES}"),
                    format!("Expected a list of rules. Received [{}]", type_name(other)),
                ));
                Vec::new()
            }
        };

        Self {
            name: name.to_string(),
            retrieval: RetrievalSpec::parse(name, map.get(SERVER), map.get(GIT)),
            rules,
            entry_errors,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn retrieval(&self) -> Option<&RetrievalSpec> {
        self.retrieval.as_ref().ok()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// All configuration errors: entry level, then rules in order, then retrieval
    pub fn errors(&self) -> Vec<FieldError> {
        let mut errors = self.entry_errors.clone();
        errors.extend(self.rules.iter().flat_map(|r| r.errors().iter().cloned()));
        if let Err(retrieval_errors) = &self.retrieval {
            errors.extend(retrieval_errors.iter().cloned());
        }
        errors
    }

    pub fn is_valid(&self) -> bool {
        self.entry_errors.is_empty() && self.retrieval.is_ok() && self.rules.iter().all(Rule::is_valid)
    }
}

fn no_rules_error(name: &str) -> FieldError {
    FieldError::new(
        format!("{name}.{RULES}"),
        "At least 1 rule is expected per dependency",
    )
}

/// Human readable YAML type, used in configuration messages
pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Boolean",
        Value::Number(n) if n.is_f64() => "Float",
        Value::Number(_) => "Integer",
        Value::String(_) => "String",
        Value::Sequence(_) => "Array",
        Value::Mapping(_) => "Hash",
        Value::Tagged(_) => "Tagged",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::threshold::ThresholdSpec;

    fn policy(s: &str) -> Policy {
        let value: Value = serde_yaml::from_str(s).unwrap();
        Policy::parse("rails", &value)
    }

    #[test]
    fn parse_builds_valid_policy() {
        let policy = policy(
            r#"
server: true
rules:
  - version_enforce: { insync: true }
  - version_enforce: { major: 0 }
    on_failure: { behavior: exit }
"#,
        );

        assert!(policy.is_valid(), "{:?}", policy.errors());
        assert_eq!(policy.name(), "rails");
        assert_eq!(policy.rules().len(), 2);
        assert_eq!(policy.rules()[0].threshold(), Some(&ThresholdSpec::Insync));
        assert_eq!(
            policy.retrieval(),
            Some(&RetrievalSpec::Server {
                source: "https://rubygems.org".to_string()
            })
        );
    }

    #[test]
    fn parse_reports_field_qualified_errors_in_order() {
        let policy = policy(
            r#"
rules:
  - version_enforce: { major: one }
  - version_enforce: { insync: true }
    on_failure: { behavior: explode }
"#,
        );

        let messages: Vec<String> = policy.errors().iter().map(ToString::to_string).collect();
        assert!(!policy.is_valid());
        assert_eq!(messages.len(), 3, "{messages:?}");
        assert!(messages[0].starts_with("rails.rules[0].version_enforce.major: Expected value to be an Integer"));
        assert!(messages[1].starts_with("rails.rules[1].on_failure.behavior: Value must be one of"));
        assert!(messages[2].starts_with("rails.retrieval: `server` and `git` keys are missing"));
    }

    #[test]
    fn parse_requires_at_least_one_rule() {
        let policy = policy("{git: acme, rules: []}");

        assert_eq!(
            policy.errors(),
            vec![FieldError::new("rails.rules", "At least 1 rule is expected per dependency")]
        );
    }

    #[test]
    fn parse_rejects_unexpected_entry_keys() {
        let policy = policy("{git: acme, behaviors: [], rules: [{version_enforce: {insync: true}}]}");

        let errors = policy.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "rails");
        assert!(errors[0].reason.contains("behaviors"));
    }

    #[test]
    fn parse_rejects_non_mapping_entry() {
        let policy = policy("just-a-string");

        assert_eq!(policy.errors().len(), 1);
        assert!(!policy.is_valid());
    }
}
