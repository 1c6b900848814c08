//! A single enforceable clause: threshold check plus failure action

use serde_yaml::Value;

use crate::logging::LogSink;
use crate::policy::compliance::evaluate;
use crate::policy::error::{EnforceError, FieldError};
use crate::policy::failure::{FailureAction, Signal};
use crate::policy::threshold::ThresholdSpec;
use crate::policy::type_name;
use crate::version::types::{Version, VersionSet};

const VERSION_ENFORCE: &str = "version_enforce";
const ON_FAILURE: &str = "on_failure";

/// One rule of a dependency policy
///
/// Validation happens once, when the rule is built. The result never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    index: usize,
    parsed: Result<ValidRule, Vec<FieldError>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ValidRule {
    threshold: ThresholdSpec,
    on_failure: FailureAction,
}

/// Result of running a rule against an installed version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    pub compliant: bool,
    pub signal: Signal,
}

impl Rule {
    /// Builds an already valid rule
    pub fn new(index: usize, threshold: ThresholdSpec, on_failure: FailureAction) -> Self {
        Self {
            index,
            parsed: Ok(ValidRule {
                threshold,
                on_failure,
            }),
        }
    }

    /// Parses `rules[index]` of `dependency`, collecting every field error
    pub fn parse(dependency: &str, index: usize, value: &Value) -> Self {
        let path = format!("{dependency}.rules[{index}]");
        Self {
            index,
            parsed: parse_rule(&path, value),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_valid(&self) -> bool {
        self.parsed.is_ok()
    }

    pub fn errors(&self) -> &[FieldError] {
        match &self.parsed {
            Ok(_) => &[],
            Err(errors) => errors,
        }
    }

    pub fn threshold(&self) -> Option<&ThresholdSpec> {
        self.parsed.as_ref().ok().map(|r| &r.threshold)
    }

    pub fn on_failure(&self) -> Option<&FailureAction> {
        self.parsed.as_ref().ok().map(|r| &r.on_failure)
    }

    /// Evaluates the threshold and, on failure, runs the failure action
    ///
    /// Running an invalid rule is a programming error and fails with
    /// [`EnforceError::InvalidRule`] instead of producing a verdict.
    pub fn run(
        &self,
        dependency: &str,
        installed: &Version,
        candidates: &VersionSet,
        sink: &dyn LogSink,
    ) -> Result<RuleOutcome, EnforceError> {
        let rule = self.parsed.as_ref().map_err(|_| EnforceError::InvalidRule {
            dependency: dependency.to_string(),
            index: self.index,
        })?;

        let evaluation = evaluate(dependency, installed, candidates, &rule.threshold);
        if evaluation.compliant {
            return Ok(RuleOutcome {
                compliant: true,
                signal: Signal::Continue,
            });
        }

        let signal = rule
            .on_failure
            .run(sink, &evaluation.message, &evaluation.context);

        Ok(RuleOutcome {
            compliant: false,
            signal,
        })
    }
}

fn parse_rule(path: &str, value: &Value) -> Result<ValidRule, Vec<FieldError>> {
    let Value::Mapping(map) = value else {
        return Err(vec![FieldError::new(
            path,
            format!(
                "Expected a Hash with [{VERSION_ENFORCE}] and optional [{ON_FAILURE}]. Received [{}]",
                type_name(value)
            ),
        )]);
    };

    let unexpected: Vec<String> = map
        .keys()
        .filter(|k| !matches!(k.as_str(), Some(VERSION_ENFORCE | ON_FAILURE)))
        .map(|k| k.as_str().map_or_else(|| type_name(k).to_string(), str::to_string))
        .collect();

    let mut errors = Vec::new();
    if !unexpected.is_empty() {
        errors.push(FieldError::new(
            path,
            format!(
                "Contained unexpected keys. Only [{VERSION_ENFORCE}, {ON_FAILURE}] are allowed. Found [{}]",
                unexpected.join(", ")
            ),
        ));
    }

    let threshold = ThresholdSpec::parse(&format!("{path}.{VERSION_ENFORCE}"), map.get(VERSION_ENFORCE))
        .inspect_err(|e| errors.extend(e.iter().cloned()));
    let on_failure = FailureAction::parse(&format!("{path}.{ON_FAILURE}"), map.get(ON_FAILURE))
        .inspect_err(|e| errors.extend(e.iter().cloned()));

    match (threshold, on_failure) {
        (Ok(threshold), Ok(on_failure)) if errors.is_empty() => Ok(ValidRule {
            threshold,
            on_failure,
        }),
        _ => Err(errors),
    }
}
