//! Per-dependency policy execution and the top-level enforcer

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::logging::{LogLevel, LogSink};
use crate::parser::traits::InstalledVersionLookup;
use crate::policy::Policy;
use crate::policy::error::{EnforceError, FieldError};
use crate::policy::failure::{Behavior, Signal};
use crate::version::source::{ProviderFactory, SourceRegistry};
use crate::version::types::Version;

/// Collaborators shared by every runner of one enforcement run
pub struct RunContext<'a> {
    pub sources: &'a SourceRegistry,
    pub lookup: &'a dyn InstalledVersionLookup,
    pub sink: &'a dyn LogSink,
}

/// Result of evaluating one dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyOutcome {
    pub dependency: String,
    /// `None` when the dependency is not installed and nothing was checked
    pub installed: Option<Version>,
    pub compliant: bool,
    /// Indexes of the rules that failed, in evaluation order
    pub failed_rules: Vec<usize>,
    /// Escalation that stopped evaluation, or `Continue`
    pub signal: Signal,
}

/// Lifecycle of a [`PolicyRunner`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerState {
    Unvalidated,
    Validated,
    /// Terminal: the policy has configuration errors and is never executed
    Invalid(Vec<FieldError>),
    /// Terminal: the policy was evaluated
    Evaluated(PolicyOutcome),
}

/// Evaluates one dependency's rules in configured order
pub struct PolicyRunner<'p> {
    policy: &'p Policy,
    state: RunnerState,
}

impl<'p> PolicyRunner<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            state: RunnerState::Unvalidated,
        }
    }

    pub fn state(&self) -> &RunnerState {
        &self.state
    }

    /// Moves an unvalidated runner to `Validated` or `Invalid`
    pub fn validate(&mut self) -> Result<(), EnforceError> {
        if self.state == RunnerState::Unvalidated {
            let errors = self.policy.errors();
            self.state = if errors.is_empty() {
                RunnerState::Validated
            } else {
                RunnerState::Invalid(errors)
            };
        }

        match &self.state {
            RunnerState::Invalid(errors) => Err(EnforceError::InvalidConfig(errors.clone())),
            _ => Ok(()),
        }
    }

    /// Runs the policy and returns its outcome
    ///
    /// A failing rule's action runs immediately. `Aborted` stops the remaining
    /// rules of this dependency; `Terminated` stops them and must end the run.
    pub async fn evaluate(&mut self, ctx: &RunContext<'_>) -> Result<PolicyOutcome, EnforceError> {
        self.validate()?;
        if let RunnerState::Evaluated(outcome) = &self.state {
            return Ok(outcome.clone());
        }

        let policy = self.policy;
        let name = policy.name();
        let retrieval = policy
            .retrieval()
            .ok_or_else(|| EnforceError::InvalidConfig(policy.errors()))?;

        let Some(installed) = ctx.lookup.installed_version(name) else {
            debug!("{} is not installed; nothing to enforce", name);
            return Ok(self.finish(PolicyOutcome {
                dependency: name.to_string(),
                installed: None,
                compliant: true,
                failed_rules: Vec::new(),
                signal: Signal::Continue,
            }));
        };

        let source = ctx.sources.resolve(retrieval.kind(), retrieval.key());
        let candidates = source
            .fetch_versions(name)
            .await
            .map_err(|source| EnforceError::Registry {
                dependency: name.to_string(),
                source,
            })?;

        if candidates.is_empty() {
            warn!(
                "No candidate versions found for {} from {} {}",
                name,
                retrieval.kind().as_str(),
                retrieval.key()
            );
        }

        let mut failed_rules = Vec::new();
        let mut signal = Signal::Continue;

        for rule in policy.rules() {
            let outcome = rule.run(name, &installed, &candidates, ctx.sink)?;
            if !outcome.compliant {
                failed_rules.push(rule.index());
            }
            if outcome.signal != Signal::Continue {
                signal = outcome.signal;
                break;
            }
        }

        debug!(
            "{} {} evaluated: {} of {} rules failed",
            name,
            installed,
            failed_rules.len(),
            policy.rules().len()
        );

        Ok(self.finish(PolicyOutcome {
            dependency: name.to_string(),
            installed: Some(installed),
            compliant: failed_rules.is_empty(),
            failed_rules,
            signal,
        }))
    }

    fn finish(&mut self, outcome: PolicyOutcome) -> PolicyOutcome {
        self.state = RunnerState::Evaluated(outcome.clone());
        outcome
    }
}

/// What to do when the policy file contains configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidConfigHandling {
    pub log_level: LogLevel,
    pub behavior: Behavior,
}

impl Default for InvalidConfigHandling {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Error,
            behavior: Behavior::Exit,
        }
    }
}

/// Summary of a whole enforcement run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub outcomes: Vec<PolicyOutcome>,
    /// Configuration errors that were logged
    pub config_errors: Vec<FieldError>,
    /// Dependencies whose versions could not be retrieved
    pub errors: Vec<String>,
    /// An `exit` action fired; nothing ran afterwards
    pub terminated: bool,
}

impl RunReport {
    pub fn compliant(&self) -> bool {
        !self.terminated && self.errors.is_empty() && self.outcomes.iter().all(|o| o.compliant)
    }

    /// Process status for this run
    ///
    /// Non-zero when terminated, when a `raise` went unhandled, or when a
    /// dependency could not be checked. Log-only failures keep status 0.
    pub fn exit_code(&self) -> i32 {
        let aborted = self
            .outcomes
            .iter()
            .any(|o| matches!(o.signal, Signal::Aborted(_)));
        if self.terminated || aborted || !self.errors.is_empty() {
            1
        } else {
            0
        }
    }
}

/// Owns the version sources and runs every configured policy
pub struct Enforcer {
    sources: SourceRegistry,
    lookup: Arc<dyn InstalledVersionLookup>,
    sink: Arc<dyn LogSink>,
    invalid_config: InvalidConfigHandling,
}

impl Enforcer {
    pub fn new(
        factory: Arc<dyn ProviderFactory>,
        lookup: Arc<dyn InstalledVersionLookup>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            sources: SourceRegistry::new(factory),
            lookup,
            sink,
            invalid_config: InvalidConfigHandling::default(),
        }
    }

    pub fn with_invalid_config(mut self, handling: InvalidConfigHandling) -> Self {
        self.invalid_config = handling;
        self
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    /// Evaluates a single dependency, surfacing a raised failure as an error
    pub async fn enforce(&self, policy: &Policy) -> Result<PolicyOutcome, EnforceError> {
        let ctx = RunContext {
            sources: &self.sources,
            lookup: self.lookup.as_ref(),
            sink: self.sink.as_ref(),
        };
        let outcome = PolicyRunner::new(policy).evaluate(&ctx).await?;
        match &outcome.signal {
            Signal::Aborted(message) => Err(EnforceError::Validation(message.clone())),
            _ => Ok(outcome),
        }
    }

    /// Evaluates `policies` in order
    ///
    /// Configuration errors are reported before anything is fetched. A
    /// `Terminated` signal stops the whole run; an `Aborted` one only stops
    /// its own dependency and is recorded in the report.
    pub async fn run(&self, policies: &[Policy]) -> Result<RunReport, EnforceError> {
        let mut report = RunReport::default();

        let config_errors: Vec<FieldError> = policies.iter().flat_map(Policy::errors).collect();
        if !config_errors.is_empty() {
            for error in &config_errors {
                self.sink.log(self.invalid_config.log_level, &error.to_string());
            }
            report.config_errors = config_errors.clone();

            match self.invalid_config.behavior {
                Behavior::Exit => {
                    report.terminated = true;
                    return Ok(report);
                }
                Behavior::Raise => return Err(EnforceError::InvalidConfig(config_errors)),
                Behavior::None => {
                    warn!("Skipping dependencies with invalid configuration");
                }
            }
        }

        let ctx = RunContext {
            sources: &self.sources,
            lookup: self.lookup.as_ref(),
            sink: self.sink.as_ref(),
        };

        for policy in policies.iter().filter(|p| p.is_valid()) {
            let mut runner = PolicyRunner::new(policy);
            match runner.evaluate(&ctx).await {
                Ok(outcome) => {
                    let signal = outcome.signal.clone();
                    report.outcomes.push(outcome);
                    match signal {
                        Signal::Terminated => {
                            info!("{} requested termination; stopping", policy.name());
                            report.terminated = true;
                            break;
                        }
                        Signal::Aborted(message) => {
                            error!("Validation error for {}: {}", policy.name(), message);
                        }
                        Signal::Continue => {}
                    }
                }
                Err(e @ EnforceError::Registry { .. }) => {
                    error!("{}", e);
                    report.errors.push(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "Checked {} dependencies using {} version sources",
            report.outcomes.len(),
            self.sources.len()
        );

        Ok(report)
    }
}
