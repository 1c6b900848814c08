//! `on_failure` parsing and the escalation run when a rule fails

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_yaml::Value;

use crate::logging::{LogLevel, LogSink};
use crate::policy::error::FieldError;
use crate::policy::type_name;
use crate::version::types::Version;

const LOG_LEVEL: &str = "log_level";
const BEHAVIOR: &str = "behavior";
const MESSAGE: &str = "message";
const ALLOWED_KEYS: [&str; 3] = [LOG_LEVEL, BEHAVIOR, MESSAGE];

/// `%{name}` placeholders in failure messages
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%\{([a-z_]+)\}").unwrap());

/// Escalation applied after the failure message is logged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// Log only
    #[default]
    None,
    /// Abort the remaining rules of this dependency with a validation error
    Raise,
    /// End the whole run with a non-zero status
    Exit,
}

impl Behavior {
    pub const ALLOWED: [&'static str; 3] = ["raise", "exit", "none"];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Behavior::None),
            "raise" => Some(Behavior::Raise),
            "exit" => Some(Behavior::Exit),
            _ => None,
        }
    }
}

/// What the caller must do after a failure action ran
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "signal", content = "message", rename_all = "snake_case")]
pub enum Signal {
    Continue,
    /// A validation error was raised with this message
    Aborted(String),
    Terminated,
}

/// Values a failure message may reference as `%{name}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureContext {
    pub version: Version,
    pub max: Option<Version>,
    pub boundary: Option<Version>,
    pub versions_behind: Option<usize>,
}

impl FailureContext {
    fn lookup(&self, name: &str) -> Option<String> {
        let render = |v: &Option<Version>| {
            v.as_ref()
                .map_or_else(|| "unknown".to_string(), Version::to_string)
        };
        match name {
            "version" => Some(self.version.to_string()),
            "max" => Some(render(&self.max)),
            "boundary" => Some(render(&self.boundary)),
            "versions_behind" => Some(
                self.versions_behind
                    .map_or_else(|| "unknown".to_string(), |n| n.to_string()),
            ),
            _ => None,
        }
    }
}

/// Logging plus escalation configured by a rule's `on_failure`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureAction {
    pub log_level: LogLevel,
    pub behavior: Behavior,
    /// Overrides the evaluator's message when set
    pub message: Option<String>,
}

impl FailureAction {
    /// Parses an `on_failure` value found at `path`; absent or null yields defaults
    pub fn parse(path: &str, value: Option<&Value>) -> Result<Self, Vec<FieldError>> {
        let map = match value {
            None | Some(Value::Null) => return Ok(Self::default()),
            Some(Value::Mapping(map)) => map,
            Some(other) => {
                return Err(vec![FieldError::new(
                    path,
                    format!(
                        "Expected to contain a Hash. Contained a [{}]",
                        type_name(other)
                    ),
                )]);
            }
        };

        let disallowed: Vec<String> = map
            .keys()
            .filter(|k| !k.as_str().is_some_and(|k| ALLOWED_KEYS.contains(&k)))
            .map(|k| k.as_str().map_or_else(|| type_name(k).to_string(), str::to_string))
            .collect();
        if !disallowed.is_empty() {
            return Err(vec![FieldError::new(
                path,
                format!(
                    "Contained unexpected keys. Only [{}] are allowed. Found [{}]",
                    ALLOWED_KEYS.join(", "),
                    disallowed.join(", ")
                ),
            )]);
        }

        let mut errors = Vec::new();
        let mut action = Self::default();

        match map.get(LOG_LEVEL) {
            None | Some(Value::Null) => {}
            Some(other) => match other.as_str().map(str::parse::<LogLevel>) {
                Some(Ok(level)) => action.log_level = level,
                _ => errors.push(FieldError::new(
                    format!("{path}.{LOG_LEVEL}"),
                    format!(
                        "Value must be one of [{}]. Provided [{}]",
                        LogLevel::ALLOWED.join(", "),
                        scalar_text(other)
                    ),
                )),
            },
        }

        match map.get(BEHAVIOR) {
            None | Some(Value::Null) => {}
            Some(other) => match other.as_str().and_then(Behavior::parse) {
                Some(behavior) => action.behavior = behavior,
                None => errors.push(FieldError::new(
                    format!("{path}.{BEHAVIOR}"),
                    format!(
                        "Value must be one of [{}]. Provided [{}]",
                        Behavior::ALLOWED.join(", "),
                        scalar_text(other)
                    ),
                )),
            },
        }

        match map.get(MESSAGE) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) => action.message = Some(s.clone()),
            Some(other) => errors.push(FieldError::new(
                format!("{path}.{MESSAGE}"),
                format!("Expected a String. Received [{}]", type_name(other)),
            )),
        }

        if errors.is_empty() {
            Ok(action)
        } else {
            Err(errors)
        }
    }

    /// Logs the failure and reports the configured escalation
    ///
    /// `default_message` comes from the evaluator and is used unless a
    /// message override is configured.
    pub fn run(&self, sink: &dyn LogSink, default_message: &str, context: &FailureContext) -> Signal {
        let template = self.message.as_deref().unwrap_or(default_message);
        let message = format_message(template, context);

        sink.log(self.log_level, &message);

        match self.behavior {
            Behavior::None => Signal::Continue,
            Behavior::Raise => Signal::Aborted(message),
            Behavior::Exit => Signal::Terminated,
        }
    }
}

/// Substitutes `%{version}`, `%{max}`, `%{boundary}` and `%{versions_behind}`
///
/// Unknown placeholders are left untouched.
pub fn format_message(template: &str, context: &FailureContext) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| {
            context
                .lookup(&caps[1])
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => type_name(other).to_string(),
    }
}
