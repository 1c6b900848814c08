use std::fmt;

use thiserror::Error;

use crate::version::error::RegistryError;

/// A configuration problem qualified by its location in the policy file
///
/// Rendered as `<path>: <reason>`, e.g.
/// `rails.rules[0].version_enforce.major: Expected value to be an Integer`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldError {
    pub path: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

#[derive(Debug, Error)]
pub enum EnforceError {
    #[error("Invalid configuration: {}", join_errors(.0))]
    InvalidConfig(Vec<FieldError>),

    #[error("Attempted to run rule {index} of {dependency} with an invalid configuration")]
    InvalidRule { dependency: String, index: usize },

    #[error("{0}")]
    Validation(String),

    #[error("Failed to retrieve versions for {dependency}: {source}")]
    Registry {
        dependency: String,
        #[source]
        source: RegistryError,
    },
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(FieldError::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
