//! Retrieval method parsing (`server` or `git`) for one dependency

use serde_yaml::Value;

use crate::policy::error::FieldError;
use crate::policy::type_name;
use crate::version::registries::server::DEFAULT_SERVER_SOURCE;
use crate::version::registry::SourceKind;

/// Where a dependency's candidate versions come from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RetrievalSpec {
    /// Gem server compact index at `source`
    Server { source: String },
    /// GitHub releases of `{owner}/{dependency}`
    Git { owner: String },
}

impl RetrievalSpec {
    /// Builds the retrieval method from the dependency's `server` and `git` values
    ///
    /// Exactly one must be populated. `null` and `false` count as absent.
    pub fn parse(
        dependency: &str,
        server: Option<&Value>,
        git: Option<&Value>,
    ) -> Result<Self, Vec<FieldError>> {
        let server = server.filter(|v| is_present(v));
        let git = git.filter(|v| is_present(v));

        match (server, git) {
            (Some(_), Some(_)) => Err(vec![FieldError::new(
                format!("{dependency}.retrieval"),
                "`server` and `git` keys present. Must only choose 1",
            )]),
            (Some(server), None) => parse_server(dependency, server),
            (None, Some(git)) => parse_git(dependency, git),
            (None, None) => Err(vec![FieldError::new(
                format!("{dependency}.retrieval"),
                "`server` and `git` keys are missing. Must provide 1 retrieval method",
            )]),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            RetrievalSpec::Server { .. } => SourceKind::Server,
            RetrievalSpec::Git { .. } => SourceKind::Git,
        }
    }

    /// Normalized identity of the source within its kind
    pub fn key(&self) -> &str {
        match self {
            RetrievalSpec::Server { source } => source,
            RetrievalSpec::Git { owner } => owner,
        }
    }
}

fn is_present(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

fn parse_server(dependency: &str, value: &Value) -> Result<RetrievalSpec, Vec<FieldError>> {
    match value {
        Value::Bool(true) => Ok(RetrievalSpec::Server {
            source: DEFAULT_SERVER_SOURCE.to_string(),
        }),
        Value::String(url) if !url.trim().is_empty() => Ok(RetrievalSpec::Server {
            source: url.trim().trim_end_matches('/').to_string(),
        }),
        other => Err(vec![FieldError::new(
            format!("{dependency}.server"),
            format!(
                "Server retrieval provided. Expected `true` or a string of the gem source endpoint. Received [{}]",
                type_name(other)
            ),
        )]),
    }
}

fn parse_git(dependency: &str, value: &Value) -> Result<RetrievalSpec, Vec<FieldError>> {
    match value {
        Value::String(owner) if !owner.trim().is_empty() => Ok(RetrievalSpec::Git {
            owner: owner.trim().to_string(),
        }),
        other => Err(vec![FieldError::new(
            format!("{dependency}.git"),
            format!(
                "Git retrieval provided. Expected string of the owner/organization of the gem. Received [{}]",
                type_name(other)
            ),
        )]),
    }
}
