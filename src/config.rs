use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value;
use thiserror::Error;
use tracing::debug;

use crate::logging::LogLevel;
use crate::policy::Policy;
use crate::policy::error::FieldError;
use crate::policy::failure::Behavior;
use crate::policy::retrieval::RetrievalSpec;
use crate::policy::runner::InvalidConfigHandling;
use crate::policy::type_name;
use crate::version::registries::github;

// =============================================================================
// Locations and defaults
// =============================================================================

/// Environment variable pointing at the policy file
pub const CONFIG_ENV_VAR: &str = "GEM_ENFORCER_CONFIG";

/// Policy file looked up relative to the working directory
pub const LOCAL_CONFIG_PATH: &str = "config/gem_enforcer.yml";

/// Default lockfile read for installed versions
pub const DEFAULT_LOCKFILE: &str = "Gemfile.lock";

/// Default base URL for the GitHub REST API
pub const DEFAULT_GITHUB_API_URL: &str = github::DEFAULT_BASE_URL;

/// Token variables, in lookup order
pub const TOKEN_ENV_VARS: [&str; 2] = ["GITHUB_TOKEN", "BUNDLE_GITHUB__COM"];

/// Suffix Bundler appends to GitHub credentials
const OAUTH_SUFFIX: &str = ":x-oauth-basic";

const INVALID_CONFIG: &str = "invalid_config";
const LOG_LEVEL: &str = "log_level";
const BEHAVIOR: &str = "behavior";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse policy file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(
        "A GitHub token is required to retrieve [{}]. Set GITHUB_TOKEN or BUNDLE_GITHUB__COM",
        .0.join(", ")
    )]
    MissingToken(Vec<String>),

    #[error("Invalid policy file: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Invalid(Vec<FieldError>),
}

/// Runtime settings, read from the optional `settings` section
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EnforcerSettings {
    /// Lockfile holding installed versions
    pub lockfile: PathBuf,
    pub github_api_url: String,
    /// Never read from the file; see [`github_token`]
    #[serde(skip)]
    pub github_token: Option<String>,
}

impl Default for EnforcerSettings {
    fn default() -> Self {
        Self {
            lockfile: PathBuf::from(DEFAULT_LOCKFILE),
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            github_token: None,
        }
    }
}

impl EnforcerSettings {
    /// Fills the token from the environment
    pub fn with_env_token(mut self) -> Self {
        self.github_token = github_token();
        self
    }
}

/// Returns the GitHub token from `GITHUB_TOKEN` or `BUNDLE_GITHUB__COM`
pub fn github_token() -> Option<String> {
    github_token_with_env(|name| std::env::var(name).ok())
}

fn github_token_with_env(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    TOKEN_ENV_VARS
        .iter()
        .filter_map(|name| lookup(name))
        .map(|token| token.trim().to_string())
        .find(|token| !token.is_empty())
        .map(|token| match token.strip_suffix(OAUTH_SUFFIX) {
            Some(stripped) => stripped.to_string(),
            None => token,
        })
}

/// Returns the policy file path.
/// Uses $GEM_ENFORCER_CONFIG if set, otherwise ./config/gem_enforcer.yml when
/// it exists, otherwise $XDG_CONFIG_HOME/gem_enforcer/gem_enforcer.yml.
pub fn config_path() -> PathBuf {
    config_path_with_env(
        std::env::var(CONFIG_ENV_VAR).ok(),
        Path::new(LOCAL_CONFIG_PATH).exists(),
        dirs::config_dir(),
    )
}

fn config_path_with_env(
    explicit: Option<String>,
    local_exists: bool,
    config_dir: Option<PathBuf>,
) -> PathBuf {
    if let Some(path) = explicit.filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    if local_exists {
        return PathBuf::from(LOCAL_CONFIG_PATH);
    }

    config_dir
        .map(|dir| dir.join("gem_enforcer").join("gem_enforcer.yml"))
        .unwrap_or_else(|| PathBuf::from(LOCAL_CONFIG_PATH))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDocument {
    #[serde(default)]
    invalid_config: Option<Value>,
    #[serde(default)]
    settings: EnforcerSettings,
    #[serde(default)]
    gems: Option<IndexMap<String, Value>>,
}

/// A parsed policy file
///
/// Dependency entries are kept even when invalid; their errors are handled by
/// the enforcer according to `invalid_config`.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyDocument {
    pub invalid_config: InvalidConfigHandling,
    pub settings: EnforcerSettings,
    policies: Vec<Policy>,
}

impl PolicyDocument {
    /// Parses policy file content
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let raw: RawDocument = serde_yaml::from_str(content)?;

        let invalid_config =
            parse_invalid_config(raw.invalid_config.as_ref()).map_err(ConfigError::Invalid)?;

        let gems = match raw.gems {
            Some(gems) if !gems.is_empty() => gems,
            _ => {
                return Err(ConfigError::Invalid(vec![FieldError::new(
                    "gems",
                    "Expected a Hash of dependency names to policies",
                )]));
            }
        };

        let policies: Vec<Policy> = gems
            .iter()
            .map(|(name, value)| Policy::parse(name, value))
            .collect();
        debug!("Loaded {} dependency policies", policies.len());

        Ok(Self {
            invalid_config,
            settings: raw.settings,
            policies,
        })
    }

    /// Reads and parses the policy file at `path`
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Policies in file order
    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    /// Every dependency configuration error, in file order
    pub fn errors(&self) -> Vec<FieldError> {
        self.policies.iter().flat_map(Policy::errors).collect()
    }

    /// Dependencies retrieved from GitHub
    pub fn git_dependencies(&self) -> Vec<&str> {
        self.policies
            .iter()
            .filter(|p| matches!(p.retrieval(), Some(RetrievalSpec::Git { .. })))
            .map(Policy::name)
            .collect()
    }

    /// Fails when a git retrieval is configured but no token is available
    pub fn require_token(&self, token: Option<&str>) -> Result<(), ConfigError> {
        let git = self.git_dependencies();
        if git.is_empty() || token.is_some_and(|t| !t.is_empty()) {
            return Ok(());
        }
        Err(ConfigError::MissingToken(
            git.into_iter().map(str::to_string).collect(),
        ))
    }
}

fn parse_invalid_config(value: Option<&Value>) -> Result<InvalidConfigHandling, Vec<FieldError>> {
    let mut handling = InvalidConfigHandling::default();

    let map = match value {
        None | Some(Value::Null) => return Ok(handling),
        Some(Value::Mapping(map)) => map,
        Some(other) => {
            return Err(vec![FieldError::new(
                INVALID_CONFIG,
                format!("Expected to contain a Hash. Contained a [{}]", type_name(other)),
            )]);
        }
    };

    let mut errors = Vec::new();

    let unexpected: Vec<String> = map
        .keys()
        .filter(|k| !matches!(k.as_str(), Some(LOG_LEVEL | BEHAVIOR)))
        .map(|k| k.as_str().map_or_else(|| type_name(k).to_string(), str::to_string))
        .collect();
    if !unexpected.is_empty() {
        errors.push(FieldError::new(
            INVALID_CONFIG,
            format!(
                "Contained unexpected keys. Only [{LOG_LEVEL}, {BEHAVIOR}] are allowed. Found [{}]",
                unexpected.join(", ")
            ),
        ));
    }

    if let Some(level) = map.get(LOG_LEVEL).filter(|v| !v.is_null()) {
        match level.as_str().and_then(|s| s.parse::<LogLevel>().ok()) {
            Some(level) => handling.log_level = level,
            None => errors.push(FieldError::new(
                format!("{INVALID_CONFIG}.{LOG_LEVEL}"),
                format!("Value must be one of [{}]", LogLevel::ALLOWED.join(", ")),
            )),
        }
    }

    if let Some(behavior) = map.get(BEHAVIOR).filter(|v| !v.is_null()) {
        match behavior.as_str().and_then(Behavior::parse) {
            Some(behavior) => handling.behavior = behavior,
            None => errors.push(FieldError::new(
                format!("{INVALID_CONFIG}.{BEHAVIOR}"),
                format!("Value must be one of [{}]", Behavior::ALLOWED.join(", ")),
            )),
        }
    }

    if errors.is_empty() {
        Ok(handling)
    } else {
        Err(errors)
    }
}
