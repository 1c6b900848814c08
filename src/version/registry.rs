//! Registry trait for fetching candidate versions from a remote source

#[cfg(test)]
use mockall::automock;

use crate::version::error::RegistryError;

/// Kind of remote source a dependency's versions are retrieved from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Package registry serving a compact `versions` index
    Server,
    /// Hosted git releases (GitHub)
    Git,
}

impl SourceKind {
    /// Returns the string representation of the source kind
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Server => "server",
            SourceKind::Git => "git",
        }
    }
}

/// Trait for fetching package versions from a registry
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Registry: Send + Sync {
    /// Returns the kind of source this implementation handles
    fn kind(&self) -> SourceKind;

    /// Fetches all published version strings for a dependency
    ///
    /// # Arguments
    /// * `name` - The dependency name (e.g., "rails")
    ///
    /// # Returns
    /// * `Ok(Vec<String>)` - Raw version strings in no particular order
    /// * `Err(RegistryError)` - If the fetch fails
    async fn fetch_versions(&self, name: &str) -> Result<Vec<String>, RegistryError>;
}
