//! Installed version lookup trait definition

#[cfg(test)]
use mockall::automock;

use crate::version::types::Version;

/// Resolves the version of a dependency that is actually installed
#[cfg_attr(test, automock)]
pub trait InstalledVersionLookup: Send + Sync {
    /// Returns the installed version, or `None` when the dependency is not installed
    fn installed_version(&self, name: &str) -> Option<Version>;
}

/// Error type for parsing operations
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Failed to read the file
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid syntax in the file
    #[error("Invalid syntax: {0}")]
    InvalidSyntax(String),
}
