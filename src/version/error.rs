use thiserror::Error;

/// Failure to retrieve candidate versions from a remote source
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Request to version source failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The source asked us to back off; the run does not retry
    #[error("Version source rate limited the request (retry after {retry_after_secs:?} seconds)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Unknown gem, or GitHub repository `owner/name`
    #[error("No such dependency at version source: {0}")]
    NotFound(String),

    #[error("Version source returned an unusable response: {0}")]
    InvalidResponse(String),
}
