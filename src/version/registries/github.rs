//! GitHub Releases API registry implementation

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::version::error::RegistryError;
use crate::version::registry::{Registry, SourceKind};

/// Default base URL for GitHub API
pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Releases requested per page
const PER_PAGE: u32 = 50;

/// Response from GitHub Releases API
#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

/// Registry implementation for GitHub Releases API
///
/// Repositories are resolved as `{owner}/{dependency name}`.
pub struct GitHubRegistry {
    client: reqwest::Client,
    base_url: String,
    owner: String,
    token: Option<String>,
    /// Matches `<url>; rel="next"` in a Link header
    next_link_re: Regex,
    /// Matches the first `<digits>.`, where the version part of a tag begins
    release_start_re: Regex,
}

impl GitHubRegistry {
    /// Creates a new GitHubRegistry for `owner` with a custom base URL
    pub fn new(base_url: &str, owner: &str, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("gem-enforcer")
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            token,
            next_link_re: Regex::new(r#"<([^>]+)>;\s*rel="next""#).unwrap(),
            release_start_re: Regex::new(r"\d+\.").unwrap(),
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<(Vec<Release>, Option<String>), RegistryError> {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(url.to_string()));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(RegistryError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !status.is_success() {
            warn!("GitHub API returned status {}: {}", status, url);
            return Err(RegistryError::InvalidResponse(format!(
                "Unexpected status: {}",
                status
            )));
        }

        let next = response
            .headers()
            .get("link")
            .and_then(|v| v.to_str().ok())
            .and_then(|link| self.next_link_re.captures(link))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());

        let releases: Vec<Release> = response.json().await.map_err(|e| {
            warn!("Failed to parse GitHub releases response: {}", e);
            RegistryError::InvalidResponse(e.to_string())
        })?;

        Ok((releases, next))
    }

    /// Drops everything before the first `<digits>.` (`release2-1.0` -> `1.0`)
    ///
    /// Tags without a dot are returned unchanged.
    fn clean_tag(&self, tag: &str) -> String {
        match self.release_start_re.find(tag) {
            Some(m) => tag[m.start()..].to_string(),
            None => tag.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Registry for GitHubRegistry {
    fn kind(&self) -> SourceKind {
        SourceKind::Git
    }

    async fn fetch_versions(&self, name: &str) -> Result<Vec<String>, RegistryError> {
        let repo = format!("{}/{}", self.owner, name);
        let mut next = Some(format!(
            "{}/repos/{}/releases?per_page={}",
            self.base_url, repo, PER_PAGE
        ));
        let mut versions = Vec::new();

        while let Some(url) = next {
            let (releases, next_page) = self.fetch_page(&url).await.map_err(|e| match e {
                RegistryError::NotFound(_) => RegistryError::NotFound(repo.clone()),
                other => other,
            })?;
            debug!("Fetched {} releases for {}", releases.len(), repo);
            versions.extend(releases.iter().map(|r| self.clean_tag(&r.tag_name)));
            next = next_page;
        }

        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[test]
    fn clean_tag_strips_non_numeric_prefix() {
        let registry = GitHubRegistry::new(DEFAULT_BASE_URL, "acme", None);

        assert_eq!(registry.clean_tag("v4.1.0"), "4.1.0");
        assert_eq!(registry.clean_tag("release-2.0"), "2.0");
        assert_eq!(registry.clean_tag("3.0.0"), "3.0.0");
        assert_eq!(registry.clean_tag("release2-1.0"), "1.0");
        assert_eq!(registry.clean_tag("v2"), "v2");
    }

    #[tokio::test]
    async fn fetch_versions_follows_pagination() {
        let mut server = Server::new_async().await;
        let next_url = format!("{}/repos/acme/widget/releases?per_page=50&page=2", server.url());

        let first = server
            .mock("GET", "/repos/acme/widget/releases")
            .match_query(Matcher::Exact("per_page=50".into()))
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("link", &format!("<{}>; rel=\"next\"", next_url))
            .with_body(r#"[{"tag_name": "v2.0.0"}, {"tag_name": "v1.1.0"}]"#)
            .create_async()
            .await;

        let second = server
            .mock("GET", "/repos/acme/widget/releases")
            .match_query(Matcher::Exact("per_page=50&page=2".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"tag_name": "v1.0.0"}]"#)
            .create_async()
            .await;

        let registry = GitHubRegistry::new(&server.url(), "acme", Some("secret".to_string()));
        let versions = registry.fetch_versions("widget").await.unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(
            versions,
            vec!["2.0.0".to_string(), "1.1.0".to_string(), "1.0.0".to_string()]
        );
    }

    #[tokio::test]
    async fn fetch_versions_returns_not_found_for_nonexistent_repo() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/repos/acme/missing/releases")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"message": "Not Found"}"#)
            .create_async()
            .await;

        let registry = GitHubRegistry::new(&server.url(), "acme", None);
        let result = registry.fetch_versions("missing").await;

        mock.assert_async().await;
        assert!(matches!(result, Err(RegistryError::NotFound(repo)) if repo == "acme/missing"));
    }
}
