//! Gem server compact index (`/versions`) registry implementation

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::version::error::RegistryError;
use crate::version::registry::{Registry, SourceKind};

/// Default gem server source
pub const DEFAULT_SERVER_SOURCE: &str = "https://rubygems.org";

/// Registry implementation for a gem server's compact index
///
/// The whole index is downloaded once per instance and shared by every
/// dependency looked up through it.
pub struct ServerRegistry {
    client: reqwest::Client,
    source: String,
    index: OnceCell<Vec<String>>,
}

impl ServerRegistry {
    /// Creates a new ServerRegistry for the given source URL
    pub fn new(source: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("gem-enforcer")
                .build()
                .expect("Failed to create HTTP client"),
            source: source.trim_end_matches('/').to_string(),
            index: OnceCell::new(),
        }
    }

    async fn index(&self) -> Result<&[String], RegistryError> {
        let lines = self
            .index
            .get_or_try_init(|| self.download_index())
            .await?;
        Ok(lines.as_slice())
    }

    async fn download_index(&self) -> Result<Vec<String>, RegistryError> {
        let url = format!("{}/versions", self.source);
        debug!("Downloading compact index from {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();

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
            warn!("Gem server returned status {}: {}", status, url);
            return Err(RegistryError::InvalidResponse(format!(
                "Unexpected status: {}",
                status
            )));
        }

        let body = response.text().await?;
        Ok(body.lines().map(str::to_string).collect())
    }
}

#[async_trait::async_trait]
impl Registry for ServerRegistry {
    fn kind(&self) -> SourceKind {
        SourceKind::Server
    }

    async fn fetch_versions(&self, name: &str) -> Result<Vec<String>, RegistryError> {
        let index = self.index().await?;
        Ok(versions_from_index(index, name))
    }
}

/// Collects the versions listed for `name` in compact index lines
///
/// Lines look like `rails 7.0.0,7.0.1,7.1.0-java <checksum>`. Everything up to
/// the `---` separator is header. A version prefixed with `-` was yanked and
/// cancels an earlier listing. Platform suffixes are dropped.
fn versions_from_index(lines: &[String], name: &str) -> Vec<String> {
    let body_start = lines
        .iter()
        .position(|line| line.trim() == "---")
        .map_or(0, |i| i + 1);

    let mut versions: Vec<String> = Vec::new();
    for line in &lines[body_start..] {
        let mut fields = line.split_whitespace();
        if fields.next() != Some(name) {
            continue;
        }
        let Some(list) = fields.next() else {
            continue;
        };

        for entry in list.split(',') {
            if let Some(yanked) = entry.strip_prefix('-') {
                let yanked = strip_platform(yanked);
                versions.retain(|v| v != yanked);
            } else {
                let version = strip_platform(entry).to_string();
                if !versions.contains(&version) {
                    versions.push(version);
                }
            }
        }
    }

    versions
}

fn strip_platform(entry: &str) -> &str {
    entry.split_once('-').map_or(entry, |(version, _)| version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    const INDEX: &str = "created_at: 2024-01-01T00:00:00Z\n---\nrails 7.0.0,7.0.1 abc\nrails-html 1.0.0 def\nrails 7.1.0,7.1.0-java,-7.0.1 123\nrack 3.0.0 456\n";

    #[test]
    fn versions_from_index_matches_exact_name_and_applies_yanks() {
        let lines: Vec<String> = INDEX.lines().map(str::to_string).collect();

        assert_eq!(
            versions_from_index(&lines, "rails"),
            vec!["7.0.0".to_string(), "7.1.0".to_string()]
        );
        assert_eq!(versions_from_index(&lines, "rack"), vec!["3.0.0".to_string()]);
        assert!(versions_from_index(&lines, "missing").is_empty());
    }

    #[tokio::test]
    async fn fetch_versions_downloads_index_once_for_many_names() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/versions")
            .with_status(200)
            .with_body(INDEX)
            .expect(1)
            .create_async()
            .await;

        let registry = ServerRegistry::new(&format!("{}/", server.url()));
        let rails = registry.fetch_versions("rails").await.unwrap();
        let rack = registry.fetch_versions("rack").await.unwrap();

        mock.assert_async().await;
        assert_eq!(rails, vec!["7.0.0".to_string(), "7.1.0".to_string()]);
        assert_eq!(rack, vec!["3.0.0".to_string()]);
    }

    #[tokio::test]
    async fn fetch_versions_returns_invalid_response_for_server_error() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/versions")
            .with_status(500)
            .create_async()
            .await;

        let registry = ServerRegistry::new(&server.url());
        let result = registry.fetch_versions("rails").await;

        mock.assert_async().await;
        assert!(matches!(result, Err(RegistryError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn fetch_versions_returns_rate_limited_for_429() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/versions")
            .with_status(429)
            .with_header("retry-after", "30")
            .create_async()
            .await;

        let registry = ServerRegistry::new(&server.url());
        let result = registry.fetch_versions("rails").await;

        mock.assert_async().await;
        assert!(matches!(
            result,
            Err(RegistryError::RateLimited {
                retry_after_secs: Some(30)
            })
        ));
    }
}
