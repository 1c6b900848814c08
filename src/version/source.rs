//! Memoized version sources
//!
//! A [`SourceRegistry`] hands out one [`VersionSource`] per distinct
//! `(kind, key)`. Each source fetches a dependency's versions at most once per
//! process; concurrent first callers wait for the same fetch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::version::error::RegistryError;
use crate::version::registries::{GitHubRegistry, ServerRegistry};
use crate::version::registry::{Registry, SourceKind};
use crate::version::types::VersionSet;

/// Identity of a version source
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub kind: SourceKind,
    pub key: String,
}

/// Builds the registry backing a new source
pub trait ProviderFactory: Send + Sync {
    fn create(&self, kind: SourceKind, key: &str) -> Arc<dyn Registry>;
}

/// Creates HTTP registries: gem servers by URL, GitHub releases by owner
pub struct HttpProviderFactory {
    github_base_url: String,
    github_token: Option<String>,
}

impl HttpProviderFactory {
    pub fn new(github_base_url: &str, github_token: Option<String>) -> Self {
        Self {
            github_base_url: github_base_url.to_string(),
            github_token,
        }
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn create(&self, kind: SourceKind, key: &str) -> Arc<dyn Registry> {
        match kind {
            SourceKind::Server => Arc::new(ServerRegistry::new(key)),
            SourceKind::Git => Arc::new(GitHubRegistry::new(
                &self.github_base_url,
                key,
                self.github_token.clone(),
            )),
        }
    }
}

/// Cached candidate versions from one registry
pub struct VersionSource {
    key: SourceKey,
    registry: Arc<dyn Registry>,
    versions: Mutex<HashMap<String, Arc<OnceCell<VersionSet>>>>,
}

impl VersionSource {
    pub fn new(key: SourceKey, registry: Arc<dyn Registry>) -> Self {
        Self {
            key,
            registry,
            versions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the candidate versions of `name`, fetching them on first use
    ///
    /// Failed fetches are not cached; the next caller retries.
    pub async fn fetch_versions(&self, name: &str) -> Result<VersionSet, RegistryError> {
        let cell = {
            let mut versions = self
                .versions
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            versions.entry(name.to_string()).or_default().clone()
        };

        let set = cell
            .get_or_try_init(|| async {
                let raw = self.registry.fetch_versions(name).await?;
                let set = VersionSet::from_raw(&raw);
                info!(
                    "Fetched {} versions ({} usable) for {} from {} {}",
                    raw.len(),
                    set.len(),
                    name,
                    self.key.kind.as_str(),
                    self.key.key
                );
                Ok::<_, RegistryError>(set)
            })
            .await?;

        Ok(set.clone())
    }
}

/// Process-lifetime table of version sources, one per distinct source
pub struct SourceRegistry {
    factory: Arc<dyn ProviderFactory>,
    sources: Mutex<HashMap<SourceKey, Arc<VersionSource>>>,
}

impl SourceRegistry {
    pub fn new(factory: Arc<dyn ProviderFactory>) -> Self {
        Self {
            factory,
            sources: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the source for `(kind, key)`, creating it on first request
    pub fn resolve(&self, kind: SourceKind, key: &str) -> Arc<VersionSource> {
        let source_key = SourceKey {
            kind,
            key: key.to_string(),
        };

        let mut sources = self.sources.lock().unwrap_or_else(PoisonError::into_inner);
        sources
            .entry(source_key.clone())
            .or_insert_with(|| {
                debug!("Creating {} source for {}", kind.as_str(), key);
                let registry = self.factory.create(kind, key);
                debug_assert_eq!(registry.kind(), kind);
                Arc::new(VersionSource::new(source_key, registry))
            })
            .clone()
    }

    /// Number of distinct sources created so far
    pub fn len(&self) -> usize {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::registry::MockRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Registry that counts fetches and answers slowly
    struct CountingRegistry {
        kind: SourceKind,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Registry for CountingRegistry {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn fetch_versions(&self, _name: &str) -> Result<Vec<String>, RegistryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(vec!["1.0.0".to_string(), "2.0.0".to_string()])
        }
    }

    struct CountingFactory {
        created: AtomicUsize,
        calls: Arc<AtomicUsize>,
    }

    impl CountingFactory {
        fn new() -> Self {
            Self {
                created: AtomicUsize::new(0),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ProviderFactory for CountingFactory {
        fn create(&self, kind: SourceKind, _key: &str) -> Arc<dyn Registry> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Arc::new(CountingRegistry {
                kind,
                calls: self.calls.clone(),
            })
        }
    }

    #[test]
    fn resolve_returns_same_source_for_same_key() {
        let factory = Arc::new(CountingFactory::new());
        let registry = SourceRegistry::new(factory.clone());

        let first = registry.resolve(SourceKind::Server, "https://rubygems.org");
        let second = registry.resolve(SourceKind::Server, "https://rubygems.org");
        let git = registry.resolve(SourceKind::Git, "https://rubygems.org");

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &git));
        assert_eq!(registry.len(), 2);
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    }

    struct MockFactory;

    impl ProviderFactory for MockFactory {
        fn create(&self, kind: SourceKind, _key: &str) -> Arc<dyn Registry> {
            let mut mock = MockRegistry::new();
            mock.expect_kind().times(1).return_const(kind);
            Arc::new(mock)
        }
    }

    #[test]
    fn resolve_checks_registry_kind_once_per_source() {
        let registry = SourceRegistry::new(Arc::new(MockFactory));

        let git = registry.resolve(SourceKind::Git, "acme");
        let again = registry.resolve(SourceKind::Git, "acme");

        assert!(Arc::ptr_eq(&git, &again));
        assert_eq!(git.key.kind, SourceKind::Git);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_first_fetch_hits_registry_once() {
        let factory = Arc::new(CountingFactory::new());
        let registry = SourceRegistry::new(factory.clone());
        let source = registry.resolve(SourceKind::Server, "https://rubygems.org");

        let (a, b) = tokio::join!(source.fetch_versions("rails"), source.fetch_versions("rails"));
        let c = source.fetch_versions("rails").await.unwrap();

        assert_eq!(a.unwrap(), c);
        assert_eq!(b.unwrap(), c);
        assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
        assert_eq!(c.max(), Some(&"2.0.0".parse().unwrap()));
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let mut mock = MockRegistry::new();
        let mut attempts = 0;
        mock.expect_fetch_versions().times(2).returning(move |name| {
            attempts += 1;
            if attempts == 1 {
                Err(RegistryError::NotFound(name.to_string()))
            } else {
                Ok(vec!["3.0.0".to_string()])
            }
        });
        let source = VersionSource::new(
            SourceKey {
                kind: SourceKind::Git,
                key: "acme".to_string(),
            },
            Arc::new(mock),
        );

        assert!(matches!(
            source.fetch_versions("widget").await,
            Err(RegistryError::NotFound(_))
        ));
        assert_eq!(source.fetch_versions("widget").await.unwrap().len(), 1);
    }
}
