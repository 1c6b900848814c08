//! Registry test utilities

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use gem_enforcer::logging::{LogLevel, LogSink};
use gem_enforcer::parser::InstalledVersionLookup;
use gem_enforcer::version::error::RegistryError;
use gem_enforcer::version::registry::{Registry, SourceKind};
use gem_enforcer::version::source::ProviderFactory;
use gem_enforcer::version::types::Version;

/// In-memory registry that counts fetches
pub struct StubRegistry {
    kind: SourceKind,
    versions: HashMap<String, Vec<String>>,
    calls: Arc<AtomicUsize>,
}

impl StubRegistry {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            versions: HashMap::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_versions(mut self, name: &str, versions: Vec<&str>) -> Self {
        self.versions.insert(
            name.to_string(),
            versions.into_iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    /// Shared counter of `fetch_versions` calls
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Registry for StubRegistry {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch_versions(&self, name: &str) -> Result<Vec<String>, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.versions.get(name) {
            Some(versions) => Ok(versions.clone()),
            None => Err(RegistryError::NotFound(name.to_string())),
        }
    }
}

/// Factory handing out pre-built registries by `(kind, key)`
#[derive(Default)]
pub struct StubFactory {
    registries: HashMap<(SourceKind, String), Arc<dyn Registry>>,
    created: AtomicUsize,
}

impl StubFactory {
    pub fn with_registry(mut self, kind: SourceKind, key: &str, registry: StubRegistry) -> Self {
        self.registries
            .insert((kind, key.to_string()), Arc::new(registry));
        self
    }

    /// Number of sources the factory was asked to build
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ProviderFactory for StubFactory {
    fn create(&self, kind: SourceKind, key: &str) -> Arc<dyn Registry> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.registries
            .get(&(kind, key.to_string()))
            .cloned()
            .unwrap_or_else(|| Arc::new(StubRegistry::new(kind)))
    }
}

/// Installed versions from a fixed table
pub struct StaticLookup(HashMap<String, Version>);

impl StaticLookup {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(name, version)| (name.to_string(), version.parse().unwrap()))
                .collect(),
        )
    }
}

impl InstalledVersionLookup for StaticLookup {
    fn installed_version(&self, name: &str) -> Option<Version> {
        self.0.get(name).cloned()
    }
}

/// Sink that keeps every failure message
#[derive(Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingSink {
    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries().into_iter().map(|(_, m)| m).collect()
    }
}

impl LogSink for RecordingSink {
    fn log(&self, level: LogLevel, message: &str) {
        self.entries
            .lock()
            .unwrap()
            .push((level, message.to_string()));
    }
}
