//! Built-in plugins

use crate::canonical;
use crate::merge::ResolverTable;
use crate::model::{Definition, DefinitionKind, ImportedDocument, LoadOutput};
use crate::plugin::{HookFuture, LoadPlugin, MergePlugin, Plugin, decline, produce};
use crate::{Error, Result};
use dashmap::DashSet;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Remembers every id it has been asked to load, across runs.
///
/// The first load of an id is let through; later ones are answered with an
/// empty document. The resolver already loads each id once per run, so this
/// only matters when one instance is shared by several runs. Register it
/// after the plugins that actually fetch sources, since the last produced
/// result wins.
#[derive(Debug, Default)]
pub struct CachePlugin {
    seen: DashSet<String>,
}

impl CachePlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Forget everything, so the next run loads from scratch
    pub fn clear(&self) {
        self.seen.clear();
    }
}

impl Plugin for CachePlugin {
    fn name(&self) -> &str {
        "cache"
    }
}

impl LoadPlugin for CachePlugin {
    fn load<'a>(&'a self, id: &'a str) -> HookFuture<'a, LoadOutput> {
        if self.seen.insert(id.to_string()) {
            decline()
        } else {
            debug!("Cache hit, skipping {}", id);
            produce(LoadOutput::Imported(ImportedDocument::empty()))
        }
    }
}

/// Serves SDL from memory, keyed by canonical id
#[derive(Debug, Clone, Default)]
pub struct MemorySources {
    sources: HashMap<String, String>,
}

impl MemorySources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, id: impl Into<String>, sdl: impl Into<String>) -> Self {
        self.insert(id, sdl);
        self
    }

    pub fn insert(&mut self, id: impl Into<String>, sdl: impl Into<String>) {
        self.sources.insert(id.into(), sdl.into());
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Plugin for MemorySources {
    fn name(&self) -> &str {
        "memory"
    }
}

impl LoadPlugin for MemorySources {
    fn load<'a>(&'a self, id: &'a str) -> HookFuture<'a, LoadOutput> {
        match self.sources.get(id) {
            Some(sdl) => produce(LoadOutput::Source(sdl.clone())),
            None => decline(),
        }
    }
}

/// Called with the id of every remote schema before it is fetched
pub type FetchLog = Arc<dyn Fn(&str) + Send + Sync>;

/// Fetches `http://` and `https://` ids; every other scheme is declined.
///
/// Each id is fetched at most once per plugin instance. Later loads of the
/// same id are answered with an empty document. Responses outside 2xx are
/// errors.
#[derive(Default)]
pub struct HttpPlugin {
    client: reqwest::Client,
    cache: CachePlugin,
    log: Option<FetchLog>,
}

impl HttpPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (timeouts, headers, proxies)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            ..Self::default()
        }
    }

    pub fn with_log(mut self, log: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.log = Some(Arc::new(log));
        self
    }

    /// Whether `id` has been requested already
    pub fn contains(&self, id: &str) -> bool {
        self.cache.contains(id)
    }

    async fn fetch(&self, id: &str) -> Result<String> {
        let response = self.client.get(id).send().await.map_err(|e| Error::Fetch {
            id: id.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch {
                id: id.to_string(),
                message: format!(
                    "{} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or_default()
                ),
            });
        }

        response.text().await.map_err(|e| Error::Fetch {
            id: id.to_string(),
            message: e.to_string(),
        })
    }
}

impl std::fmt::Debug for HttpPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPlugin")
            .field("fetched", &self.cache.len())
            .field("log", &self.log.is_some())
            .finish()
    }
}

impl Plugin for HttpPlugin {
    fn name(&self) -> &str {
        "http"
    }
}

impl LoadPlugin for HttpPlugin {
    fn load<'a>(&'a self, id: &'a str) -> HookFuture<'a, LoadOutput> {
        if !matches!(canonical::scheme(id), Some("http" | "https")) {
            return decline();
        }

        Box::pin(async move {
            if let Some(log) = &self.log {
                log(id);
            }
            if let Some(cached) = self.cache.load(id).await? {
                return Ok(Some(cached));
            }

            debug!("Fetching {}", id);
            let source = self.fetch(id).await?;
            Ok(Some(LoadOutput::Source(source)))
        })
    }
}

/// Merge plugin backed by a [`ResolverTable`].
///
/// Answers only when both definitions share a kind the table handles, so
/// anything else still reaches the engine's own resolvers.
#[derive(Debug, Clone)]
pub struct PerKindMerge {
    resolvers: ResolverTable,
}

impl PerKindMerge {
    pub fn new(resolvers: ResolverTable) -> Self {
        Self { resolvers }
    }
}

impl Plugin for PerKindMerge {
    fn name(&self) -> &str {
        "per-kind"
    }
}

impl MergePlugin for PerKindMerge {
    fn merge_types<'a>(
        &'a self,
        incoming: &'a Definition,
        survivor: &'a Definition,
    ) -> HookFuture<'a, Definition> {
        let kind = DefinitionKind::of(incoming);
        if kind != DefinitionKind::of(survivor) || !self.resolvers.handles(kind) {
            return decline();
        }

        let resolved = self.resolvers.resolve(incoming.clone(), survivor.clone());
        Box::pin(async move { resolved.map(Some) })
    }
}
