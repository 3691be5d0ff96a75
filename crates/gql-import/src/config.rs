//! Build options and configuration files

use crate::merge::DuplicatePolicy;
use crate::plugin::{LoadPlugin, MergePlugin};
use crate::plugins::{CachePlugin, HttpPlugin, MemorySources};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

/// Options for [`build_document`](crate::build_document)
#[derive(Clone, Default)]
pub struct BuildOptions {
    /// Directory relative root ids are resolved against (default: working directory)
    pub base_dir: Option<PathBuf>,
    /// Custom import directive pattern, see [`DirectiveScanner::with_pattern`](crate::DirectiveScanner::with_pattern)
    pub import_pattern: Option<String>,
    /// Policy for members defined twice in merged types
    pub duplicate_policy: DuplicatePolicy,
    /// Load plugins, lowest priority first
    pub load_plugins: Vec<Arc<dyn LoadPlugin>>,
    /// Merge plugins, lowest priority first
    pub merge_plugins: Vec<Arc<dyn MergePlugin>>,
}

impl BuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn import_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.import_pattern = Some(pattern.into());
        self
    }

    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Register a load plugin; it overrides those registered before it
    pub fn load_plugin(mut self, plugin: Arc<dyn LoadPlugin>) -> Self {
        self.load_plugins.push(plugin);
        self
    }

    /// Register a merge plugin; it overrides those registered before it
    pub fn merge_plugin(mut self, plugin: Arc<dyn MergePlugin>) -> Self {
        self.merge_plugins.push(plugin);
        self
    }
}

impl std::fmt::Debug for BuildOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildOptions")
            .field("base_dir", &self.base_dir)
            .field("import_pattern", &self.import_pattern)
            .field("duplicate_policy", &self.duplicate_policy)
            .field(
                "load_plugins",
                &self.load_plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field(
                "merge_plugins",
                &self.merge_plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Configuration file format (YAML or JSON)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportConfig {
    pub base_dir: Option<PathBuf>,
    pub import_pattern: Option<String>,
    pub duplicate_policy: DuplicatePolicy,
    /// Share an "already loaded" cache between runs
    pub cache: bool,
    /// Fetch `http://` and `https://` imports
    pub http: bool,
    /// Inline sources keyed by canonical id
    pub sources: BTreeMap<String, String>,
}

impl ImportConfig {
    /// Load a configuration file; `.yaml`/`.yml` is YAML, anything else JSON
    pub fn from_file(path: &Path) -> Result<Self> {
        trace!("Loading configuration from {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.display().to_string(),
            source,
        })?;

        if path
            .extension()
            .map(|e| e == "yaml" || e == "yml")
            .unwrap_or(false)
        {
            Self::from_yaml(&content)
        } else {
            Self::from_json(&content)
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("JSON parse error: {}", e)))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Config(format!("YAML parse error: {}", e)))
    }

    /// Turn the configuration into build options.
    ///
    /// Plugins are registered as remote fetching, inline sources, cache, so
    /// inline sources shadow remote ones and the cache overrides both.
    pub fn into_options(self) -> BuildOptions {
        let mut options = BuildOptions {
            base_dir: self.base_dir,
            import_pattern: self.import_pattern,
            duplicate_policy: self.duplicate_policy,
            ..BuildOptions::default()
        };

        if self.http {
            options = options.load_plugin(Arc::new(HttpPlugin::new()));
        }

        if !self.sources.is_empty() {
            let mut sources = MemorySources::new();
            for (id, sdl) in self.sources {
                sources.insert(id, sdl);
            }
            options = options.load_plugin(Arc::new(sources));
        }

        if self.cache {
            options = options.load_plugin(Arc::new(CachePlugin::new()));
        }

        options
    }
}
