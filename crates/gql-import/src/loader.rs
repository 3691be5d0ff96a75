//! Recursive import resolution
//!
//! Starting from a root id, every reachable source is loaded and parsed
//! exactly once. The import graph may contain cycles: an id is marked as
//! loading before any await happens, and every later visit of the same id
//! returns immediately.

use crate::canonical::{self, directory_base, file_path};
use crate::config::BuildOptions;
use crate::model::{ImportReference, ImportedDocument, LoadOutput, SchemaDocument};
use crate::plugin::{self, LoadPlugin};
use crate::scanner::DirectiveScanner;
use crate::{Error, Result};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use indexmap::IndexMap;
use std::future::{self, Future};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, trace};

/// Built-in filesystem behaviour used when no plugin answers
#[derive(Debug, Clone)]
pub struct DefaultLoader {
    base: String,
}

impl DefaultLoader {
    /// Resolve relative roots against `base_dir`, or the working directory
    pub fn new(base_dir: Option<&Path>) -> Self {
        let dir = match base_dir {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        };
        Self {
            base: directory_base(&dir),
        }
    }

    /// Base id relative roots are joined onto
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn resolve_id(&self, importee: &str, importer: Option<&str>) -> String {
        canonical::resolve_reference(importee, importer, &self.base)
    }

    /// Read `id` from disk. Only scheme-less and `file://` ids are supported.
    pub async fn load(&self, id: &str) -> Result<LoadOutput> {
        let Some(path) = file_path(id) else {
            return Err(Error::UnsupportedProtocol {
                protocol: canonical::scheme(id).unwrap_or_default().to_string(),
                id: id.to_string(),
            });
        };

        trace!("Reading schema file: {:?}", path);
        let source = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| Error::Read {
                path: path.display().to_string(),
                source,
            })?;

        Ok(LoadOutput::Source(source))
    }
}

impl Default for DefaultLoader {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Per-id memo state
#[derive(Debug)]
enum Slot {
    Loading,
    Loaded(ImportedDocument),
}

/// Resolves a root id into the set of documents it transitively imports
#[derive(Clone)]
pub struct ImportLoader {
    inner: Arc<LoaderInner>,
}

struct LoaderInner {
    plugins: Vec<Arc<dyn LoadPlugin>>,
    default: DefaultLoader,
    scanner: DirectiveScanner,
}

impl ImportLoader {
    /// Create a loader from build options.
    ///
    /// Fails when a custom import pattern does not compile.
    pub fn new(options: &BuildOptions) -> Result<Self> {
        let scanner = match &options.import_pattern {
            Some(pattern) => DirectiveScanner::with_pattern(pattern)?,
            None => DirectiveScanner::new(),
        };

        Ok(Self::with_parts(
            options.load_plugins.clone(),
            DefaultLoader::new(options.base_dir.as_deref()),
            scanner,
        ))
    }

    pub fn with_parts(
        plugins: Vec<Arc<dyn LoadPlugin>>,
        default: DefaultLoader,
        scanner: DirectiveScanner,
    ) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                plugins,
                default,
                scanner,
            }),
        }
    }

    /// Load `root_id` and everything it imports.
    ///
    /// Any failing load, parse or hook aborts the whole run.
    pub async fn resolve(&self, root_id: &str) -> Result<Resolution> {
        let run = Arc::new(Run {
            inner: Arc::clone(&self.inner),
            memo: DashMap::new(),
        });

        let root = run.resolve_id(root_id, None).await?;
        info!("Resolving imports from {}", root);

        Arc::clone(&run)
            .visit(ImportReference::all(root.clone()))
            .await?;

        let resolution = Resolution::collect(root, &run.memo)?;
        info!(
            "Resolved {} document(s) from {}",
            resolution.len(),
            resolution.root()
        );
        Ok(resolution)
    }
}

impl std::fmt::Debug for ImportLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportLoader")
            .field(
                "plugins",
                &self.inner.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("default", &self.inner.default)
            .finish()
    }
}

type VisitFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// State of one resolution run
struct Run {
    inner: Arc<LoaderInner>,
    memo: DashMap<String, Slot>,
}

impl Run {
    async fn resolve_id(&self, importee: &str, importer: Option<&str>) -> Result<String> {
        let inner = &self.inner;
        plugin::invoke(
            &inner.plugins,
            "resolve_id",
            |plugin| plugin.resolve_id(importee, importer),
            || future::ready(Ok(inner.default.resolve_id(importee, importer))),
        )
        .await
    }

    async fn load(&self, id: &str) -> Result<ImportedDocument> {
        let inner = &self.inner;
        let output = plugin::invoke(
            &inner.plugins,
            "load",
            |plugin| plugin.load(id),
            || inner.default.load(id),
        )
        .await?;

        match output {
            LoadOutput::Imported(imported) => Ok(imported),
            LoadOutput::Source(source) => inner.scanner.parse(id, &source),
        }
    }

    async fn transform(
        &self,
        document: SchemaDocument,
        origin: &ImportReference,
    ) -> Result<SchemaDocument> {
        let transformed = plugin::dispatch(&self.inner.plugins, "transform", |plugin| {
            plugin.transform(&document, origin)
        })
        .await?;
        Ok(transformed.unwrap_or(document))
    }

    fn visit(self: Arc<Self>, origin: ImportReference) -> VisitFuture {
        Box::pin(async move {
            match self.memo.entry(origin.id.clone()) {
                Entry::Occupied(_) => {
                    debug!("Already loading or loaded: {}", origin.id);
                    return Ok(());
                }
                Entry::Vacant(slot) => {
                    slot.insert(Slot::Loading);
                }
            }

            let ImportedDocument { imports, document } = self.load(&origin.id).await?;
            let document = match document {
                Some(document) => Some(self.transform(document, &origin).await?),
                None => None,
            };
            debug!(
                "Loaded {} with {} import(s)",
                origin.id,
                imports.len()
            );

            let count = imports.len();
            self.memo.insert(
                origin.id.clone(),
                Slot::Loaded(ImportedDocument::new(imports.clone(), document)),
            );

            let mut children = JoinSet::new();
            for (index, child) in imports.into_iter().enumerate() {
                let run = Arc::clone(&self);
                let parent = origin.id.clone();
                children.spawn(async move {
                    let id = run.resolve_id(&child.id, Some(&parent)).await?;
                    let child = ImportReference { id, ..child };
                    Arc::clone(&run).visit(child.clone()).await?;
                    Ok::<_, Error>((index, child))
                });
            }

            let mut resolved: Vec<Option<ImportReference>> = vec![None; count];
            while let Some(joined) = children.join_next().await {
                let (index, child) = joined.map_err(|e| Error::Task(e.to_string()))??;
                resolved[index] = Some(child);
            }

            // Record canonical ids so the graph can be walked afterwards
            if let Some(mut slot) = self.memo.get_mut(&origin.id) {
                if let Slot::Loaded(loaded) = slot.value_mut() {
                    loaded.imports = resolved.into_iter().flatten().collect();
                }
            }

            Ok(())
        })
    }
}

/// All documents reachable from a root, keyed by canonical id.
///
/// Ordered by a pre-order walk of the import graph: the root first, then
/// each import in declaration order.
#[derive(Debug, Clone)]
pub struct Resolution {
    root: String,
    documents: IndexMap<String, ImportedDocument>,
}

impl Resolution {
    fn collect(root: String, memo: &DashMap<String, Slot>) -> Result<Self> {
        let mut documents = IndexMap::new();
        let mut pending = vec![root.clone()];

        while let Some(id) = pending.pop() {
            if documents.contains_key(&id) {
                continue;
            }
            let Some((id, slot)) = memo.remove(&id) else {
                continue;
            };
            match slot {
                Slot::Loaded(imported) => {
                    pending.extend(imported.imports.iter().rev().map(|i| i.id.clone()));
                    documents.insert(id, imported);
                }
                Slot::Loading => {
                    return Err(Error::Task(format!("import of '{}' never settled", id)));
                }
            }
        }

        Ok(Self { root, documents })
    }

    /// Canonical id of the root document
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ImportedDocument> {
        self.documents.get(id)
    }

    /// Canonical ids in resolution order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ImportedDocument)> {
        self.documents.iter().map(|(id, doc)| (id.as_str(), doc))
    }

    /// Parsed documents in resolution order, skipping empty sources
    pub fn documents(&self) -> impl Iterator<Item = &SchemaDocument> {
        self.documents.values().filter_map(|doc| doc.document.as_ref())
    }

    pub fn into_documents(self) -> Vec<SchemaDocument> {
        self.documents
            .into_values()
            .filter_map(|doc| doc.document)
            .collect()
    }

    /// Each id with the canonical ids it imports
    pub fn graph(&self) -> Vec<(&str, Vec<&str>)> {
        self.iter()
            .map(|(id, doc)| (id, doc.imports.iter().map(|i| i.id.as_str()).collect()))
            .collect()
    }
}
