//! Plugin roles and dispatch
//!
//! Plugins are consulted in registration order and every one of them is
//! called. The last plugin to produce a value wins, so plugins registered
//! later take precedence. When none produces anything the caller's default
//! behaviour applies.

use crate::model::{Definition, ImportReference, LoadOutput, SchemaDocument};
use crate::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::trace;

/// Future returned by plugin hooks. `Ok(None)` means the plugin declines.
pub type HookFuture<'a, T> = Pin<Box<dyn Future<Output = Result<Option<T>>> + Send + 'a>>;

/// A hook result meaning "no opinion"
pub fn decline<'a, T: Send + 'a>() -> HookFuture<'a, T> {
    Box::pin(async { Ok(None) })
}

/// A hook result carrying `value`
pub fn produce<'a, T: Send + 'a>(value: T) -> HookFuture<'a, T> {
    Box::pin(async move { Ok(Some(value)) })
}

/// Values a hook can return; empty values count as a decline.
pub trait Produced {
    fn is_produced(&self) -> bool {
        true
    }
}

impl Produced for String {
    fn is_produced(&self) -> bool {
        !self.is_empty()
    }
}

impl Produced for LoadOutput {
    fn is_produced(&self) -> bool {
        match self {
            LoadOutput::Source(source) => !source.is_empty(),
            LoadOutput::Imported(_) => true,
        }
    }
}

impl Produced for SchemaDocument {}

impl Produced for Definition {}

/// Common plugin identity
pub trait Plugin: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Hooks into import resolution. Every hook is optional.
pub trait LoadPlugin: Plugin {
    /// Canonicalize `importee`, as referenced from `importer` (`None` for the root)
    fn resolve_id<'a>(
        &'a self,
        _importee: &'a str,
        _importer: Option<&'a str>,
    ) -> HookFuture<'a, String> {
        decline()
    }

    /// Fetch the source behind a canonical id
    fn load<'a>(&'a self, _id: &'a str) -> HookFuture<'a, LoadOutput> {
        decline()
    }

    /// Rewrite a freshly parsed document before it is used
    fn transform<'a>(
        &'a self,
        _document: &'a SchemaDocument,
        _origin: &'a ImportReference,
    ) -> HookFuture<'a, SchemaDocument> {
        decline()
    }
}

/// Hooks into definition merging
pub trait MergePlugin: Plugin {
    /// Reconcile `incoming` with the current `survivor` of the same name.
    ///
    /// A produced definition becomes the new survivor.
    fn merge_types<'a>(
        &'a self,
        _incoming: &'a Definition,
        _survivor: &'a Definition,
    ) -> HookFuture<'a, Definition> {
        decline()
    }
}

/// Call `operation` on every plugin in order and keep the last produced value.
///
/// The first hook error aborts the dispatch.
pub async fn dispatch<'a, P, T, F>(
    plugins: &'a [Arc<P>],
    operation: &str,
    mut call: F,
) -> Result<Option<T>>
where
    P: Plugin + ?Sized,
    T: Produced,
    F: FnMut(&'a P) -> HookFuture<'a, T>,
{
    let mut produced = None;

    for plugin in plugins {
        match call(plugin.as_ref()).await? {
            Some(value) if value.is_produced() => {
                trace!("Plugin {} produced a result for {}", plugin.name(), operation);
                produced = Some(value);
            }
            _ => trace!("Plugin {} declined {}", plugin.name(), operation),
        }
    }

    Ok(produced)
}

/// [`dispatch`], falling back to `default` when no plugin produced a value.
///
/// The default is expected to always produce.
pub async fn invoke<'a, P, T, F, D, Fut>(
    plugins: &'a [Arc<P>],
    operation: &str,
    call: F,
    default: D,
) -> Result<T>
where
    P: Plugin + ?Sized,
    T: Produced,
    F: FnMut(&'a P) -> HookFuture<'a, T>,
    D: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match dispatch(plugins, operation, call).await? {
        Some(value) => Ok(value),
        None => {
            trace!("No plugin produced a result for {}, using default", operation);
            default().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::future;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers `resolve_id` with a fixed value and counts its calls
    struct Fixed {
        answer: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(answer: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Plugin for Fixed {}

    impl LoadPlugin for Fixed {
        fn resolve_id<'a>(
            &'a self,
            _importee: &'a str,
            _importer: Option<&'a str>,
        ) -> HookFuture<'a, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.answer {
                Some(answer) => produce(answer.to_string()),
                None => decline(),
            }
        }
    }

    struct Failing;

    impl Plugin for Failing {}

    impl LoadPlugin for Failing {
        fn resolve_id<'a>(
            &'a self,
            importee: &'a str,
            _importer: Option<&'a str>,
        ) -> HookFuture<'a, String> {
            Box::pin(async move {
                Err(Error::UnsupportedProtocol {
                    protocol: "test".to_string(),
                    id: importee.to_string(),
                })
            })
        }
    }

    async fn resolve(plugins: &[Arc<dyn LoadPlugin>]) -> Result<String> {
        invoke(
            plugins,
            "resolve_id",
            |plugin| plugin.resolve_id("x", None),
            || future::ready(Ok("default".to_string())),
        )
        .await
    }

    #[tokio::test]
    async fn test_last_produced_result_wins() {
        let first = Fixed::new(Some("first"));
        let second = Fixed::new(Some("second"));
        let silent = Fixed::new(None);
        let plugins: Vec<Arc<dyn LoadPlugin>> = vec![first.clone(), second.clone(), silent.clone()];

        assert_eq!(resolve(&plugins).await.unwrap(), "second");
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
        assert_eq!(silent.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_default_when_all_decline() {
        let plugins: Vec<Arc<dyn LoadPlugin>> = vec![Fixed::new(None), Fixed::new(None)];
        assert_eq!(resolve(&plugins).await.unwrap(), "default");
        assert_eq!(resolve(&[]).await.unwrap(), "default");
    }

    #[tokio::test]
    async fn test_empty_string_is_a_decline() {
        let plugins: Vec<Arc<dyn LoadPlugin>> = vec![Fixed::new(Some("kept")), Fixed::new(Some(""))];
        assert_eq!(resolve(&plugins).await.unwrap(), "kept");
    }

    #[tokio::test]
    async fn test_error_stops_dispatch() {
        let after = Fixed::new(Some("after"));
        let plugins: Vec<Arc<dyn LoadPlugin>> = vec![Arc::new(Failing), after.clone()];

        let result = resolve(&plugins).await;
        assert!(matches!(result, Err(Error::UnsupportedProtocol { .. })));
        assert_eq!(after.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispatch_without_default() {
        let plugins: Vec<Arc<dyn LoadPlugin>> = vec![Fixed::new(None)];
        let produced = dispatch(&plugins, "resolve_id", |plugin| plugin.resolve_id("x", None))
            .await
            .unwrap();
        assert!(produced.is_none());
    }

    #[test]
    fn test_default_plugin_name() {
        assert!(Failing.name().ends_with("Failing"));
    }
}
