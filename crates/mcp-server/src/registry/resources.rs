// crates/mcp-server/src/registry/resources.rs
// ============================================================================
// Module: Resource Registry
// Description: Scheme-dispatched resource providers and subscription
//              bookkeeping.
// Purpose: Back `resources/list`, `resources/read`, `resources/subscribe`,
//          and `resources/unsubscribe` (§4.6).
// Dependencies: async-trait
// ============================================================================

//! ## Overview
//! A [`ResourceProvider`] owns one URI scheme (e.g. `file`, `mem`). The
//! registry dispatches by scheme and tracks `(connection_id, uri)`
//! subscriptions with a refcount, so the same connection subscribing twice
//! to the same URI only needs one unsubscribe to undo both, and so a
//! provider can tell whether *any* connection still cares about a URI
//! before it stops doing the work needed to detect updates.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use async_trait::async_trait;
use mcp_protocol::Resource;
use mcp_protocol::ResourceContent;

use crate::registry::ChangeBus;
use crate::registry::RegistryEvent;

/// Errors raised while listing, reading, or subscribing to resources.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResourceError {
    /// No provider is registered for the URI's scheme.
    #[error("no provider for scheme: {0}")]
    UnknownScheme(String),
    /// A provider with this scheme is already registered.
    #[error("scheme already registered: {0}")]
    SchemeAlreadyRegistered(String),
    /// The URI does not resolve to a resource the provider knows about.
    #[error("resource not found: {0}")]
    NotFound(String),
    /// The provider failed to read or enumerate resources.
    #[error("resource provider error: {0}")]
    ProviderFailed(String),
}

/// A source of resources for one URI scheme.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// The URI scheme this provider owns, e.g. `"file"`.
    fn scheme(&self) -> &str;

    /// Lists every resource this provider currently exposes.
    async fn list(&self) -> Result<Vec<Resource>, ResourceError>;

    /// Reads the content at `uri`.
    async fn read(&self, uri: &str) -> Result<ResourceContent, ResourceError>;

    /// Called when `uri` gains its first observer across all connections,
    /// so the provider can start whatever watcher detects its updates.
    /// The default is a no-op, for providers with nothing to start.
    async fn subscribe(&self, uri: &str) -> Result<(), ResourceError> {
        let _ = uri;
        Ok(())
    }

    /// Called when `uri` loses its last observer, so the provider can
    /// release the watcher it started in [`Self::subscribe`]. The default
    /// is a no-op.
    async fn unsubscribe(&self, uri: &str) {
        let _ = uri;
    }
}

fn scheme_of(uri: &str) -> Option<&str> {
    uri.split_once(':').map(|(scheme, _)| scheme)
}

/// The resource catalogue: scheme dispatch plus subscription tracking.
///
/// # Invariants
/// - A `(connection_id, uri)` pair subscribed N times requires N
///   unsubscribes before the provider is told nobody is watching;
///   [`ResourceRegistry::unsubscribe`] decrements rather than clearing.
pub struct ResourceRegistry {
    providers: RwLock<HashMap<String, Arc<dyn ResourceProvider>>>,
    subscriptions: RwLock<HashMap<(String, String), u32>>,
    bus: ChangeBus,
}

impl ResourceRegistry {
    /// Builds an empty registry publishing changes on `bus`.
    #[must_use]
    pub fn new(bus: ChangeBus) -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            bus,
        }
    }

    /// Registers `provider` for its scheme.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::SchemeAlreadyRegistered`] if a provider is
    /// already registered for that scheme.
    pub fn register_provider(&self, provider: Arc<dyn ResourceProvider>) -> Result<(), ResourceError> {
        let scheme = provider.scheme().to_string();
        let mut providers = self
            .providers
            .write()
            .map_err(|_| ResourceError::ProviderFailed("registry lock poisoned".to_string()))?;
        if providers.contains_key(&scheme) {
            return Err(ResourceError::SchemeAlreadyRegistered(scheme));
        }
        providers.insert(scheme, provider);
        drop(providers);
        self.bus.publish(RegistryEvent::ResourcesChanged);
        Ok(())
    }

    fn provider_for(&self, uri: &str) -> Result<Arc<dyn ResourceProvider>, ResourceError> {
        let scheme = scheme_of(uri).ok_or_else(|| ResourceError::UnknownScheme(uri.to_string()))?;
        self.providers
            .read()
            .map_err(|_| ResourceError::ProviderFailed("registry lock poisoned".to_string()))?
            .get(scheme)
            .cloned()
            .ok_or_else(|| ResourceError::UnknownScheme(scheme.to_string()))
    }

    /// Lists every resource across all registered providers.
    ///
    /// # Errors
    ///
    /// Returns the first provider's error encountered, if any.
    pub async fn list(&self) -> Result<Vec<Resource>, ResourceError> {
        let providers: Vec<_> = self
            .providers
            .read()
            .map_err(|_| ResourceError::ProviderFailed("registry lock poisoned".to_string()))?
            .values()
            .cloned()
            .collect();
        let mut out = Vec::new();
        for provider in providers {
            out.extend(provider.list().await?);
        }
        Ok(out)
    }

    /// Reads the resource at `uri` via its scheme's provider.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::UnknownScheme`] if no provider owns the
    /// URI's scheme, or the provider's own error otherwise.
    pub async fn read(&self, uri: &str) -> Result<ResourceContent, ResourceError> {
        self.provider_for(uri)?.read(uri).await
    }

    /// Returns whether any `(connection_id, uri)` pair still names `uri`,
    /// used to decide whether a removal just released the last observer.
    fn has_any_observer(subscriptions: &HashMap<(String, String), u32>, uri: &str) -> bool {
        subscriptions.keys().any(|(_, u)| u == uri)
    }

    /// Subscribes `connection_id` to updates for `uri`, calling the
    /// provider's [`ResourceProvider::subscribe`] if `uri` had no observer
    /// before this call.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::UnknownScheme`] if no provider owns the
    /// URI's scheme, or the provider's own error if it fails to start
    /// watching `uri`.
    ///
    /// # Panics
    ///
    /// Never panics; a poisoned lock surfaces as
    /// [`ResourceError::ProviderFailed`].
    pub async fn subscribe(&self, connection_id: &str, uri: &str) -> Result<(), ResourceError> {
        let provider = self.provider_for(uri)?;
        let is_first_observer = {
            let mut subscriptions = self
                .subscriptions
                .write()
                .map_err(|_| ResourceError::ProviderFailed("subscription lock poisoned".to_string()))?;
            let was_observed = Self::has_any_observer(&subscriptions, uri);
            *subscriptions.entry((connection_id.to_string(), uri.to_string())).or_insert(0) += 1;
            !was_observed
        };
        if is_first_observer {
            provider.subscribe(uri).await?;
        }
        Ok(())
    }

    /// Unsubscribes `connection_id` from updates for `uri`, decrementing
    /// the refcount and calling the provider's
    /// [`ResourceProvider::unsubscribe`] if this removes `uri`'s last
    /// observer.
    ///
    /// # Panics
    ///
    /// Never panics; a poisoned lock is a no-op.
    pub async fn unsubscribe(&self, connection_id: &str, uri: &str) {
        let was_last_observer = {
            let Ok(mut subscriptions) = self.subscriptions.write() else {
                return;
            };
            let key = (connection_id.to_string(), uri.to_string());
            if let Some(count) = subscriptions.get_mut(&key) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    subscriptions.remove(&key);
                }
            }
            !Self::has_any_observer(&subscriptions, uri)
        };
        if was_last_observer {
            if let Ok(provider) = self.provider_for(uri) {
                provider.unsubscribe(uri).await;
            }
        }
    }

    /// Drops every subscription held by `connection_id`, called on
    /// connection close, calling the provider's
    /// [`ResourceProvider::unsubscribe`] for each URI this leaves with no
    /// observers.
    ///
    /// # Panics
    ///
    /// Never panics; a poisoned lock is a no-op.
    pub async fn close_connection(&self, connection_id: &str) {
        let orphaned_uris = {
            let Ok(mut subscriptions) = self.subscriptions.write() else {
                return;
            };
            let removed_uris: Vec<String> = subscriptions
                .keys()
                .filter(|(conn, _)| conn == connection_id)
                .map(|(_, uri)| uri.clone())
                .collect();
            subscriptions.retain(|(conn, _), _| conn != connection_id);
            removed_uris
                .into_iter()
                .filter(|uri| !Self::has_any_observer(&subscriptions, uri))
                .collect::<std::collections::HashSet<_>>()
        };
        for uri in orphaned_uris {
            if let Ok(provider) = self.provider_for(&uri) {
                provider.unsubscribe(&uri).await;
            }
        }
    }

    /// Returns the connection ids currently subscribed to `uri`.
    #[must_use]
    pub fn subscribers_of(&self, uri: &str) -> Vec<String> {
        self.subscriptions
            .read()
            .map(|subscriptions| {
                subscriptions
                    .keys()
                    .filter(|(_, u)| u == uri)
                    .map(|(conn, _)| conn.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Publishes a [`RegistryEvent::ResourceUpdated`] for `uri`; the
    /// connection layer fans this out to `subscribers_of(uri)`.
    pub fn notify_updated(&self, uri: impl Into<String>) {
        self.bus.publish(RegistryEvent::ResourceUpdated {
            uri: uri.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::print_stdout,
        clippy::print_stderr,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        clippy::dbg_macro,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
        reason = "Test-only framing assertions."
    )]

    use super::*;

    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    #[derive(Default)]
    struct StaticProvider {
        scheme: String,
        resources: Vec<Resource>,
        subscribe_calls: Arc<AtomicUsize>,
        unsubscribe_calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ResourceProvider for StaticProvider {
        fn scheme(&self) -> &str {
            &self.scheme
        }

        async fn list(&self) -> Result<Vec<Resource>, ResourceError> {
            Ok(self.resources.clone())
        }

        async fn read(&self, uri: &str) -> Result<ResourceContent, ResourceError> {
            if self.resources.iter().any(|r| r.uri == uri) {
                Ok(ResourceContent {
                    uri: uri.to_string(),
                    mime_type: Some("text/plain".to_string()),
                    body: mcp_protocol::ResourceBody::Text {
                        text: "contents".to_string(),
                    },
                })
            } else {
                Err(ResourceError::NotFound(uri.to_string()))
            }
        }

        async fn subscribe(&self, _uri: &str) -> Result<(), ResourceError> {
            self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn unsubscribe(&self, _uri: &str) {
            self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn registry_with_mem_provider() -> (ResourceRegistry, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let subscribe_calls = Arc::new(AtomicUsize::new(0));
        let unsubscribe_calls = Arc::new(AtomicUsize::new(0));
        let registry = ResourceRegistry::new(ChangeBus::default());
        registry
            .register_provider(Arc::new(StaticProvider {
                scheme: "mem".to_string(),
                resources: vec![Resource {
                    uri: "mem://a".to_string(),
                    name: None,
                    description: None,
                    mime_type: None,
                }],
                subscribe_calls: subscribe_calls.clone(),
                unsubscribe_calls: unsubscribe_calls.clone(),
            }))
            .expect("registers");
        (registry, subscribe_calls, unsubscribe_calls)
    }

    #[test]
    fn register_rejects_duplicate_scheme() {
        let (registry, ..) = registry_with_mem_provider();
        let err = registry.register_provider(Arc::new(StaticProvider {
            scheme: "mem".to_string(),
            ..Default::default()
        }));
        assert!(matches!(err, Err(ResourceError::SchemeAlreadyRegistered(_))));
    }

    #[tokio::test]
    async fn read_unknown_scheme_is_an_error() {
        let (registry, ..) = registry_with_mem_provider();
        let err = registry.read("file://a").await;
        assert!(matches!(err, Err(ResourceError::UnknownScheme(_))));
    }

    #[tokio::test]
    async fn subscription_refcount_requires_matching_unsubscribes() {
        let (registry, ..) = registry_with_mem_provider();
        registry.subscribe("c1", "mem://a").await.expect("subscribes");
        registry.subscribe("c1", "mem://a").await.expect("subscribes again");
        registry.unsubscribe("c1", "mem://a").await;
        assert_eq!(registry.subscribers_of("mem://a"), vec!["c1".to_string()]);
        registry.unsubscribe("c1", "mem://a").await;
        assert!(registry.subscribers_of("mem://a").is_empty());
    }

    #[tokio::test]
    async fn close_connection_drops_all_its_subscriptions() {
        let (registry, ..) = registry_with_mem_provider();
        registry.subscribe("c1", "mem://a").await.expect("subscribes");
        registry.close_connection("c1").await;
        assert!(registry.subscribers_of("mem://a").is_empty());
    }

    #[tokio::test]
    async fn provider_is_notified_only_on_first_subscribe_and_last_unsubscribe() {
        let (registry, subscribe_calls, unsubscribe_calls) = registry_with_mem_provider();
        registry.subscribe("c1", "mem://a").await.expect("subscribes");
        registry.subscribe("c2", "mem://a").await.expect("subscribes again");
        assert_eq!(subscribe_calls.load(Ordering::SeqCst), 1);

        registry.unsubscribe("c1", "mem://a").await;
        assert_eq!(unsubscribe_calls.load(Ordering::SeqCst), 0);

        registry.unsubscribe("c2", "mem://a").await;
        assert_eq!(unsubscribe_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_connection_unsubscribes_provider_when_it_was_the_last_observer() {
        let (registry, subscribe_calls, unsubscribe_calls) = registry_with_mem_provider();
        registry.subscribe("c1", "mem://a").await.expect("subscribes");
        assert_eq!(subscribe_calls.load(Ordering::SeqCst), 1);
        registry.close_connection("c1").await;
        assert_eq!(unsubscribe_calls.load(Ordering::SeqCst), 1);
    }
}
