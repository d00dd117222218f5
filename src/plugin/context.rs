//! Services handed to a plugin for its whole registration.

use std::sync::{Arc, RwLock, Weak};

use tokio_util::sync::CancellationToken;

use crate::cache::CacheStore;
use crate::client::HttpClient;
use crate::common::Utils;
use crate::events::EventEmitter;
use crate::observability::{MetricsRegistry, PluginLogger};
use crate::registry::PluginRegistry;

use super::PluginConfig;

/// Per-plugin view of the host.
///
/// Logger, metrics, cache and events are scoped children of the registry's
/// services, so everything a plugin writes is namespaced by its id. The
/// registry link is weak: a context never keeps its registry alive.
#[derive(Clone)]
pub struct PluginContext {
    plugin_id: String,
    pub logger: PluginLogger,
    pub metrics: MetricsRegistry,
    pub cache: CacheStore,
    pub events: EventEmitter,
    pub utils: Utils,
    http: HttpClient,
    registry: Weak<PluginRegistry>,
    config: Arc<RwLock<PluginConfig>>,
    cancellation: Arc<RwLock<CancellationToken>>,
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_id", &self.plugin_id)
            .field("logger", &self.logger)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl PluginContext {
    pub(crate) fn new(
        plugin_id: &str,
        logger: &PluginLogger,
        metrics: &MetricsRegistry,
        cache: &CacheStore,
        events: &EventEmitter,
        http: HttpClient,
        registry: Weak<PluginRegistry>,
        config: PluginConfig,
    ) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            logger: logger.child("plugin").child(plugin_id),
            metrics: metrics.child("plugin").child(plugin_id),
            cache: cache.child("plugin").child(plugin_id),
            events: events.child("plugin").child(plugin_id),
            utils: Utils::new(),
            http,
            registry,
            config: Arc::new(RwLock::new(config)),
            cancellation: Arc::new(RwLock::new(CancellationToken::new())),
        }
    }

    /// Context detached from any registry, for exercising a plugin in
    /// isolation.
    pub fn standalone(plugin_id: &str) -> Self {
        Self::new(
            plugin_id,
            &PluginLogger::new("plugwire"),
            &MetricsRegistry::default(),
            &CacheStore::new(),
            &EventEmitter::new(),
            HttpClient::default(),
            Weak::new(),
            PluginConfig::default(),
        )
    }

    /// Replaces the configuration seen through this context and its clones.
    pub fn with_config(self, config: PluginConfig) -> Self {
        self.set_config(config);
        self
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// The owning registry, or `None` once it has been dropped.
    pub fn registry(&self) -> Option<Arc<PluginRegistry>> {
        self.registry.upgrade()
    }

    /// Current configuration, as last accepted by the registry.
    pub fn config(&self) -> PluginConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn set_config(&self, config: PluginConfig) {
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
    }

    pub(crate) fn set_enabled(&self, enabled: bool) -> bool {
        let mut config = self.config.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut config.enabled, enabled)
    }

    /// Token cancelled when a hook of this plugin times out.
    ///
    /// Work spawned from a hook should select on it.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn cancel(&self) {
        self.cancellation
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
    }

    /// Installs a fresh token if the current one was cancelled.
    pub(crate) fn renew_cancellation(&self) {
        let mut token = self.cancellation.write().unwrap_or_else(|e| e.into_inner());
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_services() {
        let ctx = PluginContext::standalone("auth");
        assert_eq!(ctx.plugin_id(), "auth");
        assert_eq!(ctx.logger.name(), "plugwire:plugin:auth");
        assert_eq!(ctx.events.namespace(), Some("plugin:auth"));
        assert_eq!(ctx.metrics.namespace(), Some("plugin.auth"));
        assert_eq!(ctx.cache.namespace(), Some("plugin:auth"));
        assert!(ctx.registry().is_none());
        assert!(ctx.config().enabled);
    }

    #[test]
    fn test_config_shared_by_clones() {
        let ctx = PluginContext::standalone("p").with_config(PluginConfig::new().with("k", 1));
        let clone = ctx.clone();
        assert!(clone.set_enabled(false));
        assert!(!ctx.config().enabled);
        assert_eq!(ctx.config().get_u64("k"), Some(1));
    }

    #[test]
    fn test_cancellation_renewal() {
        let ctx = PluginContext::standalone("p");
        let first = ctx.cancellation_token();
        ctx.cancel();
        assert!(first.is_cancelled());

        ctx.renew_cancellation();
        let second = ctx.cancellation_token();
        assert!(!second.is_cancelled());

        let clone = ctx.clone();
        clone.cancel();
        assert!(ctx.cancellation_token().is_cancelled());
    }
}
