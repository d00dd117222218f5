use std::sync::Arc;

use super::config::RegistryConfig;
use super::runtime::{PluginRegistry, Services};
use crate::cache::CacheStore;
use crate::client::HttpClient;
use crate::events::EventEmitter;
use crate::observability::{MetricsRegistry, ObservabilityConfig, PluginLogger};
use crate::validation::Validator;

/// Assembles a [`PluginRegistry`] around caller-supplied services.
///
/// ```rust,no_run
/// use std::time::Duration;
/// use plugwire::registry::{PluginRegistry, RegistryConfig};
///
/// let registry = PluginRegistry::builder()
///     .config(RegistryConfig::new().auto_start(true).startup_timeout(Duration::from_secs(5)))
///     .build();
/// ```
#[derive(Default)]
pub struct RegistryBuilder {
    config: Option<RegistryConfig>,
    validator: Option<Validator>,
    events: Option<EventEmitter>,
    logger: Option<PluginLogger>,
    metrics: Option<MetricsRegistry>,
    cache: Option<CacheStore>,
    http: Option<HttpClient>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replaces the validator derived from `config.validation`.
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn events(mut self, events: EventEmitter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn logger(mut self, logger: PluginLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn cache(mut self, cache: CacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn http_client(mut self, http: HttpClient) -> Self {
        self.http = Some(http);
        self
    }

    /// Logger and metrics built from an observability config.
    pub fn observability(mut self, observability: &ObservabilityConfig) -> Self {
        self.logger = Some(observability.build_logger());
        self.metrics = Some(observability.build_registry());
        self
    }

    pub fn build(self) -> Arc<PluginRegistry> {
        let config = self.config.unwrap_or_default();
        let validator = self
            .validator
            .unwrap_or_else(|| Validator::with_config(config.validator_config()));
        let services = Services {
            events: self.events.unwrap_or_default(),
            logger: self.logger.unwrap_or_else(|| PluginLogger::new("plugwire")),
            metrics: self.metrics.unwrap_or_default(),
            cache: self.cache.unwrap_or_default(),
            http: self.http.unwrap_or_default(),
        };
        PluginRegistry::from_parts(config, validator, services)
    }
}
