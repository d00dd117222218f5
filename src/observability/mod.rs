//! Observability for the plugin runtime.
//!
//! - **Metrics**: atomic `Counter`, `Gauge`, `Histogram` and a namespaced
//!   named-metric registry shared with plugin contexts
//! - **Logging**: `PluginLogger`, a namespaced facade over `tracing`
//! - **Spans**: one span per lifecycle hook invocation
//!
//! Enable the `tracing-init` feature to get [`init_tracing`], which installs
//! a `tracing-subscriber` formatter honouring `RUST_LOG`.

mod logging;
mod metrics;
mod spans;

#[cfg(feature = "tracing-init")]
pub use logging::{TracingInitError, init_tracing};
pub use logging::PluginLogger;
pub use metrics::{
    Counter, Gauge, Histogram, HistogramSnapshot, MetricsConfig, MetricsRegistry, MetricsSnapshot,
};
pub use spans::{HookSpan, TracingConfig, TracingLevel};

/// Observability configuration combining tracing and metrics.
#[derive(Debug, Clone, Default)]
pub struct ObservabilityConfig {
    pub tracing: TracingConfig,
    pub metrics: MetricsConfig,
}

impl ObservabilityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracing(mut self, config: TracingConfig) -> Self {
        self.tracing = config;
        self
    }

    pub fn metrics(mut self, config: MetricsConfig) -> Self {
        self.metrics = config;
        self
    }

    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.tracing.service_name = Some(name.into());
        self
    }

    pub fn build_registry(&self) -> MetricsRegistry {
        MetricsRegistry::new(&self.metrics)
    }

    /// Root logger named after the service, or `plugwire`.
    pub fn build_logger(&self) -> PluginLogger {
        PluginLogger::new(
            self.tracing
                .service_name
                .clone()
                .unwrap_or_else(|| "plugwire".to_string()),
        )
    }
}
