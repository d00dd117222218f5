use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::client::{
    ClientError, ErrorInterceptor, ErrorOutcome, HttpRequest, HttpResponse, RequestInterceptor,
    ResponseInterceptor,
};
use crate::observability::MetricsRegistry;
use crate::plugin::{
    Capabilities, HealthStatus, Plugin, PluginContext, PluginHealth, PluginMetadata,
    PluginPriority, PluginResult, PluginType,
};

/// Counts requests by outcome and records latency.
///
/// Metrics land in the plugin's own namespace (`plugin.metrics.*`):
/// `requests.total`, `responses.<class>` (`2xx`, `4xx`, ...),
/// `requests.errors` and the `requests.latency_ms` histogram.
pub struct MetricsPlugin {
    metadata: PluginMetadata,
    recorder: Arc<Recorder>,
}

#[derive(Debug, Default)]
struct Recorder {
    metrics: RwLock<Option<MetricsRegistry>>,
}

impl Recorder {
    fn with<F: FnOnce(&MetricsRegistry)>(&self, f: F) {
        if let Some(metrics) = self.metrics.read().unwrap_or_else(|e| e.into_inner()).as_ref() {
            f(metrics);
        }
    }
}

impl Default for MetricsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsPlugin {
    pub const ID: &'static str = "metrics";

    pub fn new() -> Self {
        let metadata = PluginMetadata::new(Self::ID, "Request metrics", env!("CARGO_PKG_VERSION"))
            .with_type(PluginType::Metrics)
            .with_priority(PluginPriority::Low)
            .with_capabilities(Capabilities {
                modify_request: true,
                modify_response: true,
                handle_errors: true,
                ..Capabilities::default()
            })
            .with_description("Counts requests and records response latency")
            .with_author("plugwire")
            .with_license("MIT");
        Self {
            metadata,
            recorder: Arc::new(Recorder::default()),
        }
    }
}

fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

#[async_trait]
impl Plugin for MetricsPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn init(&self, ctx: &PluginContext) -> PluginResult<()> {
        *self
            .recorder
            .metrics
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(ctx.metrics.clone());
        Ok(())
    }

    async fn destroy(&self, _ctx: &PluginContext) -> PluginResult<()> {
        *self
            .recorder
            .metrics
            .write()
            .unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }

    fn intercept_request(&self) -> Option<Arc<dyn RequestInterceptor>> {
        Some(Arc::new(CountRequests(Arc::clone(&self.recorder))))
    }

    fn intercept_response(&self) -> Option<Arc<dyn ResponseInterceptor>> {
        Some(Arc::new(RecordResponses(Arc::clone(&self.recorder))))
    }

    fn intercept_error(&self) -> Option<Arc<dyn ErrorInterceptor>> {
        Some(Arc::new(CountErrors(Arc::clone(&self.recorder))))
    }

    async fn health(&self, ctx: &PluginContext) -> Option<PluginHealth> {
        let total = ctx.metrics.counter("requests.total").get();
        let errors = ctx.metrics.counter("requests.errors").get();
        let health = if total > 0 && errors * 2 > total {
            PluginHealth::degraded(format!("{} of {} requests failed", errors, total))
        } else {
            PluginHealth::new(HealthStatus::Healthy)
        };
        Some(health.with_details(serde_json::json!({ "requests": total, "errors": errors })))
    }

    fn metrics(&self) -> Option<Value> {
        let guard = self.recorder.metrics.read().unwrap_or_else(|e| e.into_inner());
        let snapshot = guard.as_ref()?.snapshot();
        serde_json::to_value(snapshot).ok()
    }
}

struct CountRequests(Arc<Recorder>);

#[async_trait]
impl RequestInterceptor for CountRequests {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn intercept(&self, request: HttpRequest) -> Result<HttpRequest, ClientError> {
        self.0.with(|m| m.increment("requests.total"));
        Ok(request)
    }
}

struct RecordResponses(Arc<Recorder>);

#[async_trait]
impl ResponseInterceptor for RecordResponses {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn intercept(&self, response: HttpResponse) -> Result<HttpResponse, ClientError> {
        self.0.with(|m| {
            m.increment(&format!("responses.{}", status_class(response.status)));
            m.observe(
                "requests.latency_ms",
                response.elapsed.as_secs_f64() * 1000.0,
            );
        });
        Ok(response)
    }
}

struct CountErrors(Arc<Recorder>);

#[async_trait]
impl ErrorInterceptor for CountErrors {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn intercept(&self, _request: &HttpRequest, error: ClientError) -> ErrorOutcome {
        self.0.with(|m| {
            m.increment("requests.errors");
            if let Some(status) = error.status() {
                m.increment(&format!("responses.{}", status_class(status)));
            }
        });
        ErrorOutcome::Propagate(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_class() {
        assert_eq!(status_class(204), "2xx");
        assert_eq!(status_class(404), "4xx");
        assert_eq!(status_class(503), "5xx");
    }

    #[tokio::test]
    async fn test_records_into_context_metrics() {
        let plugin = MetricsPlugin::new();
        let ctx = PluginContext::standalone(MetricsPlugin::ID);
        assert!(plugin.metrics().is_none());
        plugin.init(&ctx).await.unwrap();

        let request = HttpRequest::get("https://example.com");
        plugin
            .intercept_request()
            .unwrap()
            .intercept(request.clone())
            .await
            .unwrap();
        let mut response = HttpResponse::new(200, "ok");
        response.elapsed = Duration::from_millis(12);
        plugin
            .intercept_response()
            .unwrap()
            .intercept(response)
            .await
            .unwrap();
        plugin
            .intercept_error()
            .unwrap()
            .intercept(&request, ClientError::InvalidRequest("bad".into()))
            .await;

        assert_eq!(ctx.metrics.counter("requests.total").get(), 1);
        assert_eq!(ctx.metrics.counter("responses.2xx").get(), 1);
        assert_eq!(ctx.metrics.counter("requests.errors").get(), 1);
        assert_eq!(ctx.metrics.histogram("requests.latency_ms").count(), 1);

        let exported = plugin.metrics().unwrap();
        assert_eq!(exported["counters"]["plugin.metrics.requests.total"], 1);
    }

    #[tokio::test]
    async fn test_health_degrades_on_error_rate() {
        let plugin = MetricsPlugin::new();
        let ctx = PluginContext::standalone(MetricsPlugin::ID);
        plugin.init(&ctx).await.unwrap();
        assert_eq!(plugin.health(&ctx).await.unwrap().status, HealthStatus::Healthy);

        ctx.metrics.increment("requests.total");
        ctx.metrics.add("requests.errors", 1);
        ctx.metrics.increment("requests.total");
        ctx.metrics.increment("requests.errors");
        assert_eq!(plugin.health(&ctx).await.unwrap().status, HealthStatus::Degraded);
    }
}
