use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::json;

use crate::client::{
    ClientError, ErrorInterceptor, ErrorOutcome, HttpRequest, HttpResponse, RequestInterceptor,
    ResponseInterceptor,
};
use crate::observability::PluginLogger;
use crate::plugin::{
    Capabilities, Plugin, PluginConfig, PluginContext, PluginMetadata, PluginPriority,
    PluginResult, PluginType,
};
use crate::validation::ConfigSchema;

#[derive(Debug)]
struct LogSink {
    logger: RwLock<PluginLogger>,
    log_headers: RwLock<bool>,
}

impl LogSink {
    fn logger(&self) -> PluginLogger {
        self.logger.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn log_headers(&self) -> bool {
        *self.log_headers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn apply(&self, config: &PluginConfig) {
        *self.log_headers.write().unwrap_or_else(|e| e.into_inner()) =
            config.get_bool("log_headers").unwrap_or(false);
    }
}

/// Logs each request and its outcome through the plugin's logger.
///
/// Settings: `log_headers` (bool, default `false`).
pub struct LoggingPlugin {
    metadata: PluginMetadata,
    sink: Arc<LogSink>,
}

impl Default for LoggingPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingPlugin {
    pub const ID: &'static str = "logging";

    pub fn new() -> Self {
        let metadata = PluginMetadata::new(Self::ID, "Request logging", env!("CARGO_PKG_VERSION"))
            .with_type(PluginType::Logging)
            .with_priority(PluginPriority::Low)
            .with_capabilities(Capabilities {
                modify_request: true,
                modify_response: true,
                handle_errors: true,
                ..Capabilities::default()
            })
            .with_description("Logs requests, responses and failures")
            .with_author("plugwire")
            .with_license("MIT");
        Self {
            metadata,
            sink: Arc::new(LogSink {
                logger: RwLock::new(PluginLogger::new("plugwire:plugin:logging")),
                log_headers: RwLock::new(false),
            }),
        }
    }
}

#[async_trait]
impl Plugin for LoggingPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn config_schema(&self) -> Option<ConfigSchema> {
        Some(ConfigSchema::object().property("log_headers", ConfigSchema::boolean()))
    }

    async fn init(&self, ctx: &PluginContext) -> PluginResult<()> {
        *self.sink.logger.write().unwrap_or_else(|e| e.into_inner()) = ctx.logger.clone();
        self.sink.apply(&ctx.config());
        Ok(())
    }

    fn intercept_request(&self) -> Option<Arc<dyn RequestInterceptor>> {
        Some(Arc::new(RequestLog(Arc::clone(&self.sink))))
    }

    fn intercept_response(&self) -> Option<Arc<dyn ResponseInterceptor>> {
        Some(Arc::new(ResponseLog(Arc::clone(&self.sink))))
    }

    fn intercept_error(&self) -> Option<Arc<dyn ErrorInterceptor>> {
        Some(Arc::new(ErrorLog(Arc::clone(&self.sink))))
    }

    async fn update_config(&self, config: &PluginConfig, _ctx: &PluginContext) -> PluginResult<()> {
        self.sink.apply(config);
        Ok(())
    }
}

struct RequestLog(Arc<LogSink>);

#[async_trait]
impl RequestInterceptor for RequestLog {
    fn name(&self) -> &str {
        "logging"
    }

    async fn intercept(&self, request: HttpRequest) -> Result<HttpRequest, ClientError> {
        let line = if self.0.log_headers() {
            format!(
                "--> {} {} {}",
                request.method,
                request.url,
                json!(request.headers)
            )
        } else {
            format!("--> {} {}", request.method, request.url)
        };
        self.0.logger().info(&line);
        Ok(request)
    }
}

struct ResponseLog(Arc<LogSink>);

#[async_trait]
impl ResponseInterceptor for ResponseLog {
    fn name(&self) -> &str {
        "logging"
    }

    async fn intercept(&self, response: HttpResponse) -> Result<HttpResponse, ClientError> {
        self.0.logger().info(&format!(
            "<-- {} ({}ms, {} bytes)",
            response.status,
            response.elapsed.as_millis(),
            response.body.len()
        ));
        Ok(response)
    }
}

struct ErrorLog(Arc<LogSink>);

#[async_trait]
impl ErrorInterceptor for ErrorLog {
    fn name(&self) -> &str {
        "logging"
    }

    async fn intercept(&self, request: &HttpRequest, error: ClientError) -> ErrorOutcome {
        self.0
            .logger()
            .warn(&format!("<-- {} {} failed: {}", request.method, request.url, error));
        ErrorOutcome::Propagate(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_adopts_context_settings() {
        let plugin = LoggingPlugin::new();
        let ctx = PluginContext::standalone(LoggingPlugin::ID)
            .with_config(PluginConfig::new().with("log_headers", true));

        plugin.init(&ctx).await.unwrap();
        assert!(plugin.sink.log_headers());
        assert_eq!(plugin.sink.logger().name(), "plugwire:plugin:logging");
    }

    #[tokio::test]
    async fn test_interceptors_pass_through() {
        let plugin = LoggingPlugin::new();
        let request = HttpRequest::get("https://example.com/a").header("X-Trace", "1");

        let out = plugin
            .intercept_request()
            .unwrap()
            .intercept(request.clone())
            .await
            .unwrap();
        assert_eq!(out.url, request.url);

        let response = plugin
            .intercept_response()
            .unwrap()
            .intercept(HttpResponse::new(204, ""))
            .await
            .unwrap();
        assert_eq!(response.status, 204);

        let outcome = plugin
            .intercept_error()
            .unwrap()
            .intercept(&request, ClientError::InvalidRequest("bad".into()))
            .await;
        assert!(matches!(outcome, ErrorOutcome::Propagate(_)));
    }
}
