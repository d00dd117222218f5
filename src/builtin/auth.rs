use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::json;

use crate::client::{ClientError, HttpRequest, RequestInterceptor};
use crate::plugin::{
    Capabilities, ErrorCode, Plugin, PluginConfig, PluginContext, PluginError, PluginMetadata,
    PluginPriority, PluginResult, PluginType,
};
use crate::validation::ConfigSchema;

const DEFAULT_HEADER: &str = "authorization";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Credential {
    header: String,
    value: String,
}

impl Credential {
    fn from_config(config: &PluginConfig) -> Result<Self, String> {
        let token = config
            .get_str("token")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| "token must be a non-empty string".to_string())?;
        let header = config
            .get_str("header")
            .unwrap_or(DEFAULT_HEADER)
            .to_ascii_lowercase();
        let value = match config.get_str("scheme") {
            Some(scheme) if !scheme.is_empty() => format!("{} {}", scheme, token),
            _ => token.to_string(),
        };
        Ok(Self { header, value })
    }
}

/// Adds a credential header to every outgoing request that lacks one.
///
/// Settings: `token` (required), `header` (default `authorization`) and
/// `scheme` (e.g. `Bearer`, prefixed to the token).
pub struct HeaderAuthPlugin {
    metadata: PluginMetadata,
    defaults: PluginConfig,
    credential: Arc<RwLock<Option<Credential>>>,
}

impl HeaderAuthPlugin {
    pub const ID: &'static str = "header-auth";

    pub fn new(token: impl Into<String>) -> Self {
        let token: String = token.into();
        Self::with_config(PluginConfig::new().with("token", token))
    }

    /// Bearer token in the `authorization` header.
    pub fn bearer(token: impl Into<String>) -> Self {
        let token: String = token.into();
        Self::with_config(
            PluginConfig::new()
                .with("token", token)
                .with("scheme", "Bearer"),
        )
    }

    pub fn with_config(defaults: PluginConfig) -> Self {
        let metadata = PluginMetadata::new(
            Self::ID,
            "Header authentication",
            env!("CARGO_PKG_VERSION"),
        )
        .with_type(PluginType::Auth)
        .with_priority(PluginPriority::High)
        .with_capabilities(Capabilities {
            modify_request: true,
            read_credentials: true,
            ..Capabilities::default()
        })
        .with_description("Injects a credential header into outgoing requests")
        .with_author("plugwire")
        .with_license("MIT");
        Self {
            metadata,
            defaults,
            credential: Arc::new(RwLock::new(None)),
        }
    }

    fn install(&self, credential: Credential) {
        *self.credential.write().unwrap_or_else(|e| e.into_inner()) = Some(credential);
    }
}

#[async_trait]
impl Plugin for HeaderAuthPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn default_config(&self) -> PluginConfig {
        self.defaults.clone()
    }

    fn config_schema(&self) -> Option<ConfigSchema> {
        Some(
            ConfigSchema::object()
                .property("token", ConfigSchema::string())
                .property(
                    "header",
                    ConfigSchema::string().with_pattern("^[A-Za-z0-9-]+$"),
                )
                .property("scheme", ConfigSchema::string())
                .require("token"),
        )
    }

    async fn init(&self, ctx: &PluginContext) -> PluginResult<()> {
        let credential = Credential::from_config(&ctx.config()).map_err(|reason| {
            PluginError::configuration(ctx.plugin_id(), ErrorCode::InitFailed, reason)
        })?;
        ctx.logger
            .debug(&format!("credential header '{}' configured", credential.header));
        self.install(credential);
        Ok(())
    }

    async fn destroy(&self, _ctx: &PluginContext) -> PluginResult<()> {
        *self.credential.write().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }

    fn intercept_request(&self) -> Option<Arc<dyn RequestInterceptor>> {
        Some(Arc::new(InjectHeader(Arc::clone(&self.credential))))
    }

    fn validate_config(&self, config: &PluginConfig) -> Result<(), String> {
        Credential::from_config(config).map(|_| ())
    }

    async fn update_config(&self, config: &PluginConfig, ctx: &PluginContext) -> PluginResult<()> {
        let credential = Credential::from_config(config)
            .map_err(|reason| PluginError::config_rejected(ctx.plugin_id(), reason))?;
        self.install(credential);
        Ok(())
    }

    fn metrics(&self) -> Option<serde_json::Value> {
        let configured = self
            .credential
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some();
        Some(json!({ "configured": configured }))
    }
}

struct InjectHeader(Arc<RwLock<Option<Credential>>>);

#[async_trait]
impl RequestInterceptor for InjectHeader {
    fn name(&self) -> &str {
        "header-auth"
    }

    async fn intercept(&self, mut request: HttpRequest) -> Result<HttpRequest, ClientError> {
        let credential = self.0.read().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(credential) = credential
            && request.header_value(&credential.header).is_none()
        {
            request.set_header(&credential.header, credential.value);
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn started(plugin: &HeaderAuthPlugin) -> PluginContext {
        let ctx =
            PluginContext::standalone(HeaderAuthPlugin::ID).with_config(plugin.default_config());
        plugin.init(&ctx).await.unwrap();
        ctx
    }

    #[tokio::test]
    async fn test_bearer_header_injected() {
        let plugin = HeaderAuthPlugin::bearer("s3cret");
        started(&plugin).await;

        let request = plugin
            .intercept_request()
            .unwrap()
            .intercept(HttpRequest::get("https://api.example.com"))
            .await
            .unwrap();
        assert_eq!(request.header_value("authorization"), Some("Bearer s3cret"));
    }

    #[tokio::test]
    async fn test_existing_header_wins() {
        let plugin = HeaderAuthPlugin::with_config(
            PluginConfig::new()
                .with("token", "k")
                .with("header", "X-Api-Key"),
        );
        started(&plugin).await;

        let request = plugin
            .intercept_request()
            .unwrap()
            .intercept(HttpRequest::get("https://api.example.com").header("x-api-key", "mine"))
            .await
            .unwrap();
        assert_eq!(request.header_value("x-api-key"), Some("mine"));
    }

    #[tokio::test]
    async fn test_init_requires_token() {
        let plugin = HeaderAuthPlugin::with_config(PluginConfig::new());
        let ctx = PluginContext::standalone(HeaderAuthPlugin::ID);
        let err = plugin.init(&ctx).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InitFailed);
    }

    #[tokio::test]
    async fn test_update_config_rotates_token() {
        let plugin = HeaderAuthPlugin::new("old");
        let ctx = started(&plugin).await;

        assert!(plugin.validate_config(&PluginConfig::new().with("token", "")).is_err());
        plugin
            .update_config(&PluginConfig::new().with("token", "new"), &ctx)
            .await
            .unwrap();

        let request = plugin
            .intercept_request()
            .unwrap()
            .intercept(HttpRequest::get("https://api.example.com"))
            .await
            .unwrap();
        assert_eq!(request.header_value("authorization"), Some("new"));
    }

    #[test]
    fn test_schema_rejects_bad_header_name() {
        let schema = HeaderAuthPlugin::new("t").config_schema().unwrap();
        let config = PluginConfig::new().with("token", "t").with("header", "bad header");
        assert_eq!(schema.validate(&config.to_value()).len(), 1);
    }
}
