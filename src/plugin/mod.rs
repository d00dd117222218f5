//! Plugin contract and the types a plugin exchanges with its registry.
//!
//! A plugin is any `Arc<dyn Plugin>`. Everything beyond [`Plugin::metadata`]
//! has a default, so a plugin only overrides the stages it cares about.
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use plugwire::plugin::{Plugin, PluginContext, PluginMetadata, PluginResult};
//!
//! struct Heartbeat {
//!     metadata: PluginMetadata,
//! }
//!
//! #[async_trait]
//! impl Plugin for Heartbeat {
//!     fn metadata(&self) -> &PluginMetadata {
//!         &self.metadata
//!     }
//!
//!     async fn start(&self, ctx: &PluginContext) -> PluginResult<()> {
//!         ctx.logger.info("heartbeat started");
//!         Ok(())
//!     }
//! }
//! ```

mod config;
mod context;
mod error;
mod health;
mod metadata;
mod state;

pub use config::PluginConfig;
pub use context::PluginContext;
pub use error::{ErrorCode, PluginError, PluginErrorKind, PluginResult};
pub use health::{HealthStatus, PluginHealth};
pub use metadata::{
    Capabilities, PluginDependency, PluginMetadata, PluginPriority, PluginType,
};
pub use state::{LifecycleStateMachine, PluginState};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::client::{ErrorInterceptor, RequestInterceptor, ResponseInterceptor};
use crate::validation::ConfigSchema;

#[async_trait]
pub trait Plugin: Send + Sync {
    fn metadata(&self) -> &PluginMetadata;

    /// Configuration used when the plugin is registered without one.
    fn default_config(&self) -> PluginConfig {
        PluginConfig::default()
    }

    /// Schema the current configuration must satisfy.
    fn config_schema(&self) -> Option<ConfigSchema> {
        None
    }

    fn hooks(&self) -> Option<&dyn PluginHooks> {
        None
    }

    async fn init(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    async fn start(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    async fn stop(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    async fn destroy(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    /// Installed on the shared client while the plugin is started.
    fn intercept_request(&self) -> Option<Arc<dyn RequestInterceptor>> {
        None
    }

    fn intercept_response(&self) -> Option<Arc<dyn ResponseInterceptor>> {
        None
    }

    fn intercept_error(&self) -> Option<Arc<dyn ErrorInterceptor>> {
        None
    }

    /// Self-reported health; `None` lets the registry derive it from state.
    async fn health(&self, _ctx: &PluginContext) -> Option<PluginHealth> {
        None
    }

    fn metrics(&self) -> Option<Value> {
        None
    }

    /// Plugin-specific acceptance check run before a new config is stored.
    fn validate_config(&self, _config: &PluginConfig) -> Result<(), String> {
        Ok(())
    }

    /// Applies an accepted configuration.
    async fn update_config(
        &self,
        _config: &PluginConfig,
        _ctx: &PluginContext,
    ) -> PluginResult<()> {
        Ok(())
    }
}

/// Optional callbacks around each lifecycle stage.
///
/// A failing `before_*` hook aborts the stage; the plugin moves to `error`.
#[async_trait]
pub trait PluginHooks: Send + Sync {
    async fn before_init(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    async fn after_init(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    async fn before_start(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    async fn after_start(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    async fn before_stop(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    async fn after_stop(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    async fn before_destroy(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    async fn after_destroy(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    /// Called after the plugin has entered `error`. Failures here are logged.
    async fn on_error(&self, _error: &PluginError, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    /// May veto a configuration change by returning an error.
    async fn on_config_change(
        &self,
        _old: &PluginConfig,
        _new: &PluginConfig,
        _ctx: &PluginContext,
    ) -> PluginResult<()> {
        Ok(())
    }
}
