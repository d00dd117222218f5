//! The plugin registry: admission, dependency ordering and supervised
//! lifecycle.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use plugwire::registry::{PluginRegistry, RegistryConfig};
//! # use plugwire::plugin::Plugin;
//!
//! # async fn example(
//! #     auth: Arc<dyn Plugin>,
//! #     cache: Arc<dyn Plugin>,
//! # ) -> plugwire::plugin::PluginResult<()> {
//! let registry = PluginRegistry::new(RegistryConfig::default());
//! registry.register(auth).await?;
//! registry.register(cache).await?;
//!
//! for id in registry.load_order()? {
//!     registry.start(&id).await?;
//! }
//! registry.dispose().await;
//! # Ok(())
//! # }
//! ```

mod builder;
mod config;
mod entry;
mod lifecycle;
mod runtime;
mod stats;

pub use builder::RegistryBuilder;
pub use config::{
    DEFAULT_HOOK_TIMEOUT, DEFAULT_MAX_PLUGINS, DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_STARTUP_TIMEOUT,
    RegistryConfig, ValidationSettings,
};
pub use runtime::PluginRegistry;
pub use stats::{HealthSummary, RegistryStats};
