//! Namespaced logger handed to plugins.

use std::fmt;

#[cfg(feature = "tracing-init")]
use super::spans::TracingConfig;

/// Thin facade over `tracing` that tags every record with a logger name.
///
/// Children extend the name with `:`, so a plugin logger reads
/// `plugin:auth` and its sub-loggers `plugin:auth:refresh`.
#[derive(Clone, PartialEq, Eq)]
pub struct PluginLogger {
    name: String,
}

impl fmt::Debug for PluginLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginLogger")
            .field("name", &self.name)
            .finish()
    }
}

impl PluginLogger {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn child(&self, namespace: &str) -> Self {
        Self {
            name: format!("{}:{}", self.name, namespace),
        }
    }

    pub fn trace(&self, message: &str) {
        tracing::trace!(logger = %self.name, "{}", message);
    }

    pub fn debug(&self, message: &str) {
        tracing::debug!(logger = %self.name, "{}", message);
    }

    pub fn info(&self, message: &str) {
        tracing::info!(logger = %self.name, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(logger = %self.name, "{}", message);
    }

    pub fn error(&self, message: &str) {
        tracing::error!(logger = %self.name, "{}", message);
    }
}

#[cfg(feature = "tracing-init")]
#[derive(Debug, thiserror::Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct TracingInitError(String);

/// Installs a global `fmt` subscriber filtered by `RUST_LOG`, falling back
/// to the configured level.
#[cfg(feature = "tracing-init")]
pub fn init_tracing(config: &TracingConfig) -> Result<(), TracingInitError> {
    use tracing_subscriber::EnvFilter;

    if !config.enabled {
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|e| TracingInitError(e.to_string()))
}
