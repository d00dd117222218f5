//! # plugwire
//!
//! HTTP client with a supervised plugin runtime.
//!
//! Plugins are registered with a [`PluginRegistry`], which validates them,
//! orders them by dependency and drives each through its lifecycle. Running
//! plugins contribute request, response and error interceptors to a shared
//! [`HttpClient`], talk to each other over a namespaced [`EventEmitter`] and
//! get their own logger, metrics and cache scope.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use plugwire::builtin::{HeaderAuthPlugin, LoggingPlugin};
//! use plugwire::{PluginRegistry, RegistryConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), plugwire::Error> {
//!     let registry = PluginRegistry::new(RegistryConfig::new());
//!
//!     registry.register(Arc::new(LoggingPlugin::new())).await?;
//!     registry
//!         .register(Arc::new(HeaderAuthPlugin::bearer("s3cr3t")))
//!         .await?;
//!     registry.start_all().await?;
//!
//!     let response = registry
//!         .http_client()
//!         .get("https://api.example.com/v1/status")
//!         .await?;
//!     println!("{}", response.text());
//!
//!     registry.dispose().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Listening to the runtime
//!
//! ```rust,no_run
//! use plugwire::events::names;
//! use plugwire::{PluginRegistry, RegistryConfig};
//!
//! let registry = PluginRegistry::new(RegistryConfig::new());
//! registry.events().on(names::PLUGIN_ERROR, |event| {
//!     eprintln!("plugin failed: {}", event.payload);
//! });
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

#[cfg(feature = "builtin-plugins")]
#[cfg_attr(docsrs, doc(cfg(feature = "builtin-plugins")))]
pub mod builtin;
pub mod cache;
pub mod client;
pub mod common;
pub mod config;
pub mod events;
pub mod graph;
pub mod observability;
pub mod plugin;
pub mod prelude;
pub mod registry;
pub mod validation;

// Re-exports for convenience
pub use cache::{CacheStats, CacheStore};
pub use client::{
    ClientError, ErrorInterceptor, ErrorOutcome, HttpClient, HttpClientConfig, HttpRequest,
    HttpResponse, InterceptorHandle, RequestInterceptor, ResponseInterceptor,
};
pub use common::Utils;
pub use config::{ConfigBuilder, ConfigError, ConfigProvider};
pub use events::{Event, EventEmitter, ListenerId};
pub use graph::DependencyGraph;
pub use observability::{
    MetricsConfig, MetricsRegistry, ObservabilityConfig, PluginLogger, TracingConfig,
};
pub use plugin::{
    Capabilities, ErrorCode, HealthStatus, LifecycleStateMachine, Plugin, PluginConfig,
    PluginContext, PluginDependency, PluginError, PluginErrorKind, PluginHealth, PluginHooks,
    PluginMetadata, PluginPriority, PluginResult, PluginState, PluginType,
};
pub use registry::{PluginRegistry, RegistryBuilder, RegistryConfig, RegistryStats};
pub use validation::{ConfigSchema, ValidationReport, Validator, ValidatorConfig};

/// Error type for plugwire operations.
///
/// Plugin and registry failures keep their structured [`PluginError`], so
/// callers can still branch on [`ErrorCode`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Registry, lifecycle or validation failure for a specific plugin.
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// HTTP pipeline failure that no error interceptor recovered.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization or deserialization failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// File system operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Required environment variable missing or invalid.
    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),

    /// Operation exceeded timeout.
    #[error("Operation timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(std::time::Duration),
}

/// Error category for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Permission or security policy rejections
    Authorization,
    /// Configuration, validation or setup errors
    Configuration,
    /// Network or server errors that may succeed on retry
    Transient,
    /// Lifecycle errors tied to a plugin's current state or dependencies
    Stateful,
    /// Internal errors (IO, JSON, unexpected states)
    Internal,
    /// Timeouts and capacity limits
    ResourceLimit,
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Plugin(e) => match e.kind {
                PluginErrorKind::Permission => ErrorCategory::Authorization,
                PluginErrorKind::Configuration
                | PluginErrorKind::Validation
                | PluginErrorKind::Compatibility => ErrorCategory::Configuration,
                PluginErrorKind::Network => ErrorCategory::Transient,
                PluginErrorKind::Timeout => ErrorCategory::ResourceLimit,
                PluginErrorKind::Runtime if e.code == ErrorCode::RegistryFull => {
                    ErrorCategory::ResourceLimit
                }
                PluginErrorKind::Dependency
                | PluginErrorKind::Initialization
                | PluginErrorKind::Runtime => ErrorCategory::Stateful,
            },

            Error::Client(e) if e.is_retryable() => ErrorCategory::Transient,
            Error::Client(ClientError::Status {
                status: 401 | 403, ..
            }) => ErrorCategory::Authorization,
            Error::Client(ClientError::InvalidUrl { .. } | ClientError::InvalidRequest(_)) => {
                ErrorCategory::Configuration
            }
            Error::Client(_) => ErrorCategory::Internal,

            Error::Config(_) | Error::Env(_) => ErrorCategory::Configuration,

            Error::Timeout(_) => ErrorCategory::ResourceLimit,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_authorization_error(&self) -> bool {
        self.category() == ErrorCategory::Authorization
    }

    pub fn is_configuration_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    pub fn is_resource_limit(&self) -> bool {
        self.category() == ErrorCategory::ResourceLimit
    }

    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    /// Stable code when the error came from the plugin runtime.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Error::Plugin(e) => Some(e.code),
            _ => None,
        }
    }

    pub fn plugin_id(&self) -> Option<&str> {
        match self {
            Error::Plugin(e) => Some(&e.plugin_id),
            _ => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Client(e) => e.status(),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound { key } => {
                Error::Config(format!("Key not found: {}", key))
            }
            config::ConfigError::InvalidValue { key, message } => {
                Error::Config(format!("Invalid value for {}: {}", key, message))
            }
            config::ConfigError::Serialization(e) => Error::Json(e),
            config::ConfigError::Io(e) => Error::Io(e),
            config::ConfigError::Env(e) => Error::Env(e),
            config::ConfigError::Provider { message } => Error::Config(message),
            config::ConfigError::ValidationErrors(errors) => Error::Config(errors.to_string()),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Client(ClientError::Http(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
