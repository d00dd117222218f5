//! Prelude module for convenient imports.
//!
//! Re-exports what a plugin author or host application typically needs.
//!
//! # Usage
//!
//! ```rust
//! use plugwire::prelude::*;
//! ```

// Core types
pub use crate::Error;
pub use crate::Result;

// Plugin contract
pub use crate::plugin::{
    Capabilities, ErrorCode, HealthStatus, Plugin, PluginConfig, PluginContext, PluginDependency,
    PluginError, PluginHealth, PluginHooks, PluginMetadata, PluginPriority, PluginResult,
    PluginState, PluginType,
};

// Registry
pub use crate::registry::{PluginRegistry, RegistryBuilder, RegistryConfig};

// HTTP client and interceptors
pub use crate::client::{
    ClientError, ErrorInterceptor, ErrorOutcome, HttpClient, HttpRequest, HttpResponse,
    RequestInterceptor, ResponseInterceptor,
};

// Events
pub use crate::events::{Event, EventEmitter, names as event_names};

// Validation
pub use crate::validation::{ConfigSchema, SchemaType};
