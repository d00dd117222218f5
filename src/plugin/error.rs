use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Broad failure class of a [`PluginError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginErrorKind {
    Initialization,
    Configuration,
    Dependency,
    Runtime,
    Validation,
    Permission,
    Timeout,
    Network,
    Compatibility,
}

impl fmt::Display for PluginErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PluginErrorKind::Initialization => "initialization",
            PluginErrorKind::Configuration => "configuration",
            PluginErrorKind::Dependency => "dependency",
            PluginErrorKind::Runtime => "runtime",
            PluginErrorKind::Validation => "validation",
            PluginErrorKind::Permission => "permission",
            PluginErrorKind::Timeout => "timeout",
            PluginErrorKind::Network => "network",
            PluginErrorKind::Compatibility => "compatibility",
        };
        f.write_str(s)
    }
}

/// Stable machine-readable error codes.
///
/// Callers branch on these instead of matching message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    PluginNotFound,
    PluginAlreadyRegistered,
    PluginDisabled,
    RegistryFull,
    RegistryDisposed,
    InvalidState,
    MissingDependency,
    IncompatibleDependency,
    CircularDependency,
    ValidationFailed,
    SecurityViolation,
    ConfigRejected,
    HookFailed,
    HookTimeout,
    InitFailed,
    StartFailed,
    StopFailed,
    DestroyFailed,
    #[serde(rename = "NETWORK_ERROR")]
    Network,
    HostIncompatible,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::PluginNotFound => "PLUGIN_NOT_FOUND",
            ErrorCode::PluginAlreadyRegistered => "PLUGIN_ALREADY_REGISTERED",
            ErrorCode::PluginDisabled => "PLUGIN_DISABLED",
            ErrorCode::RegistryFull => "REGISTRY_FULL",
            ErrorCode::RegistryDisposed => "REGISTRY_DISPOSED",
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::MissingDependency => "MISSING_DEPENDENCY",
            ErrorCode::IncompatibleDependency => "INCOMPATIBLE_DEPENDENCY",
            ErrorCode::CircularDependency => "CIRCULAR_DEPENDENCY",
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::SecurityViolation => "SECURITY_VIOLATION",
            ErrorCode::ConfigRejected => "CONFIG_REJECTED",
            ErrorCode::HookFailed => "HOOK_FAILED",
            ErrorCode::HookTimeout => "HOOK_TIMEOUT",
            ErrorCode::InitFailed => "INIT_FAILED",
            ErrorCode::StartFailed => "START_FAILED",
            ErrorCode::StopFailed => "STOP_FAILED",
            ErrorCode::DestroyFailed => "DESTROY_FAILED",
            ErrorCode::Network => "NETWORK_ERROR",
            ErrorCode::HostIncompatible => "HOST_INCOMPATIBLE",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by the registry, the validator or a plugin hook.
///
/// Every error names the plugin it concerns and carries a stable [`ErrorCode`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{code}] plugin '{plugin_id}': {message}")]
pub struct PluginError {
    pub kind: PluginErrorKind,
    pub plugin_id: String,
    pub code: ErrorCode,
    pub message: String,
    pub context: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl PluginError {
    pub fn new(
        kind: PluginErrorKind,
        plugin_id: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            plugin_id: plugin_id.into(),
            code,
            message: message.into(),
            context: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn initialization(plugin_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            PluginErrorKind::Initialization,
            plugin_id,
            ErrorCode::InitFailed,
            message,
        )
    }

    pub fn configuration(
        plugin_id: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self::new(PluginErrorKind::Configuration, plugin_id, code, message)
    }

    pub fn dependency(
        plugin_id: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self::new(PluginErrorKind::Dependency, plugin_id, code, message)
    }

    pub fn runtime(
        plugin_id: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self::new(PluginErrorKind::Runtime, plugin_id, code, message)
    }

    pub fn validation(plugin_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            PluginErrorKind::Validation,
            plugin_id,
            ErrorCode::ValidationFailed,
            message,
        )
    }

    /// The plugin refused a configuration it was offered.
    pub fn config_rejected(plugin_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            PluginErrorKind::Validation,
            plugin_id,
            ErrorCode::ConfigRejected,
            message,
        )
    }

    pub fn security(plugin_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            PluginErrorKind::Permission,
            plugin_id,
            ErrorCode::SecurityViolation,
            message,
        )
    }

    pub fn timeout(plugin_id: impl Into<String>, phase: &str, after: Duration) -> Self {
        Self::new(
            PluginErrorKind::Timeout,
            plugin_id,
            ErrorCode::HookTimeout,
            format!("{} timed out after {}ms", phase, after.as_millis()),
        )
        .with_context(serde_json::json!({
            "phase": phase,
            "timeout_ms": after.as_millis() as u64,
        }))
    }

    pub fn not_found(plugin_id: impl Into<String>) -> Self {
        let plugin_id = plugin_id.into();
        let message = format!("plugin '{}' is not registered", plugin_id);
        Self::runtime(plugin_id, ErrorCode::PluginNotFound, message)
    }

    pub fn disposed(plugin_id: impl Into<String>) -> Self {
        Self::runtime(
            plugin_id,
            ErrorCode::RegistryDisposed,
            "registry has been disposed",
        )
    }

    /// Error a plugin returns from its own hook code.
    pub fn hook(plugin_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::runtime(plugin_id, ErrorCode::HookFailed, message)
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == PluginErrorKind::Timeout
    }

    /// Rewraps a hook failure so it reports the lifecycle phase it broke,
    /// keeping timeouts untouched.
    pub(crate) fn in_phase(self, code: ErrorCode) -> Self {
        if self.is_timeout() || self.code != ErrorCode::HookFailed {
            return self;
        }
        Self { code, ..self }
    }
}

pub type PluginResult<T> = Result<T, PluginError>;
