//! Registry settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{
    ConfigError, ConfigProvider, ConfigProviderExt, ConfigResult, ValidationErrors,
};
use crate::validation::{DEFAULT_MAX_CAPABILITIES, DEFAULT_MAX_PLUGIN_SIZE, ValidatorConfig};

pub const DEFAULT_MAX_PLUGINS: usize = 100;
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Start plugins as soon as they register (when their own config is enabled).
    pub auto_start: bool,
    pub max_plugins: usize,
    /// Reject registration while a required dependency is absent, instead of
    /// deferring the check to `start`.
    pub strict_dependencies: bool,
    /// Bound for `before_*`/`after_*`, config and health hooks.
    #[serde(with = "millis")]
    pub hook_timeout: Duration,
    /// Bound for `init` and `start`.
    #[serde(with = "millis")]
    pub startup_timeout: Duration,
    /// Bound for `stop` and `destroy`.
    #[serde(with = "millis")]
    pub shutdown_timeout: Duration,
    pub enforce_timeouts: bool,
    pub validation: ValidationSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub strict: bool,
    pub allow_unsigned: bool,
    pub max_plugin_size: usize,
    pub max_capabilities: usize,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            strict: false,
            allow_unsigned: false,
            max_plugin_size: DEFAULT_MAX_PLUGIN_SIZE,
            max_capabilities: DEFAULT_MAX_CAPABILITIES,
        }
    }
}

impl From<&ValidationSettings> for ValidatorConfig {
    fn from(settings: &ValidationSettings) -> Self {
        Self {
            strict: settings.strict,
            allow_unsigned: settings.allow_unsigned,
            max_plugin_size: settings.max_plugin_size,
            max_capabilities: settings.max_capabilities,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            auto_start: false,
            max_plugins: DEFAULT_MAX_PLUGINS,
            strict_dependencies: false,
            hook_timeout: DEFAULT_HOOK_TIMEOUT,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            enforce_timeouts: true,
            validation: ValidationSettings::default(),
        }
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_start(mut self, enabled: bool) -> Self {
        self.auto_start = enabled;
        self
    }

    pub fn max_plugins(mut self, max: usize) -> Self {
        self.max_plugins = max;
        self
    }

    pub fn strict_dependencies(mut self, strict: bool) -> Self {
        self.strict_dependencies = strict;
        self
    }

    pub fn hook_timeout(mut self, timeout: Duration) -> Self {
        self.hook_timeout = timeout;
        self
    }

    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn enforce_timeouts(mut self, enforce: bool) -> Self {
        self.enforce_timeouts = enforce;
        self
    }

    pub fn strict_validation(mut self, strict: bool) -> Self {
        self.validation.strict = strict;
        self
    }

    pub fn allow_unsigned(mut self, allow: bool) -> Self {
        self.validation.allow_unsigned = allow;
        self
    }

    pub fn max_plugin_size(mut self, bytes: usize) -> Self {
        self.validation.max_plugin_size = bytes;
        self
    }

    pub fn max_capabilities(mut self, max: usize) -> Self {
        self.validation.max_capabilities = max;
        self
    }

    /// Reads `registry.*` and `validation.*` keys, keeping defaults for
    /// absent ones, then validates the result.
    pub async fn load<P: ConfigProvider + ?Sized>(provider: &P) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(v) = provider.get("registry.auto_start").await? {
            config.auto_start = v;
        }
        if let Some(v) = provider.get("registry.max_plugins").await? {
            config.max_plugins = v;
        }
        if let Some(v) = provider.get("registry.strict_dependencies").await? {
            config.strict_dependencies = v;
        }
        if let Some(ms) = provider.get::<u64>("registry.hook_timeout_ms").await? {
            config.hook_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = provider.get::<u64>("registry.startup_timeout_ms").await? {
            config.startup_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = provider.get::<u64>("registry.shutdown_timeout_ms").await? {
            config.shutdown_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = provider.get("registry.enforce_timeouts").await? {
            config.enforce_timeouts = v;
        }
        if let Some(v) = provider.get("validation.strict").await? {
            config.validation.strict = v;
        }
        if let Some(v) = provider.get("validation.allow_unsigned").await? {
            config.validation.allow_unsigned = v;
        }
        if let Some(v) = provider.get("validation.max_plugin_size").await? {
            config.validation.max_plugin_size = v;
        }
        if let Some(v) = provider.get("validation.max_capabilities").await? {
            config.validation.max_capabilities = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if self.max_plugins == 0 {
            errors.push(ConfigError::invalid("registry.max_plugins", "must be at least 1"));
        }
        for (key, timeout) in [
            ("registry.hook_timeout_ms", self.hook_timeout),
            ("registry.startup_timeout_ms", self.startup_timeout),
            ("registry.shutdown_timeout_ms", self.shutdown_timeout),
        ] {
            if timeout.is_zero() {
                errors.push(ConfigError::invalid(key, "must be greater than zero"));
            }
        }
        if self.validation.max_plugin_size == 0 {
            errors.push(ConfigError::invalid(
                "validation.max_plugin_size",
                "must be greater than zero",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationErrors(ValidationErrors(errors)))
        }
    }

    pub(crate) fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig::from(&self.validation)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
