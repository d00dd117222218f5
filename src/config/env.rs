//! Environment variable configuration provider.
//!
//! `registry.hook_timeout_ms` is read from `PLUGWIRE_REGISTRY_HOOK_TIMEOUT_MS`.
//! Environment variables are treated as immutable at runtime.

use super::provider::ConfigProvider;
use super::{ConfigError, ConfigResult};

pub const DEFAULT_ENV_PREFIX: &str = "PLUGWIRE_";

#[derive(Debug, Clone)]
pub struct EnvConfigProvider {
    prefix: String,
}

impl EnvConfigProvider {
    /// Provider reading `PLUGWIRE_*` variables.
    pub fn new() -> Self {
        Self::prefixed(DEFAULT_ENV_PREFIX)
    }

    pub fn prefixed(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn env_key(&self, key: &str) -> String {
        format!(
            "{}{}",
            self.prefix,
            key.to_uppercase().replace(['.', '-'], "_")
        )
    }

    /// `_` cannot be told apart from `.` once upper-cased, so listed keys
    /// always come back fully dotted.
    fn key_from_env(&self, env_name: &str) -> Option<String> {
        env_name
            .strip_prefix(self.prefix.as_str())
            .map(|rest| rest.to_lowercase().replace('_', "."))
    }

    fn read_only() -> ConfigError {
        ConfigError::Provider {
            message: "environment variables are read-only at runtime".into(),
        }
    }
}

impl Default for EnvConfigProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ConfigProvider for EnvConfigProvider {
    fn name(&self) -> &str {
        "env"
    }

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        match std::env::var(self.env_key(key)) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(ConfigError::Env(e)),
        }
    }

    async fn set_raw(&self, _key: &str, _value: &str) -> ConfigResult<()> {
        Err(Self::read_only())
    }

    async fn delete(&self, _key: &str) -> ConfigResult<bool> {
        Err(Self::read_only())
    }

    async fn list_keys(&self, prefix: &str) -> ConfigResult<Vec<String>> {
        let env_prefix = self.env_key(prefix);
        let mut keys: Vec<String> = std::env::vars()
            .filter(|(name, _)| name.starts_with(&env_prefix))
            .filter_map(|(name, _)| self.key_from_env(&name))
            .collect();
        keys.sort();
        Ok(keys)
    }
}
