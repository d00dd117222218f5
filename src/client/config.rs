//! Client configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::{ConfigProvider, ConfigProviderExt, ConfigResult};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_USER_AGENT: &str = concat!("plugwire/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Prefix for relative request URLs.
    pub base_url: Option<String>,
    /// Applied when a request carries no timeout of its own.
    pub timeout: Duration,
    pub user_agent: String,
    /// Sent with every request; request headers win on conflict.
    pub default_headers: BTreeMap<String, String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            default_headers: BTreeMap::new(),
        }
    }
}

impl HttpClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Reads `http.base_url`, `http.timeout_ms` and `http.user_agent`,
    /// keeping defaults for absent keys.
    pub async fn load<P: ConfigProvider + ?Sized>(provider: &P) -> ConfigResult<Self> {
        let mut config = Self::default();
        if let Some(base_url) = provider.get_string("http.base_url").await? {
            config.base_url = Some(base_url);
        }
        if let Some(ms) = provider.get::<u64>("http.timeout_ms").await? {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(user_agent) = provider.get_string("http.user_agent").await? {
            config.user_agent = user_agent;
        }
        Ok(config)
    }
}
