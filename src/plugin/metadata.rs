//! Plugin identity, classification and dependency declarations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What kind of behaviour a plugin contributes to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginType {
    Auth,
    Cache,
    Retry,
    Logging,
    Metrics,
    Mock,
    Debug,
    Transform,
    Custom,
}

impl PluginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginType::Auth => "auth",
            PluginType::Cache => "cache",
            PluginType::Retry => "retry",
            PluginType::Logging => "logging",
            PluginType::Metrics => "metrics",
            PluginType::Mock => "mock",
            PluginType::Debug => "debug",
            PluginType::Transform => "transform",
            PluginType::Custom => "custom",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relative execution priority. Higher runs first in interceptor chains.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PluginPriority {
    Lowest,
    Low,
    #[default]
    Normal,
    High,
    Highest,
}

impl PluginPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginPriority::Lowest => "lowest",
            PluginPriority::Low => "low",
            PluginPriority::Normal => "normal",
            PluginPriority::High => "high",
            PluginPriority::Highest => "highest",
        }
    }
}

impl fmt::Display for PluginPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permissions a plugin asks for.
///
/// The validator counts enabled flags and warns past a threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub modify_request: bool,
    pub modify_response: bool,
    pub handle_errors: bool,
    pub cache_responses: bool,
    pub retry_requests: bool,
    pub network_access: bool,
    pub storage_access: bool,
    pub read_credentials: bool,
}

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn enabled_count(&self) -> usize {
        [
            self.modify_request,
            self.modify_response,
            self.handle_errors,
            self.cache_responses,
            self.retry_requests,
            self.network_access,
            self.storage_access,
            self.read_credentials,
        ]
        .iter()
        .filter(|flag| **flag)
        .count()
    }

    pub fn enabled(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let flags = [
            (self.modify_request, "modify_request"),
            (self.modify_response, "modify_response"),
            (self.handle_errors, "handle_errors"),
            (self.cache_responses, "cache_responses"),
            (self.retry_requests, "retry_requests"),
            (self.network_access, "network_access"),
            (self.storage_access, "storage_access"),
            (self.read_credentials, "read_credentials"),
        ];
        for (on, name) in flags {
            if on {
                names.push(name);
            }
        }
        names
    }
}

/// Reference from one plugin to another by id plus a semver range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDependency {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub optional: bool,
}

impl PluginDependency {
    pub fn required(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            optional: false,
        }
    }

    pub fn optional(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            optional: true,
        }
    }
}

/// Immutable description of a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub priority: PluginPriority,
    #[serde(default)]
    pub dependencies: Vec<PluginDependency>,
    #[serde(default)]
    pub peer_dependencies: Vec<PluginDependency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    /// Lowest host library version the plugin supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_host_version: Option<String>,
    /// Highest host library version the plugin supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_host_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl PluginMetadata {
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            plugin_type: PluginType::Custom,
            capabilities: Capabilities::default(),
            priority: PluginPriority::default(),
            dependencies: Vec::new(),
            peer_dependencies: Vec::new(),
            description: None,
            author: None,
            license: None,
            homepage: None,
            keywords: Vec::new(),
            min_host_version: None,
            max_host_version: None,
            signature: None,
        }
    }

    pub fn with_type(mut self, plugin_type: PluginType) -> Self {
        self.plugin_type = plugin_type;
        self
    }

    pub fn with_priority(mut self, priority: PluginPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_dependency(mut self, dependency: PluginDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_peer_dependency(mut self, dependency: PluginDependency) -> Self {
        self.peer_dependencies.push(dependency);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_license(mut self, license: impl Into<String>) -> Self {
        self.license = Some(license.into());
        self
    }

    pub fn with_host_versions(
        mut self,
        min: Option<impl Into<String>>,
        max: Option<impl Into<String>>,
    ) -> Self {
        self.min_host_version = min.map(Into::into);
        self.max_host_version = max.map(Into::into);
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Ids of dependencies that must be running before this plugin starts.
    pub fn required_dependency_ids(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .filter(|d| !d.optional)
            .map(|d| d.id.as_str())
    }
}
