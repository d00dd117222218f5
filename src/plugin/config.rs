use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_enabled() -> bool {
    true
}

/// Mutable per-plugin configuration owned by the registry.
///
/// Serializes flat: `{"enabled": true, "header": "x-api-key", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            settings: Map::new(),
        }
    }
}

impl PluginConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            settings: Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.settings.get(key).and_then(Value::as_bool)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.settings.get(key).and_then(Value::as_u64)
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.settings.clone();
        map.insert("enabled".into(), Value::Bool(self.enabled));
        Value::Object(map)
    }

    /// Shallow merge: top-level keys of `partial` replace existing ones.
    ///
    /// A non-object `partial` leaves the config unchanged.
    pub fn merged(&self, partial: &Value) -> Self {
        let mut next = self.clone();
        if let Value::Object(patch) = partial {
            for (key, value) in patch {
                if key == "enabled" {
                    if let Some(enabled) = value.as_bool() {
                        next.enabled = enabled;
                    }
                } else {
                    next.settings.insert(key.clone(), value.clone());
                }
            }
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_serialization() {
        let config = PluginConfig::new().with("ttl", 30);
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value, json!({"enabled": true, "ttl": 30}));

        let parsed: PluginConfig = serde_json::from_value(json!({"ttl": 5})).unwrap();
        assert!(parsed.enabled);
        assert_eq!(parsed.get_u64("ttl"), Some(5));
    }

    #[test]
    fn test_merge_is_shallow() {
        let config = PluginConfig::new()
            .with("nested", json!({"a": 1, "b": 2}))
            .with("keep", "yes");
        let merged = config.merged(&json!({"nested": {"a": 9}, "enabled": false}));

        assert!(!merged.enabled);
        assert_eq!(merged.get("nested"), Some(&json!({"a": 9})));
        assert_eq!(merged.get_str("keep"), Some("yes"));
    }

    #[test]
    fn test_merge_ignores_non_object() {
        let config = PluginConfig::new().with("k", 1);
        assert_eq!(config.merged(&json!([1, 2])), config);
    }
}
