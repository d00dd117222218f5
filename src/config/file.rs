//! JSON file configuration provider.
//!
//! Dotted keys address nested objects both for reads and writes, so
//! `registry.auto_start` maps to `{"registry": {"auto_start": ...}}`.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::ConfigResult;
use super::provider::ConfigProvider;

pub struct FileConfigProvider {
    path: PathBuf,
    data: RwLock<Option<Map<String, Value>>>,
    auto_reload: bool,
}

impl FileConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            data: RwLock::new(None),
            auto_reload: false,
        }
    }

    /// Re-reads the file before every access.
    pub fn auto_reload(path: impl Into<PathBuf>) -> Self {
        Self {
            auto_reload: true,
            ..Self::new(path)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> ConfigResult<Map<String, Value>> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(Map::new());
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    async fn ensure_loaded(&self) -> ConfigResult<()> {
        let mut data = self.data.write().await;
        if data.is_none() || self.auto_reload {
            *data = Some(self.load().await?);
        }
        Ok(())
    }

    async fn save(&self, data: &Map<String, Value>) -> ConfigResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(data)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }

    pub async fn reload(&self) -> ConfigResult<()> {
        let loaded = self.load().await?;
        *self.data.write().await = Some(loaded);
        Ok(())
    }
}

fn lookup<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    let mut parts = key.split('.');
    let first = map.get(parts.next()?)?;
    parts.try_fold(first, |current, part| current.get(part))
}

fn insert(map: &mut Map<String, Value>, key: &str, value: Value) {
    match key.split_once('.') {
        None => {
            map.insert(key.to_string(), value);
        }
        Some((head, rest)) => {
            let child = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(child) = child {
                insert(child, rest, value);
            }
        }
    }
}

fn remove(map: &mut Map<String, Value>, key: &str) -> bool {
    match key.split_once('.') {
        None => map.remove(key).is_some(),
        Some((head, rest)) => match map.get_mut(head) {
            Some(Value::Object(child)) => remove(child, rest),
            _ => false,
        },
    }
}

fn collect_leaf_keys(prefix: &str, value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                collect_leaf_keys(&path, child, out);
            }
        }
        _ => out.push(prefix.to_string()),
    }
}

#[async_trait::async_trait]
impl ConfigProvider for FileConfigProvider {
    fn name(&self) -> &str {
        "file"
    }

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        self.ensure_loaded().await?;
        let data = self.data.read().await;
        let value = data.as_ref().and_then(|map| lookup(map, key));
        Ok(value.map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }))
    }

    /// Values that parse as JSON are stored typed, anything else as a string.
    async fn set_raw(&self, key: &str, value: &str) -> ConfigResult<()> {
        self.ensure_loaded().await?;
        let json_value: Value =
            serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));

        let mut data = self.data.write().await;
        let map = data.get_or_insert_with(Map::new);
        insert(map, key, json_value);
        self.save(map).await
    }

    async fn delete(&self, key: &str) -> ConfigResult<bool> {
        self.ensure_loaded().await?;
        let mut data = self.data.write().await;
        let Some(map) = data.as_mut() else {
            return Ok(false);
        };
        let existed = remove(map, key);
        if existed {
            self.save(map).await?;
        }
        Ok(existed)
    }

    async fn list_keys(&self, prefix: &str) -> ConfigResult<Vec<String>> {
        self.ensure_loaded().await?;
        let data = self.data.read().await;
        let mut keys = Vec::new();
        if let Some(map) = data.as_ref() {
            collect_leaf_keys("", &Value::Object(map.clone()), &mut keys);
        }
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}

impl std::fmt::Debug for FileConfigProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileConfigProvider")
            .field("path", &self.path)
            .field("auto_reload", &self.auto_reload)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigProviderExt;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_nested_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plugwire.json");
        let config = serde_json::json!({
            "registry": { "auto_start": true, "max_plugins": 12 },
            "http": { "base_url": "https://api.example.com" }
        });
        tokio::fs::write(&path, config.to_string()).await.unwrap();

        let provider = FileConfigProvider::new(&path);
        let auto_start: Option<bool> = provider.get("registry.auto_start").await.unwrap();
        assert_eq!(auto_start, Some(true));
        assert_eq!(
            provider.get_raw("http.base_url").await.unwrap(),
            Some("https://api.example.com".to_string())
        );
        assert_eq!(provider.get_raw("registry.missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let provider = FileConfigProvider::new(dir.path().join("absent.json"));
        assert_eq!(provider.get_raw("key").await.unwrap(), None);
        assert!(provider.list_keys("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nested_write_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let provider = FileConfigProvider::new(&path);
        provider.set_raw("registry.max_plugins", "20").await.unwrap();
        provider.set_raw("registry.auto_start", "false").await.unwrap();

        let written: Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(written["registry"]["max_plugins"], 20);

        let reopened = FileConfigProvider::new(&path);
        assert_eq!(
            reopened.list_keys("registry.").await.unwrap(),
            vec!["registry.auto_start", "registry.max_plugins"]
        );
    }

    #[tokio::test]
    async fn test_delete_nested() {
        let dir = TempDir::new().unwrap();
        let provider = FileConfigProvider::new(dir.path().join("c.json"));

        provider.set_raw("validation.strict", "true").await.unwrap();
        assert!(provider.delete("validation.strict").await.unwrap());
        assert!(!provider.delete("validation.strict").await.unwrap());
        assert_eq!(provider.get_raw("validation.strict").await.unwrap(), None);
    }
}
