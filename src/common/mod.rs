//! Small helpers shared by the registry and plugin contexts.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Stateless helper bundle exposed to plugins through their context.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utils;

impl Utils {
    pub fn new() -> Self {
        Self
    }

    /// Random v4 UUID string.
    pub fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    pub async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Top-level keys of `patch` replace those of `base`.
    ///
    /// Non-object inputs leave `base` untouched.
    pub fn shallow_merge(&self, base: &Value, patch: &Value) -> Value {
        match (base, patch) {
            (Value::Object(base), Value::Object(patch)) => {
                let mut merged = base.clone();
                for (key, value) in patch {
                    merged.insert(key.clone(), value.clone());
                }
                Value::Object(merged)
            }
            _ => base.clone(),
        }
    }

    /// Recursive merge; nested objects are merged, everything else replaced.
    pub fn deep_merge(&self, base: &Value, patch: &Value) -> Value {
        match (base, patch) {
            (Value::Object(base), Value::Object(patch)) => {
                let mut merged = base.clone();
                for (key, value) in patch {
                    let next = match merged.get(key) {
                        Some(existing) => self.deep_merge(existing, value),
                        None => value.clone(),
                    };
                    merged.insert(key.clone(), next);
                }
                Value::Object(merged)
            }
            (_, patch) => patch.clone(),
        }
    }

    /// Dotted-path lookup (`"a.b.c"`).
    pub fn get_path<'a>(&self, value: &'a Value, path: &str) -> Option<&'a Value> {
        path.split('.')
            .try_fold(value, |current, segment| match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
    }

    pub fn value_type_name(&self, value: &Value) -> &'static str {
        value_type_name(value)
    }
}

pub(crate) fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
