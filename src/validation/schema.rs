//! Configuration schemas.
//!
//! A small JSON-Schema subset: `type`, `properties`, `required`, `items`,
//! `pattern`, `enum`, `minimum`, `maximum`. Schemas deserialize from the
//! usual JSON Schema spelling, so plugins can ship them as JSON.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::value_type_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Null,
}

impl SchemaType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            SchemaType::String => value.is_string(),
            SchemaType::Number => value.is_number(),
            SchemaType::Integer => value.is_i64() || value.is_u64(),
            SchemaType::Boolean => value.is_boolean(),
            SchemaType::Array => value.is_array(),
            SchemaType::Object => value.is_object(),
            SchemaType::Null => value.is_null(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SchemaType::String => "string",
            SchemaType::Number => "number",
            SchemaType::Integer => "integer",
            SchemaType::Boolean => "boolean",
            SchemaType::Array => "array",
            SchemaType::Object => "object",
            SchemaType::Null => "null",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<SchemaType>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, ConfigSchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ConfigSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One schema violation, addressed by a dotted path (`$.retries`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl ConfigSchema {
    pub fn of_type(schema_type: SchemaType) -> Self {
        Self {
            schema_type: Some(schema_type),
            ..Self::default()
        }
    }

    pub fn object() -> Self {
        Self::of_type(SchemaType::Object)
    }

    pub fn string() -> Self {
        Self::of_type(SchemaType::String)
    }

    pub fn number() -> Self {
        Self::of_type(SchemaType::Number)
    }

    pub fn integer() -> Self {
        Self::of_type(SchemaType::Integer)
    }

    pub fn boolean() -> Self {
        Self::of_type(SchemaType::Boolean)
    }

    pub fn array(items: ConfigSchema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::of_type(SchemaType::Array)
        }
    }

    pub fn property(mut self, name: impl Into<String>, schema: ConfigSchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn with_range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Plugin config schemas must describe an object.
    pub fn is_object_root(&self) -> bool {
        self.schema_type == Some(SchemaType::Object)
    }

    /// Every violation in `value`; empty when it conforms.
    pub fn validate(&self, value: &Value) -> Vec<SchemaViolation> {
        let mut violations = Vec::new();
        self.check("$", value, &mut violations);
        violations
    }

    fn check(&self, path: &str, value: &Value, out: &mut Vec<SchemaViolation>) {
        let mut violation = |message: String| {
            out.push(SchemaViolation {
                path: path.to_string(),
                message,
            })
        };

        if let Some(expected) = self.schema_type
            && !expected.matches(value)
        {
            violation(format!(
                "expected {}, got {}",
                expected.name(),
                value_type_name(value)
            ));
            return;
        }

        if let Some(allowed) = &self.enum_values
            && !allowed.contains(value)
        {
            violation(format!("value {} is not one of the allowed values", value));
        }

        if let Some(s) = value.as_str()
            && let Some(pattern) = &self.pattern
        {
            match regex::Regex::new(pattern) {
                Ok(re) if !re.is_match(s) => {
                    violation(format!("'{}' does not match pattern {}", s, pattern))
                }
                Ok(_) => {}
                Err(e) => violation(format!("invalid pattern {}: {}", pattern, e)),
            }
        }

        if let Some(n) = value.as_f64() {
            if let Some(min) = self.minimum
                && n < min
            {
                violation(format!("{} is below minimum {}", n, min));
            }
            if let Some(max) = self.maximum
                && n > max
            {
                violation(format!("{} is above maximum {}", n, max));
            }
        }

        match value {
            Value::Object(map) => {
                for key in &self.required {
                    if !map.contains_key(key) {
                        out.push(SchemaViolation {
                            path: format!("{}.{}", path, key),
                            message: "required property is missing".to_string(),
                        });
                    }
                }
                for (key, schema) in &self.properties {
                    if let Some(child) = map.get(key) {
                        schema.check(&format!("{}.{}", path, key), child, out);
                    }
                }
            }
            Value::Array(items) => {
                if let Some(schema) = &self.items {
                    for (i, item) in items.iter().enumerate() {
                        schema.check(&format!("{}[{}]", path, i), item, out);
                    }
                }
            }
            _ => {}
        }
    }
}
