//! Tool input schema normalization
//!
//! Servers advertise arbitrary JSON Schema objects. The hub exposes a flattened,
//! predictable subset: the top-level shape plus the commonly used per-property keywords.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{HubError, Result};

/// Canonical parameter schema for one tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl ParameterSchema {
    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.get(name)
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }
}

/// One property of a [`ParameterSchema`].
///
/// `items` and `properties` are carried verbatim; nested schemas are not normalized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
}

impl PropertySchema {
    fn from_object(object: &Map<String, Value>) -> Self {
        let str_field = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);
        let f64_field = |key: &str| object.get(key).and_then(Value::as_f64);
        let u64_field = |key: &str| object.get(key).and_then(Value::as_u64);

        Self {
            schema_type: object.get("type").cloned(),
            description: str_field("description"),
            enum_values: object.get("enum").and_then(Value::as_array).cloned(),
            minimum: f64_field("minimum"),
            maximum: f64_field("maximum"),
            min_length: u64_field("minLength"),
            max_length: u64_field("maxLength"),
            min_items: u64_field("minItems"),
            max_items: u64_field("maxItems"),
            pattern: str_field("pattern"),
            format: str_field("format"),
            default: object.get("default").cloned(),
            items: object.get("items").cloned(),
            properties: object.get("properties").cloned(),
        }
    }
}

/// Normalize a raw input schema.
///
/// `raw` is serialized first, so any serializable value is accepted; a value that cannot
/// be serialized yields [`HubError::SerializeSchema`]. A missing top-level `type` becomes
/// `"object"`. `exclusiveMinimum`/`exclusiveMaximum` are dropped.
pub fn normalize_schema<S: Serialize + ?Sized>(raw: &S) -> Result<ParameterSchema> {
    let value = serde_json::to_value(raw).map_err(HubError::SerializeSchema)?;
    let object = match value {
        Value::Object(object) => object,
        Value::Null => Map::new(),
        other => {
            return Err(HubError::InvalidSchema(format!(
                "expected an object, got {}",
                json_kind(&other)
            )))
        }
    };

    let schema_type = object
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("object")
        .to_string();
    let description = object
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);
    let required = object
        .get("required")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut properties = BTreeMap::new();
    match object.get("properties") {
        None | Some(Value::Null) => {}
        Some(Value::Object(props)) => {
            for (name, prop) in props {
                let prop = prop.as_object().ok_or_else(|| {
                    HubError::InvalidSchema(format!(
                        "property '{name}' must be an object, got {}",
                        json_kind(prop)
                    ))
                })?;
                properties.insert(name.clone(), PropertySchema::from_object(prop));
            }
        }
        Some(other) => {
            return Err(HubError::InvalidSchema(format!(
                "'properties' must be an object, got {}",
                json_kind(other)
            )))
        }
    }

    Ok(ParameterSchema {
        schema_type,
        description,
        properties,
        required,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
