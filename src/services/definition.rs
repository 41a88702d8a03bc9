//! Tool and resource definitions advertised by services

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A write operation exposed by a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name (e.g., "send_quote"), unique across all services
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON schema for the `arguments` object
    pub input_schema: Value,
}

impl Tool {
    /// Create a new tool definition with an empty object schema
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    /// Set input schema
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Shorthand for the common `{ <id_field>: string }` schema
    pub fn with_id_arg(self, id_field: &str) -> Self {
        let mut properties = serde_json::Map::new();
        properties.insert(id_field.to_string(), serde_json::json!({ "type": "string" }));
        self.with_schema(serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": [id_field]
        }))
    }

    /// Names listed under `required` in the schema
    pub fn required_args(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// A read endpoint exposed by a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTemplate {
    /// e.g. "jobbuilda://quotes/{id}"
    pub uri_template: String,
    pub name: String,
    pub description: String,
}

impl ResourceTemplate {
    pub fn new(uri_template: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            uri_template: uri_template.into(),
            name: name.into(),
            description: description.into(),
        }
    }
}
