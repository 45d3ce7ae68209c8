//! Request schemas and validation
//!
//! One table per protocol version maps a method name to the JSON Schema of
//! the whole request object. Tables are built once and never mutated.

mod formats;
mod node;
mod v2;
mod v3;
pub mod validator;

use std::collections::HashMap;

use serde_json::{json, Value as JsonValue};

use crate::dispatcher::ApiVersion;
use crate::error::JsonRpcError;

pub use formats::check_format;

/// Method name to request schema
#[derive(Debug, Clone, Default)]
pub struct SchemaTable {
    schemas: HashMap<&'static str, JsonValue>,
}

impl SchemaTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the schema for `method`
    pub fn insert(&mut self, method: &'static str, schema: JsonValue) {
        self.schemas.insert(method, schema);
    }

    /// Schema registered for `method`
    pub fn get(&self, method: &str) -> Option<&JsonValue> {
        self.schemas.get(method)
    }

    /// Whether `method` has a schema
    pub fn contains(&self, method: &str) -> bool {
        self.schemas.contains_key(method)
    }

    /// Registered method names
    pub fn methods(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.schemas.keys().copied()
    }
}

/// Standard request envelope around a `params` schema
pub(crate) fn request_schema(title: &str, params: JsonValue, params_required: bool) -> JsonValue {
    let required = if params_required {
        json!(["jsonrpc", "method", "id", "params"])
    } else {
        json!(["jsonrpc", "method", "id"])
    };

    json!({
        "title": title,
        "type": "object",
        "properties": {
            "jsonrpc": {"type": "string", "enum": ["2.0"]},
            "method": {"type": "string"},
            "id": {"type": ["number", "string"]},
            "params": params
        },
        "additionalProperties": false,
        "required": required
    })
}

/// Schema tables for every protocol version
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    v2: SchemaTable,
    v3: SchemaTable,
    v3_debug: SchemaTable,
    node: SchemaTable,
}

impl SchemaRegistry {
    /// Build all tables
    pub fn new() -> Self {
        Self {
            v2: v2::table(),
            v3: v3::table(),
            v3_debug: node::debug_table(),
            node: node::table(),
        }
    }

    /// Table for `version`
    pub fn table(&self, version: ApiVersion) -> &SchemaTable {
        match version {
            ApiVersion::V2 => &self.v2,
            ApiVersion::V3 => &self.v3,
            ApiVersion::V3Debug => &self.v3_debug,
            ApiVersion::Node => &self.node,
        }
    }

    /// Validate a single request object against its method schema
    pub fn validate(&self, version: ApiVersion, request: &JsonValue) -> Result<(), JsonRpcError> {
        let schema = request
            .get("method")
            .and_then(JsonValue::as_str)
            .and_then(|method| self.table(version).get(method))
            .ok_or_else(|| {
                JsonRpcError::method_not_found("JSON schema validation error: Method not found")
            })?;

        validator::validate(request, schema).map_err(|violation| {
            JsonRpcError::invalid_params(format!(
                "JSON schema validation error: {}",
                violation.describe()
            ))
        })
    }

    /// Validate a single request or every element of a batch.
    ///
    /// Results line up with the elements; a batch element failing does not
    /// affect its siblings.
    pub fn validate_all(
        &self,
        version: ApiVersion,
        request: &JsonValue,
    ) -> Vec<Result<(), JsonRpcError>> {
        match request {
            JsonValue::Array(batch) => batch.iter().map(|r| self.validate(version, r)).collect(),
            single => vec![self.validate(version, single)],
        }
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
