//! Draft-4 subset validator
//!
//! Walks a schema in its declared keyword order and stops at the first
//! violation. Supported keywords: `type`, `enum`, `format`, `properties`,
//! `additionalProperties`, `required`, `items` and `oneOf`. Annotation
//! keywords such as `title` and `id` are ignored.

use serde_json::{Map, Value as JsonValue};

use super::formats::check_format;

/// First schema violation found in an instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Keyword that failed
    pub keyword: String,
    /// Path from the instance root to the offending value
    pub path: Vec<String>,
}

impl Violation {
    fn new(keyword: &str, path: &[String]) -> Self {
        Self {
            keyword: keyword.to_string(),
            path: path.to_vec(),
        }
    }

    /// Client-facing description of the violation
    pub fn describe(&self) -> String {
        if self.keyword == "additionalProperties" {
            match self.path.last() {
                None => "There is an invalid key in 1st depth".to_string(),
                Some(key) => format!("There is an invalid key in '{}'", key),
            }
        } else {
            match self.path.last() {
                Some(key) => format!("'{}' has an invalid value", key),
                None => "Invalid params".to_string(),
            }
        }
    }
}

/// Validate `instance` against `schema`
pub fn validate(instance: &JsonValue, schema: &JsonValue) -> Result<(), Violation> {
    let mut path = Vec::new();
    validate_at(instance, schema, &mut path)
}

fn validate_at(
    instance: &JsonValue,
    schema: &JsonValue,
    path: &mut Vec<String>,
) -> Result<(), Violation> {
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };

    for (keyword, rule) in schema {
        match keyword.as_str() {
            "type" => {
                if !matches_type(instance, rule) {
                    return Err(Violation::new("type", path));
                }
            }
            "enum" => {
                let allowed = rule.as_array().map(|a| a.contains(instance)).unwrap_or(true);
                if !allowed {
                    return Err(Violation::new("enum", path));
                }
            }
            "format" => {
                if let Some(format) = rule.as_str() {
                    if !check_format(format, instance) {
                        return Err(Violation::new("format", path));
                    }
                }
            }
            "properties" => {
                if let (Some(object), Some(properties)) = (instance.as_object(), rule.as_object())
                {
                    for (name, subschema) in properties {
                        if let Some(value) = object.get(name) {
                            path.push(name.clone());
                            let result = validate_at(value, subschema, path);
                            path.pop();
                            result?;
                        }
                    }
                }
            }
            "additionalProperties" => {
                if let Some(object) = instance.as_object() {
                    check_additional(object, schema, rule, path)?;
                }
            }
            "required" => {
                if let (Some(object), Some(required)) = (instance.as_object(), rule.as_array()) {
                    let missing = required
                        .iter()
                        .filter_map(JsonValue::as_str)
                        .any(|name| !object.contains_key(name));
                    if missing {
                        return Err(Violation::new("required", path));
                    }
                }
            }
            "items" => {
                if let Some(items) = instance.as_array() {
                    for (index, item) in items.iter().enumerate() {
                        let subschema = match rule {
                            JsonValue::Array(positional) => match positional.get(index) {
                                Some(s) => s,
                                None => continue,
                            },
                            single => single,
                        };
                        path.push(index.to_string());
                        let result = validate_at(item, subschema, path);
                        path.pop();
                        result?;
                    }
                }
            }
            "oneOf" => {
                if let Some(options) = rule.as_array() {
                    let matched = options
                        .iter()
                        .filter(|option| validate_at(instance, option, &mut path.clone()).is_ok())
                        .count();
                    if matched != 1 {
                        return Err(Violation::new("oneOf", path));
                    }
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn check_additional(
    object: &Map<String, JsonValue>,
    schema: &Map<String, JsonValue>,
    rule: &JsonValue,
    path: &mut Vec<String>,
) -> Result<(), Violation> {
    let declared = schema.get("properties").and_then(JsonValue::as_object);
    let extras = object
        .iter()
        .filter(|(key, _)| declared.map_or(true, |d| !d.contains_key(*key)));

    match rule {
        JsonValue::Bool(false) => {
            if extras.count() > 0 {
                return Err(Violation::new("additionalProperties", path));
            }
        }
        JsonValue::Object(_) => {
            for (key, value) in extras {
                path.push(key.clone());
                let result = validate_at(value, rule, path);
                path.pop();
                result?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn matches_type(instance: &JsonValue, rule: &JsonValue) -> bool {
    match rule {
        JsonValue::String(name) => is_type(instance, name),
        JsonValue::Array(names) => names
            .iter()
            .filter_map(JsonValue::as_str)
            .any(|name| is_type(instance, name)),
        _ => true,
    }
}

fn is_type(instance: &JsonValue, name: &str) -> bool {
    match name {
        "object" => instance.is_object(),
        "array" => instance.is_array(),
        "string" => instance.is_string(),
        "number" => instance.is_number(),
        "integer" => instance.is_i64() || instance.is_u64(),
        "boolean" => instance.is_boolean(),
        "null" => instance.is_null(),
        _ => true,
    }
}
