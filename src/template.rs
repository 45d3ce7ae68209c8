//! Conversion templates
//!
//! A [`Template`] mirrors the shape of the object it converts. Walking an
//! object against its template applies the scalar codec at every leaf and the
//! structural key edits at every level that carries them. Keys the template does
//! not mention pass through verbatim.

use std::collections::HashMap;

use serde_json::{Map, Value as JsonValue};

use crate::codec::{convert_value, ValueType};

/// Structural edit applied to one key of an object
#[derive(Debug, Clone, PartialEq)]
pub enum KeyChange {
    /// Insert the key with this value when it is missing
    Add(JsonValue),
    /// Drop the key when present
    Remove,
    /// Move the value to a new key
    Rename(String),
}

/// Conversion template
#[derive(Debug, Clone, PartialEq)]
pub enum Template {
    /// Convert a scalar with the codec
    Leaf(ValueType),
    /// Convert the named fields of an object
    Object(HashMap<String, Template>),
    /// Convert every element of an array with one template
    List(Box<Template>),
    /// Apply key edits, then convert with the inner template
    WithEdits(Box<Template>, Vec<(String, KeyChange)>),
}

impl Template {
    /// Object template from `(key, template)` pairs
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Template)>,
    {
        Template::Object(fields.into_iter().map(|(k, t)| (k.into(), t)).collect())
    }

    /// Array template applying `element` to every item
    pub fn list(element: Template) -> Self {
        Template::List(Box::new(element))
    }

    /// Attach key edits to this template. Edits run in the given order.
    pub fn with_edits<K, I>(self, edits: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, KeyChange)>,
    {
        let edits = edits.into_iter().map(|(k, c)| (k.into(), c)).collect();
        Template::WithEdits(Box::new(self), edits)
    }

    /// Replace or insert the template for one field of an object template
    pub fn with_field(self, key: impl Into<String>, template: Template) -> Self {
        match self {
            Template::Object(mut fields) => {
                fields.insert(key.into(), template);
                Template::Object(fields)
            }
            Template::WithEdits(inner, edits) => {
                Template::WithEdits(Box::new(inner.with_field(key, template)), edits)
            }
            other => other,
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Template::Object(fields) => fields.is_empty(),
            _ => false,
        }
    }

    /// Convert `obj` against this template
    pub fn convert(&self, obj: &JsonValue) -> JsonValue {
        if is_falsy(obj) || self.is_empty() {
            return obj.clone();
        }

        match self {
            Template::WithEdits(inner, edits) => {
                let edited = match obj {
                    JsonValue::Object(map) => JsonValue::Object(apply_edits(map, edits)),
                    other => other.clone(),
                };
                inner.convert(&edited)
            }
            Template::Object(fields) => match obj {
                JsonValue::Object(map) => JsonValue::Object(
                    map.iter()
                        .map(|(key, value)| {
                            let converted = match fields.get(key) {
                                Some(template) => template.convert(value),
                                None => value.clone(),
                            };
                            (key.clone(), converted)
                        })
                        .collect(),
                ),
                other => other.clone(),
            },
            Template::List(element) => match obj {
                JsonValue::Array(items) => {
                    JsonValue::Array(items.iter().map(|item| element.convert(item)).collect())
                }
                other => other.clone(),
            },
            Template::Leaf(value_type) => convert_value(obj, *value_type),
        }
    }
}

/// Convert with an optional template; `None` means no conversion.
pub fn convert_params(params: &JsonValue, template: Option<&Template>) -> JsonValue {
    match template {
        Some(template) => template.convert(params),
        None => params.clone(),
    }
}

/// Null, false, zero, empty strings and empty containers are never converted.
pub(crate) fn is_falsy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::Bool(b) => !b,
        JsonValue::Number(n) => n.as_f64() == Some(0.0),
        JsonValue::String(s) => s.is_empty(),
        JsonValue::Array(a) => a.is_empty(),
        JsonValue::Object(o) => o.is_empty(),
    }
}

fn apply_edits(
    original: &Map<String, JsonValue>,
    edits: &[(String, KeyChange)],
) -> Map<String, JsonValue> {
    let mut edited = original.clone();
    for (key, change) in edits {
        match change {
            KeyChange::Add(default) => {
                if !edited.contains_key(key) {
                    edited.insert(key.clone(), default.clone());
                }
            }
            KeyChange::Remove => {
                edited.remove(key);
            }
            KeyChange::Rename(new_key) => {
                // the moved value is read from the unedited object when it has one
                if let Some(current) = edited.remove(key) {
                    let value = original.get(key).cloned().unwrap_or(current);
                    edited.insert(new_key.clone(), value);
                }
            }
        }
    }
    edited
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unlisted_keys_pass_through() {
        let template = Template::object([("height", Template::Leaf(ValueType::Integer))]);
        let obj = json!({"height": "0x10", "extra": {"nested": "0x1"}, "flag": true});

        let converted = template.convert(&obj);
        assert_eq!(converted["height"], json!(16));
        assert_eq!(converted["extra"], obj["extra"]);
        assert_eq!(converted["flag"], json!(true));
    }

    #[test]
    fn test_rename_then_convert_uses_new_key_template() {
        let template = Template::object([("time_stamp", Template::Leaf(ValueType::Integer))])
            .with_edits([("timestamp", KeyChange::Rename("time_stamp".into()))]);

        let converted = template.convert(&json!({"timestamp": "0x5"}));
        assert_eq!(converted, json!({"time_stamp": 5}));
    }

    #[test]
    fn test_add_and_remove() {
        let template = Template::object([("tx_hash", Template::Leaf(ValueType::HexHashNumber))])
            .with_edits([
                ("txHash", KeyChange::Rename("tx_hash".into())),
                ("nid", KeyChange::Remove),
                ("method", KeyChange::Add(json!("icx_sendTransaction"))),
            ]);

        let converted = template.convert(&json!({"txHash": "0xab", "nid": "0x1"}));
        assert_eq!(
            converted,
            json!({"tx_hash": "ab", "method": "icx_sendTransaction"})
        );

        // an existing key is never overwritten by Add
        let converted = template.convert(&json!({"method": "icx_call"}));
        assert_eq!(converted["method"], json!("icx_call"));
    }

    #[test]
    fn test_list_applies_element_template() {
        let template = Template::list(Template::object([(
            "txHash",
            Template::Leaf(ValueType::Hex0xHashNumber),
        )]));

        let converted = template.convert(&json!([{"txHash": "ab"}, {"txHash": "0xcd"}]));
        assert_eq!(converted, json!([{"txHash": "0xab"}, {"txHash": "0xcd"}]));
    }

    #[test]
    fn test_falsy_input_short_circuits() {
        let template = Template::object([("a", Template::Leaf(ValueType::Integer))])
            .with_edits([("b", KeyChange::Add(json!(1)))]);

        for obj in [json!(null), json!({}), json!([]), json!(""), json!(0), json!(false)] {
            assert_eq!(template.convert(&obj), obj);
        }
    }

    #[test]
    fn test_shape_mismatch_is_left_alone() {
        let template = Template::list(Template::Leaf(ValueType::Integer));
        let obj = json!({"a": "0x1"});
        assert_eq!(template.convert(&obj), obj);
    }
}
