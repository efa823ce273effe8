//! Value helpers shared by policies, the resolver and the loader.

use serde_json::{Map, Value};

/// An input record: field name to untyped value, in insertion order.
pub type Payload = Map<String, Value>;

/// Message used by policies that do not provide their own.
pub const DEFAULT_MESSAGE: &str = "is invalid";

/// Field attributes accepted in a declaration file.
pub const FIELD_ATTRIBUTES: &[&str] = &["type", "default", "policies", "schema"];

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Plain rendering: strings as-is, everything else as compact JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Debug-style rendering: every value as compact JSON, strings quoted.
pub fn inspect_value(value: &Value) -> String {
    value.to_string()
}

/// Numeric view of a value, parsing numeric strings.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// A value counts as blank when it carries no content.
///
/// Whitespace-only strings, empty lists, empty maps and null are blank.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
