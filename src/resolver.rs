//! Payload resolution: apply a schema to one input record.
//!
//! Each field runs through four stages, in declaration order:
//!
//! 1. **Existence** - the key must be in the payload and every policy's
//!    `exists` must agree. A field that does not exist falls back to its
//!    default, if it has one. Defaults are trusted.
//! 2. **Coercion** - every policy may transform the value, in chain order.
//! 3. **Validation** - provided values run every `is_valid` in chain order and
//!    stop at the first failure (one error per field). Missing keys without a
//!    default only run the policies that check absence (`required`,
//!    `present`).
//! 4. **Emit** - the value is written to the output; nested maps and each
//!    element of nested lists are resolved against the child schema. A list
//!    element that is not a map is reported and emitted as `null`, so output
//!    indexes match input indexes. Child errors under a default are dropped.
//!
//! Unknown payload keys are dropped. Data problems are reported, never
//! returned as `Err`.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::builtins::expects_hash;
use crate::error::{FieldError, FieldPath, InvalidPayload};
use crate::field::FieldSpec;
use crate::policy::CoerceContext;
use crate::schema::Schema;
use crate::types::Payload;

/// Outcome of resolving one payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Resolution {
    /// Normalized record: declared keys only.
    pub value: Map<String, Value>,
    /// Validation errors across all fields, in field order.
    pub errors: Vec<FieldError>,
}

impl Resolution {
    /// True when no errors were reported.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// The normalized record, or the errors if there were any.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPayload` carrying every reported error.
    pub fn into_result(self) -> Result<Map<String, Value>, InvalidPayload> {
        if self.errors.is_empty() {
            Ok(self.value)
        } else {
            Err(InvalidPayload {
                errors: self.errors,
            })
        }
    }
}

/// Resolve `payload` against `schema`.
///
/// ```
/// use param_schema::{resolve, PolicyRegistry, Schema};
/// use serde_json::json;
///
/// let registry = PolicyRegistry::with_builtins();
/// let mut builder = Schema::builder(&registry);
/// builder.field("title").present();
/// builder.field("age").default(20);
/// let schema = builder.build().unwrap();
///
/// let payload = json!({ "title": "A title", "nope": "hello" });
/// let result = resolve(&schema, payload.as_object().unwrap());
///
/// assert!(result.errors.is_empty());
/// assert_eq!(json!(result.value), json!({ "title": "A title", "age": 20 }));
/// ```
pub fn resolve(schema: &Schema, payload: &Payload) -> Resolution {
    let mut errors = Vec::new();
    let value = resolve_fields(schema, payload, &FieldPath::root(), &mut errors);
    debug!(
        fields = schema.len(),
        emitted = value.len(),
        errors = errors.len(),
        "payload resolved"
    );
    Resolution { value, errors }
}

// --- Internal implementation ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Provided,
    Defaulted,
}

fn resolve_fields(
    schema: &Schema,
    payload: &Payload,
    path: &FieldPath,
    errors: &mut Vec<FieldError>,
) -> Map<String, Value> {
    let mut out = Map::new();
    for field in schema.fields() {
        let field_path = path.key(field.key());
        if let Some(value) = resolve_field(field, payload, &field_path, errors) {
            out.insert(field.key().to_string(), value);
        }
    }
    out
}

fn resolve_field(
    field: &FieldSpec,
    payload: &Payload,
    path: &FieldPath,
    errors: &mut Vec<FieldError>,
) -> Option<Value> {
    let key = field.key();
    let raw = payload.get(key);

    // Existence
    let exists = raw.map_or(false, |value| {
        field
            .chain()
            .iter()
            .all(|p| p.policy().exists(value, key, payload))
    });
    let (value, origin) = match (field.default_value(), raw) {
        (Some(default), _) if !exists => (default.clone(), Origin::Defaulted),
        (_, Some(value)) => (value.clone(), Origin::Provided),
        (_, None) => {
            check_absent(field, payload, path, errors);
            return None;
        }
    };

    // Coercion
    let context = CoerceContext { key, payload };
    let value = field.chain().iter().fold(value, |value, p| {
        p.policy().coerce(&value, &context).unwrap_or(value)
    });

    // Validation
    if origin == Origin::Provided {
        if let Some(failed) = field
            .chain()
            .iter()
            .find(|p| !p.policy().is_valid(&value, key, payload))
        {
            errors.push(FieldError::new(path.clone(), failed.policy().message(&value)));
            return None;
        }
    }

    // Emit
    match (field.child(), origin) {
        (Some(child), Origin::Provided) => resolve_nested(child, value, path, errors),
        // Child coercions and defaults apply; child errors are discarded.
        (Some(child), Origin::Defaulted) => resolve_nested(child, value, path, &mut Vec::new()),
        (None, _) => Some(value),
    }
}

/// Only policies that check absence may report a missing key.
fn check_absent(
    field: &FieldSpec,
    payload: &Payload,
    path: &FieldPath,
    errors: &mut Vec<FieldError>,
) {
    let missing = Value::Null;
    if let Some(failed) = field
        .chain()
        .iter()
        .filter(|p| p.policy().checks_absence())
        .find(|p| !p.policy().is_valid(&missing, field.key(), payload))
    {
        errors.push(FieldError::new(path.clone(), failed.policy().message(&missing)));
    }
}

fn resolve_nested(
    child: &Schema,
    value: Value,
    path: &FieldPath,
    errors: &mut Vec<FieldError>,
) -> Option<Value> {
    match value {
        Value::Object(map) => Some(Value::Object(resolve_fields(child, &map, path, errors))),
        Value::Array(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let item_path = path.index(i);
                match item {
                    Value::Object(map) => {
                        resolved.push(Value::Object(resolve_fields(
                            child, map, &item_path, errors,
                        )));
                    }
                    other => {
                        errors.push(FieldError::new(item_path, expects_hash(other)));
                        resolved.push(Value::Null);
                    }
                }
            }
            Some(Value::Array(resolved))
        }
        other => {
            errors.push(FieldError::new(path.clone(), expects_hash(&other)));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Rules;
    use crate::registry::PolicyRegistry;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test payloads are objects"),
        }
    }

    #[test]
    fn first_failure_per_field() {
        let registry = PolicyRegistry::with_builtins();
        let mut builder = Schema::builder(&registry);
        builder.field("n").gt(10).lt(5);
        let schema = builder.build().unwrap();

        let result = resolve(&schema, &payload(json!({ "n": 7 })));
        assert_eq!(result.errors.len(), 1);
        assert_eq!(
            result.errors[0].message,
            "must be greater than 10, but got 7"
        );
        assert!(result.value.get("n").is_none());
    }

    #[test]
    fn errors_accumulate_across_fields() {
        let registry = PolicyRegistry::with_builtins();
        let mut builder = Schema::builder(&registry);
        builder.field("a").required();
        builder.field("b").required();
        builder.field("c").present();
        let schema = builder.build().unwrap();

        let result = resolve(&schema, &payload(json!({ "c": " " })));
        let paths: Vec<String> = result.errors.iter().map(|e| e.path.to_string()).collect();
        assert_eq!(paths, ["a", "b", "c"]);
    }

    #[test]
    fn coercion_runs_before_validation() {
        let registry = PolicyRegistry::with_builtins();
        let mut builder = Schema::builder(&registry);
        builder.field("age").of_type("integer").gt(5);
        let schema = builder.build().unwrap();

        let result = resolve(&schema, &payload(json!({ "age": "30" })));
        assert!(result.is_valid());
        assert_eq!(result.value["age"], json!(30));

        let result = resolve(&schema, &payload(json!({ "age": "3" })));
        assert_eq!(result.errors[0].message, "must be greater than 5, but got 3");
    }

    #[test]
    fn failed_coercion_is_left_for_validation() {
        let registry = PolicyRegistry::with_builtins();
        let mut builder = Schema::builder(&registry);
        builder.field("age").of_type("integer");
        let schema = builder.build().unwrap();

        let result = resolve(&schema, &payload(json!({ "age": "old" })));
        assert_eq!(
            result.errors[0].message,
            r#"expects an integer, but got "old""#
        );
    }

    #[test]
    fn defaults_are_coerced_not_validated() {
        let registry = PolicyRegistry::with_builtins();
        let mut builder = Schema::builder(&registry);
        builder.field("limit").of_type("integer").gt(100).default("10");
        let schema = builder.build().unwrap();

        let result = resolve(&schema, &payload(json!({})));
        assert!(result.is_valid());
        assert_eq!(result.value["limit"], json!(10));
    }

    #[test]
    fn gated_existence_falls_back_to_default() {
        let registry = PolicyRegistry::with_builtins();
        let mut builder = Schema::builder(&registry);
        builder.field("status").options(["draft", "live"]).default("draft");
        let schema = builder.build().unwrap();

        let result = resolve(&schema, &payload(json!({ "status": "archived" })));
        assert!(result.is_valid());
        assert_eq!(result.value["status"], json!("draft"));
    }

    #[test]
    fn coercion_sees_key_and_payload() {
        let mut registry = PolicyRegistry::with_builtins();
        registry
            .register(
                "prefixed",
                Rules::new().coerce(|_, value, ctx| {
                    let prefix = ctx.payload.get("prefix")?.as_str()?;
                    Some(json!(format!("{}{}:{}", prefix, ctx.key, value.as_str()?)))
                }),
            )
            .unwrap();
        let mut builder = Schema::builder(&registry);
        builder.field("id").policy("prefixed");
        let schema = builder.build().unwrap();

        let result = resolve(&schema, &payload(json!({ "prefix": "x-", "id": "7" })));
        assert_eq!(result.value["id"], json!("x-id:7"));
    }

    #[test]
    fn into_result_splits_outcome() {
        let registry = PolicyRegistry::with_builtins();
        let mut builder = Schema::builder(&registry);
        builder.field("a").required();
        let schema = builder.build().unwrap();

        let ok = resolve(&schema, &payload(json!({ "a": 1 }))).into_result();
        assert_eq!(ok.unwrap()["a"], json!(1));

        let err = resolve(&schema, &payload(json!({}))).into_result();
        assert_eq!(err.unwrap_err().errors.len(), 1);
    }
}
