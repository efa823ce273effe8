//! Built-in policies installed by [`PolicyRegistry::with_builtins`].
//!
//! Validation policies: `required`, `present`, `format`, `email`, `array`,
//! `object`, `gt`, `lt`, `options`.
//!
//! Type policies (singletons, usually applied through `of_type`): `integer`,
//! `number`, `string`, `boolean`, `split`. `array` and `object` double as
//! declared types.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};

use crate::error::ArgumentError;
use crate::policy::{Instance, Policy, PolicyFactory, Rules};
use crate::registry::PolicyRegistry;
use crate::types::{as_number, display_value, inspect_value, is_blank, Payload};

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\A[\w+\-.]+@[a-z\d\-]+(\.[a-z]+)*\.[a-z]+\z")
        .expect("email pattern compiles")
});

static MISSING: Value = Value::Null;

pub(crate) fn install(registry: &mut PolicyRegistry) {
    registry.insert("required", Arc::new(required()));
    registry.insert("present", Arc::new(present()));
    registry.insert("format", Arc::new(FormatFactory));
    registry.insert(
        "email",
        Arc::new(Instance::new(Format::new(EMAIL.clone(), "invalid email"))),
    );
    registry.insert("array", Arc::new(array()));
    registry.insert("object", Arc::new(object()));
    registry.insert("gt", Arc::new(gt()));
    registry.insert("lt", Arc::new(lt()));
    registry.insert("options", Arc::new(options()));

    registry.insert("integer", Arc::new(integer()));
    registry.insert("number", Arc::new(number()));
    registry.insert("string", Arc::new(string()));
    registry.insert("boolean", Arc::new(boolean()));
    registry.insert("split", Arc::new(split()));
}

/// Message of the `object` policy, also used for malformed nested values.
pub(crate) fn expects_hash(actual: &Value) -> String {
    format!("expects a hash, but got {}", inspect_value(actual))
}

fn arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&MISSING)
}

fn required() -> Rules {
    Rules::new()
        .message(|_, _| "is required".to_string())
        .validate(|_, _, key, payload| payload.contains_key(key))
        .check_absence()
}

fn present() -> Rules {
    Rules::new()
        .message(|_, _| "is required and value must be present".to_string())
        .validate(|_, value, key, payload| payload.contains_key(key) && !is_blank(value))
        .check_absence()
}

/// Pattern match against the string form of a value.
///
/// Only counts as existing when the key is in the payload.
pub struct Format {
    pattern: Regex,
    message: String,
}

impl Format {
    pub fn new(pattern: Regex, message: impl Into<String>) -> Self {
        Self {
            pattern,
            message: message.into(),
        }
    }
}

impl Policy for Format {
    fn message(&self, _actual: &Value) -> String {
        self.message.clone()
    }

    fn exists(&self, _value: &Value, key: &str, payload: &Payload) -> bool {
        payload.contains_key(key)
    }

    fn is_valid(&self, value: &Value, key: &str, payload: &Payload) -> bool {
        let text = match value {
            Value::Null => String::new(),
            other => display_value(other),
        };
        !payload.contains_key(key) || self.pattern.is_match(&text)
    }
}

/// `format(pattern, message?)`: the pattern is compiled when the field is
/// declared.
struct FormatFactory;

impl PolicyFactory for FormatFactory {
    fn bind(&self, args: &[Value]) -> Result<Arc<dyn Policy>, ArgumentError> {
        let pattern = match args.first() {
            Some(Value::String(p)) => p,
            Some(other) => {
                return Err(ArgumentError(format!(
                    "pattern must be a string, got {}",
                    inspect_value(other)
                )))
            }
            None => return Err(ArgumentError::new("missing pattern")),
        };
        let message = match args.get(1) {
            None => "invalid format".to_string(),
            Some(Value::String(m)) => m.clone(),
            Some(other) => {
                return Err(ArgumentError(format!(
                    "message must be a string, got {}",
                    inspect_value(other)
                )))
            }
        };
        if args.len() > 2 {
            return Err(ArgumentError(format!(
                "expects at most 2 arguments, got {}",
                args.len()
            )));
        }
        let regex = Regex::new(pattern).map_err(|e| ArgumentError(e.to_string()))?;
        Ok(Arc::new(Format::new(regex, message)))
    }
}

fn array() -> Rules {
    Rules::new()
        .message(|_, actual| format!("expects an array, but got {}", inspect_value(actual)))
        .validate(|_, value, key, payload| !payload.contains_key(key) || value.is_array())
}

fn object() -> Rules {
    Rules::new()
        .message(|_, actual| expects_hash(actual))
        .validate(|_, value, key, payload| !payload.contains_key(key) || value.is_object())
}

fn compare(
    args: &[Value],
    value: &Value,
    key: &str,
    payload: &Payload,
    ok: fn(f64, f64) -> bool,
) -> bool {
    if !payload.contains_key(key) || value.is_null() {
        return true;
    }
    match (as_number(value), as_number(arg(args, 0))) {
        (Some(actual), Some(bound)) => ok(actual, bound),
        _ => false,
    }
}

fn gt() -> Rules {
    Rules::new()
        .arity(1)
        .message(|args, actual| {
            format!(
                "must be greater than {}, but got {}",
                display_value(arg(args, 0)),
                display_value(actual)
            )
        })
        .validate(|args, value, key, payload| compare(args, value, key, payload, |a, b| a > b))
}

fn lt() -> Rules {
    Rules::new()
        .arity(1)
        .message(|args, actual| {
            format!(
                "must be less than {}, but got {}",
                display_value(arg(args, 0)),
                display_value(actual)
            )
        })
        .validate(|args, value, key, payload| compare(args, value, key, payload, |a, b| a < b))
}

/// The allowed values: a single list argument, or the arguments themselves.
fn allowed(args: &[Value]) -> &[Value] {
    match args {
        [Value::Array(list)] => list.as_slice(),
        other => other,
    }
}

fn all_allowed(allowed: &[Value], actual: &Value) -> bool {
    match actual {
        Value::Array(items) => items.iter().all(|item| all_allowed(allowed, item)),
        other => allowed.contains(other),
    }
}

fn options() -> Rules {
    Rules::new()
        .message(|args, actual| {
            let list: Vec<String> = allowed(args).iter().map(display_value).collect();
            format!(
                "must be one of {}, but got {}",
                list.join(", "),
                display_value(actual)
            )
        })
        .exists(|args, value, _, _| all_allowed(allowed(args), value))
        .validate(|args, value, key, payload| {
            !payload.contains_key(key) || all_allowed(allowed(args), value)
        })
}

fn whole(n: f64) -> Option<i64> {
    if n.is_finite() && n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        Some(n as i64)
    } else {
        None
    }
}

fn integer() -> Rules {
    Rules::new()
        .singleton()
        .message(|_, actual| format!("expects an integer, but got {}", inspect_value(actual)))
        .coerce(|_, value, _| match value {
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(whole))
                    .map(Value::from)
            }
            Value::Number(n) if n.is_f64() => n.as_f64().and_then(whole).map(Value::from),
            _ => None,
        })
        .validate(|_, value, key, payload| {
            !payload.contains_key(key) || value.is_i64() || value.is_u64()
        })
}

fn number() -> Rules {
    Rules::new()
        .singleton()
        .message(|_, actual| format!("expects a number, but got {}", inspect_value(actual)))
        .coerce(|_, value, _| match value {
            Value::String(s) => {
                let s = s.trim();
                match s.parse::<i64>() {
                    Ok(n) => Some(Value::from(n)),
                    Err(_) => s
                        .parse::<f64>()
                        .ok()
                        .and_then(Number::from_f64)
                        .map(Value::Number),
                }
            }
            _ => None,
        })
        .validate(|_, value, key, payload| !payload.contains_key(key) || value.is_number())
}

fn string() -> Rules {
    Rules::new()
        .singleton()
        .message(|_, actual| format!("expects a string, but got {}", inspect_value(actual)))
        .coerce(|_, value, _| match value {
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        })
        .validate(|_, value, key, payload| !payload.contains_key(key) || value.is_string())
}

fn boolean() -> Rules {
    Rules::new()
        .singleton()
        .message(|_, actual| format!("expects a boolean, but got {}", inspect_value(actual)))
        .coerce(|_, value, _| match value {
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            Value::Number(n) => match n.as_i64() {
                Some(1) => Some(Value::Bool(true)),
                Some(0) => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        })
        .validate(|_, value, key, payload| !payload.contains_key(key) || value.is_boolean())
}

fn split() -> Rules {
    Rules::new().singleton().coerce(|_, value, _| match value {
        Value::String(s) => Some(Value::Array(
            s.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| Value::String(part.to_string()))
                .collect(),
        )),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{CoerceContext, MergeKind};
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test payloads are objects"),
        }
    }

    fn bind(factory: &dyn PolicyFactory, args: &[Value]) -> Arc<dyn Policy> {
        factory.bind(args).ok().unwrap()
    }

    fn coerce(factory: &dyn PolicyFactory, value: Value) -> Option<Value> {
        let data = payload(json!({ "k": value.clone() }));
        let ctx = CoerceContext {
            key: "k",
            payload: &data,
        };
        bind(factory, &[]).coerce(&value, &ctx)
    }

    #[test]
    fn required_only_checks_key_presence() {
        let policy = bind(&required(), &[]);
        assert!(policy.checks_absence());
        assert!(policy.is_valid(&Value::Null, "k", &payload(json!({ "k": null }))));
        assert!(!policy.is_valid(&Value::Null, "k", &payload(json!({}))));
        assert_eq!(policy.message(&Value::Null), "is required");
    }

    #[test]
    fn present_rejects_blank_values() {
        let policy = bind(&present(), &[]);
        let data = payload(json!({ "k": "" }));
        assert!(!policy.is_valid(&json!(""), "k", &data));
        assert!(!policy.is_valid(&json!("  "), "k", &data));
        assert!(!policy.is_valid(&json!([]), "k", &data));
        assert!(policy.is_valid(&json!("x"), "k", &data));
        assert!(policy.is_valid(&json!(false), "k", &data));
        assert!(!policy.is_valid(&Value::Null, "k", &payload(json!({}))));
    }

    #[test]
    fn format_matches_string_form() {
        let policy = bind(&FormatFactory, &[json!(r"^\d+$")]);
        let data = payload(json!({ "k": "12" }));
        assert!(policy.is_valid(&json!("12"), "k", &data));
        assert!(policy.is_valid(&json!(12), "k", &data));
        assert!(!policy.is_valid(&json!("1a"), "k", &data));
        assert_eq!(policy.message(&json!("1a")), "invalid format");
        // Missing key is not a format problem.
        assert!(policy.is_valid(&Value::Null, "k", &payload(json!({}))));
        assert!(!policy.exists(&Value::Null, "k", &payload(json!({}))));
    }

    #[test]
    fn format_custom_message() {
        let policy = bind(&FormatFactory, &[json!("^a"), json!("must start with a")]);
        assert_eq!(policy.message(&json!("b")), "must start with a");
    }

    #[test]
    fn format_rejects_bad_arguments() {
        assert!(FormatFactory.bind(&[]).is_err());
        assert!(FormatFactory.bind(&[json!(1)]).is_err());
        assert!(FormatFactory.bind(&[json!("(unclosed")]).is_err());
    }

    #[test]
    fn email_pattern() {
        let data = payload(json!({ "k": "" }));
        let policy = Format::new(EMAIL.clone(), "invalid email");
        assert!(policy.is_valid(&json!("joe@email.com"), "k", &data));
        assert!(policy.is_valid(&json!("First.Last+tag@Example.co.uk"), "k", &data));
        assert!(!policy.is_valid(&json!("joe"), "k", &data));
        assert!(!policy.is_valid(&json!("joe@email"), "k", &data));
        assert_eq!(policy.message(&json!("joe")), "invalid email");
    }

    #[test]
    fn array_and_object_messages_inspect_value() {
        let data = payload(json!({ "k": "nope" }));
        let policy = bind(&array(), &[]);
        assert!(!policy.is_valid(&json!("nope"), "k", &data));
        assert_eq!(
            policy.message(&json!("nope")),
            r#"expects an array, but got "nope""#
        );

        let policy = bind(&object(), &[]);
        assert!(!policy.is_valid(&json!([1]), "k", &data));
        assert!(policy.is_valid(&json!({}), "k", &data));
        assert_eq!(policy.message(&json!(1)), "expects a hash, but got 1");
    }

    #[test]
    fn gt_coerces_both_operands() {
        let policy = bind(&gt(), &[json!(5)]);
        let data = payload(json!({ "k": "3" }));
        assert!(!policy.is_valid(&json!("3"), "k", &data));
        assert!(policy.is_valid(&json!("6"), "k", &data));
        assert!(!policy.is_valid(&json!("abc"), "k", &data));
        assert_eq!(
            policy.message(&json!("3")),
            "must be greater than 5, but got 3"
        );

        let policy = bind(&gt(), &[json!("5")]);
        assert!(policy.is_valid(&json!(10), "k", &data));
    }

    #[test]
    fn lt_ignores_missing_and_null() {
        let policy = bind(&lt(), &[json!(10)]);
        assert!(policy.is_valid(&Value::Null, "k", &payload(json!({}))));
        assert!(policy.is_valid(&Value::Null, "k", &payload(json!({ "k": null }))));
        assert!(!policy.is_valid(&json!(11), "k", &payload(json!({ "k": 11 }))));
        assert_eq!(
            policy.message(&json!(11)),
            "must be less than 10, but got 11"
        );
    }

    #[test]
    fn options_membership() {
        let policy = bind(&options(), &[json!(["a", "b"])]);
        let data = payload(json!({ "k": "c" }));
        assert!(!policy.is_valid(&json!("c"), "k", &data));
        assert!(!policy.exists(&json!("c"), "k", &data));
        assert!(policy.is_valid(&json!(["a", "b", "a"]), "k", &data));
        assert!(!policy.is_valid(&json!(["a", "c"]), "k", &data));
        assert_eq!(
            policy.message(&json!("c")),
            "must be one of a, b, but got c"
        );
    }

    #[test]
    fn options_accepts_spread_arguments() {
        let policy = bind(&options(), &[json!(1), json!(2)]);
        let data = payload(json!({ "k": 2 }));
        assert!(policy.is_valid(&json!(2), "k", &data));
        assert_eq!(policy.message(&json!(3)), "must be one of 1, 2, but got 3");
    }

    #[test]
    fn integer_coercion() {
        assert_eq!(coerce(&integer(), json!("42")), Some(json!(42)));
        assert_eq!(coerce(&integer(), json!(" 7.0 ")), Some(json!(7)));
        assert_eq!(coerce(&integer(), json!(3.0)), Some(json!(3)));
        assert_eq!(coerce(&integer(), json!(3.5)), None);
        assert_eq!(coerce(&integer(), json!("abc")), None);
        assert_eq!(integer().merge_kind(), MergeKind::Singleton);
    }

    #[test]
    fn number_coercion() {
        assert_eq!(coerce(&number(), json!("42")), Some(json!(42)));
        assert_eq!(coerce(&number(), json!("4.5")), Some(json!(4.5)));
        assert_eq!(coerce(&number(), json!("x")), None);
    }

    #[test]
    fn string_coercion() {
        assert_eq!(coerce(&string(), json!(12)), Some(json!("12")));
        assert_eq!(coerce(&string(), json!(true)), Some(json!("true")));
        assert_eq!(coerce(&string(), json!([1])), None);
    }

    #[test]
    fn boolean_coercion() {
        assert_eq!(coerce(&boolean(), json!("TRUE")), Some(json!(true)));
        assert_eq!(coerce(&boolean(), json!("0")), Some(json!(false)));
        assert_eq!(coerce(&boolean(), json!(1)), Some(json!(true)));
        assert_eq!(coerce(&boolean(), json!("maybe")), None);
    }

    #[test]
    fn split_coercion() {
        assert_eq!(
            coerce(&split(), json!("a, b,,c")),
            Some(json!(["a", "b", "c"]))
        );
        assert_eq!(coerce(&split(), json!(["a"])), None);
    }

    #[test]
    fn type_policies_reject_uncoerced_values() {
        let data = payload(json!({ "k": "abc" }));
        let policy = bind(&integer(), &[]);
        assert!(!policy.is_valid(&json!("abc"), "k", &data));
        assert_eq!(
            policy.message(&json!("abc")),
            r#"expects an integer, but got "abc""#
        );
    }
}
