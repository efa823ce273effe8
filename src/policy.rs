//! Policies: the reusable, parametrized rules attached to fields.
//!
//! A [`Policy`] has four capabilities, all with defaults:
//!
//! | capability | default |
//! |------------|---------|
//! | `message` | `"is invalid"` |
//! | `exists` | always true |
//! | `is_valid` | always true |
//! | `coerce` | leave the value unchanged |
//!
//! Registries hold [`PolicyFactory`] values, which bind call arguments into a
//! policy instance when a field is declared. [`Rules`] is the plain-data way to
//! write a factory out of closures.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::ArgumentError;
use crate::types::{Payload, DEFAULT_MESSAGE};

/// What a coercion can see besides the value itself.
#[derive(Debug, Clone, Copy)]
pub struct CoerceContext<'a> {
    pub key: &'a str,
    pub payload: &'a Payload,
}

/// A policy instance with its call arguments already bound.
pub trait Policy: Send + Sync {
    /// Failure message for the given (possibly coerced) value.
    fn message(&self, _actual: &Value) -> String {
        DEFAULT_MESSAGE.to_string()
    }

    /// Whether the value counts as present. Only consulted when the key is
    /// in the payload.
    fn exists(&self, _value: &Value, _key: &str, _payload: &Payload) -> bool {
        true
    }

    fn is_valid(&self, _value: &Value, _key: &str, _payload: &Payload) -> bool {
        true
    }

    /// Transform the value. `None` leaves it unchanged.
    fn coerce(&self, _value: &Value, _context: &CoerceContext<'_>) -> Option<Value> {
        None
    }

    /// Whether `is_valid` must also run when the key is missing altogether.
    fn checks_absence(&self) -> bool {
        false
    }
}

/// How entries of a policy combine when two schemas are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeKind {
    /// Several instances may coexist; duplicates are dropped.
    #[default]
    Accumulating,
    /// At most one instance per field; the extension's instance wins.
    Singleton,
}

/// Produces bound policy instances from call arguments.
pub trait PolicyFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns `ArgumentError` when the arguments do not fit the policy.
    fn bind(&self, args: &[Value]) -> Result<Arc<dyn Policy>, ArgumentError>;

    fn merge_kind(&self) -> MergeKind {
        MergeKind::Accumulating
    }
}

type MessageFn = dyn Fn(&[Value], &Value) -> String + Send + Sync;
type CheckFn = dyn Fn(&[Value], &Value, &str, &Payload) -> bool + Send + Sync;
type CoerceFn = dyn Fn(&[Value], &Value, &CoerceContext<'_>) -> Option<Value> + Send + Sync;

/// A policy definition made of plain functions over the bound arguments.
///
/// ```
/// use param_schema::{PolicyRegistry, Rules};
///
/// let mut registry = PolicyRegistry::with_builtins();
/// registry
///     .register(
///         "even",
///         Rules::new()
///             .message(|_, actual| format!("must be even, but got {}", actual))
///             .validate(|_, value, _, _| value.as_i64().map_or(false, |n| n % 2 == 0)),
///     )
///     .unwrap();
/// ```
#[derive(Clone, Default)]
pub struct Rules {
    message: Option<Arc<MessageFn>>,
    exists: Option<Arc<CheckFn>>,
    validate: Option<Arc<CheckFn>>,
    coerce: Option<Arc<CoerceFn>>,
    checks_absence: bool,
    merge_kind: MergeKind,
    arity: Option<usize>,
}

impl Rules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Value], &Value) -> String + Send + Sync + 'static,
    {
        self.message = Some(Arc::new(f));
        self
    }

    pub fn exists<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Value], &Value, &str, &Payload) -> bool + Send + Sync + 'static,
    {
        self.exists = Some(Arc::new(f));
        self
    }

    pub fn validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Value], &Value, &str, &Payload) -> bool + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(f));
        self
    }

    pub fn coerce<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Value], &Value, &CoerceContext<'_>) -> Option<Value> + Send + Sync + 'static,
    {
        self.coerce = Some(Arc::new(f));
        self
    }

    /// Run `validate` even when the key is missing from the payload.
    pub fn check_absence(mut self) -> Self {
        self.checks_absence = true;
        self
    }

    /// Classify the policy as a singleton for schema merges.
    pub fn singleton(mut self) -> Self {
        self.merge_kind = MergeKind::Singleton;
        self
    }

    /// Require exactly `count` call arguments.
    pub fn arity(mut self, count: usize) -> Self {
        self.arity = Some(count);
        self
    }
}

impl fmt::Debug for Rules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rules")
            .field("message", &self.message.is_some())
            .field("exists", &self.exists.is_some())
            .field("validate", &self.validate.is_some())
            .field("coerce", &self.coerce.is_some())
            .field("checks_absence", &self.checks_absence)
            .field("merge_kind", &self.merge_kind)
            .finish()
    }
}

impl PolicyFactory for Rules {
    fn bind(&self, args: &[Value]) -> Result<Arc<dyn Policy>, ArgumentError> {
        if let Some(expected) = self.arity {
            if args.len() != expected {
                return Err(ArgumentError(format!(
                    "expects {} argument(s), got {}",
                    expected,
                    args.len()
                )));
            }
        }
        Ok(Arc::new(BoundRules {
            rules: self.clone(),
            args: args.to_vec(),
        }))
    }

    fn merge_kind(&self) -> MergeKind {
        self.merge_kind
    }
}

struct BoundRules {
    rules: Rules,
    args: Vec<Value>,
}

impl Policy for BoundRules {
    fn message(&self, actual: &Value) -> String {
        match &self.rules.message {
            Some(f) => f(&self.args, actual),
            None => DEFAULT_MESSAGE.to_string(),
        }
    }

    fn exists(&self, value: &Value, key: &str, payload: &Payload) -> bool {
        self.rules
            .exists
            .as_ref()
            .map_or(true, |f| f(&self.args, value, key, payload))
    }

    fn is_valid(&self, value: &Value, key: &str, payload: &Payload) -> bool {
        self.rules
            .validate
            .as_ref()
            .map_or(true, |f| f(&self.args, value, key, payload))
    }

    fn coerce(&self, value: &Value, context: &CoerceContext<'_>) -> Option<Value> {
        self.rules
            .coerce
            .as_ref()
            .and_then(|f| f(&self.args, value, context))
    }

    fn checks_absence(&self) -> bool {
        self.rules.checks_absence
    }
}

/// Factory for a ready-made policy object that takes no arguments.
pub struct Instance {
    policy: Arc<dyn Policy>,
    merge_kind: MergeKind,
}

impl Instance {
    pub fn new<P: Policy + 'static>(policy: P) -> Self {
        Self {
            policy: Arc::new(policy),
            merge_kind: MergeKind::Accumulating,
        }
    }

    pub fn singleton(mut self) -> Self {
        self.merge_kind = MergeKind::Singleton;
        self
    }
}

impl PolicyFactory for Instance {
    fn bind(&self, args: &[Value]) -> Result<Arc<dyn Policy>, ArgumentError> {
        if !args.is_empty() {
            return Err(ArgumentError::new("takes no arguments"));
        }
        Ok(Arc::clone(&self.policy))
    }

    fn merge_kind(&self) -> MergeKind {
        self.merge_kind
    }
}

/// Where a bound policy sits in a field's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// The field's declared value type; at most one per field.
    Type,
    /// An ordinary chain entry.
    Chain,
}

/// One entry of a field's chain: a named policy with its arguments bound.
///
/// Equality compares name, arguments, slot and merge kind; the policy
/// implementation is derived from those.
#[derive(Clone)]
pub struct BoundPolicy {
    name: String,
    args: Vec<Value>,
    slot: Slot,
    merge_kind: MergeKind,
    policy: Arc<dyn Policy>,
}

impl BoundPolicy {
    pub(crate) fn new(
        name: String,
        args: Vec<Value>,
        slot: Slot,
        merge_kind: MergeKind,
        policy: Arc<dyn Policy>,
    ) -> Self {
        Self {
            name,
            args,
            slot,
            merge_kind,
            policy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn merge_kind(&self) -> MergeKind {
        if self.slot == Slot::Type {
            MergeKind::Singleton
        } else {
            self.merge_kind
        }
    }

    pub fn policy(&self) -> &dyn Policy {
        self.policy.as_ref()
    }

    /// Identity of the singleton slot this entry occupies, if any.
    pub(crate) fn singleton_slot(&self) -> Option<SingletonSlot<'_>> {
        match (self.slot, self.merge_kind) {
            (Slot::Type, _) => Some(SingletonSlot::Type),
            (Slot::Chain, MergeKind::Singleton) => Some(SingletonSlot::Named(&self.name)),
            (Slot::Chain, MergeKind::Accumulating) => None,
        }
    }

    pub(crate) fn same_binding(&self, other: &BoundPolicy) -> bool {
        self.name == other.name && self.args == other.args
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SingletonSlot<'a> {
    Type,
    Named(&'a str),
}

impl PartialEq for BoundPolicy {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.args == other.args
            && self.slot == other.slot
            && self.merge_kind == other.merge_kind
    }
}

impl fmt::Debug for BoundPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundPolicy")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("slot", &self.slot)
            .field("merge_kind", &self.merge_kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test payloads are objects"),
        }
    }

    #[test]
    fn rules_defaults() {
        let policy = Rules::new().bind(&[]).unwrap();
        let data = payload(json!({ "a": 1 }));

        assert_eq!(policy.message(&json!(1)), "is invalid");
        assert!(policy.exists(&json!(1), "a", &data));
        assert!(policy.is_valid(&json!(1), "a", &data));
        let ctx = CoerceContext {
            key: "a",
            payload: &data,
        };
        assert_eq!(policy.coerce(&json!(1), &ctx), None);
        assert!(!policy.checks_absence());
    }

    #[test]
    fn rules_see_bound_args() {
        let factory = Rules::new()
            .message(|args, actual| format!("{} vs {}", args[0], actual))
            .validate(|args, value, _, _| value == &args[0]);
        let policy = factory.bind(&[json!("x")]).unwrap();
        let data = payload(json!({}));

        assert!(policy.is_valid(&json!("x"), "k", &data));
        assert!(!policy.is_valid(&json!("y"), "k", &data));
        assert_eq!(policy.message(&json!("y")), r#""x" vs "y""#);
    }

    #[test]
    fn rules_arity_is_enforced() {
        let factory = Rules::new().arity(1);
        assert!(factory.bind(&[json!(1)]).is_ok());
        let err = factory.bind(&[]).err().unwrap();
        assert_eq!(err.to_string(), "expects 1 argument(s), got 0");
    }

    #[test]
    fn instance_rejects_arguments() {
        struct Always;
        impl Policy for Always {}

        let factory = Instance::new(Always);
        assert!(factory.bind(&[]).is_ok());
        assert!(factory.bind(&[json!(1)]).is_err());
    }

    #[test]
    fn type_slot_is_always_singleton() {
        let policy = Rules::new().bind(&[]).unwrap();
        let bound = BoundPolicy::new(
            "string".into(),
            vec![],
            Slot::Type,
            MergeKind::Accumulating,
            policy,
        );
        assert_eq!(bound.merge_kind(), MergeKind::Singleton);
        assert_eq!(bound.singleton_slot(), Some(SingletonSlot::Type));
    }

    #[test]
    fn equality_ignores_implementation() {
        let a = BoundPolicy::new(
            "gt".into(),
            vec![json!(5)],
            Slot::Chain,
            MergeKind::Accumulating,
            Rules::new().bind(&[]).unwrap(),
        );
        let b = BoundPolicy::new(
            "gt".into(),
            vec![json!(5)],
            Slot::Chain,
            MergeKind::Accumulating,
            Rules::new().validate(|_, _, _, _| false).bind(&[]).unwrap(),
        );
        assert_eq!(a, b);
    }
}
