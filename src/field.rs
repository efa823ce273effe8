//! Field declarations: one key, its policy chain, default and child schema.

use serde_json::Value;

use crate::error::ConfigError;
use crate::policy::{BoundPolicy, MergeKind, SingletonSlot, Slot};
use crate::registry::PolicyRegistry;
use crate::schema::{Schema, SchemaBuilder};

/// One declared field of a schema.
///
/// Built through [`FieldBuilder`]; read-only once the owning schema is built.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    key: String,
    chain: Vec<BoundPolicy>,
    default: Option<Value>,
    child: Option<Schema>,
}

impl FieldSpec {
    pub(crate) fn new(key: String) -> Self {
        Self {
            key,
            chain: Vec::new(),
            default: None,
            child: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Bound policies in evaluation order.
    pub fn chain(&self) -> &[BoundPolicy] {
        &self.chain
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Schema applied to a nested map, or to each element of a nested list.
    pub fn child(&self) -> Option<&Schema> {
        self.child.as_ref()
    }

    /// Name of the declared type policy, if any.
    pub fn type_name(&self) -> Option<&str> {
        self.chain
            .iter()
            .find(|p| p.slot() == Slot::Type)
            .map(BoundPolicy::name)
    }

    /// Combine this field with the same key declared in an extension.
    ///
    /// Singleton entries declared by the extension take over the base's
    /// position; a type the base lacks goes first. Accumulating entries are
    /// appended unless the same name and arguments are already in the chain.
    pub(crate) fn merged(&self, extension: &FieldSpec) -> FieldSpec {
        let mut chain = self.chain.clone();
        for entry in &extension.chain {
            match entry.singleton_slot() {
                Some(slot) => {
                    match chain.iter().position(|p| p.singleton_slot() == Some(slot)) {
                        Some(pos) => chain[pos] = entry.clone(),
                        None if slot == SingletonSlot::Type => chain.insert(0, entry.clone()),
                        None => chain.push(entry.clone()),
                    }
                }
                None => {
                    let duplicate = chain.iter().any(|p| {
                        p.merge_kind() == MergeKind::Accumulating && p.same_binding(entry)
                    });
                    if !duplicate {
                        chain.push(entry.clone());
                    }
                }
            }
        }

        let child = match (&self.child, &extension.child) {
            (Some(base), Some(ext)) => Some(base.merge(ext)),
            (base, ext) => ext.as_ref().or(base.as_ref()).cloned(),
        };

        FieldSpec {
            key: self.key.clone(),
            chain,
            default: extension.default.clone().or_else(|| self.default.clone()),
            child,
        }
    }
}

/// Chainable declaration of one field, handed out by
/// [`SchemaBuilder::field`].
///
/// Every call edits the field in place. The first configuration error (an
/// unknown policy, bad arguments) is kept and returned by
/// [`SchemaBuilder::build`]; later calls are ignored once an error is
/// recorded.
pub struct FieldBuilder<'a> {
    registry: &'a PolicyRegistry,
    spec: &'a mut FieldSpec,
    error: &'a mut Option<ConfigError>,
}

impl<'a> FieldBuilder<'a> {
    pub(crate) fn new(
        registry: &'a PolicyRegistry,
        spec: &'a mut FieldSpec,
        error: &'a mut Option<ConfigError>,
    ) -> Self {
        Self {
            registry,
            spec,
            error,
        }
    }

    fn push(self, name: &str, args: Vec<Value>, slot: Slot) -> Self {
        if self.error.is_some() {
            return self;
        }
        match self.registry.bind(name, args, slot) {
            Ok(bound) => match slot {
                Slot::Type => {
                    match self.spec.chain.iter().position(|p| p.slot() == Slot::Type) {
                        Some(pos) => self.spec.chain[pos] = bound,
                        None => self.spec.chain.push(bound),
                    }
                }
                Slot::Chain => self.spec.chain.push(bound),
            },
            Err(e) => *self.error = Some(e),
        }
        self
    }

    /// Apply a policy that takes no arguments.
    pub fn policy(self, name: &str) -> Self {
        self.push(name, Vec::new(), Slot::Chain)
    }

    /// Apply a policy with call arguments.
    pub fn policy_with<I>(self, name: &str, args: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.push(name, args.into_iter().collect(), Slot::Chain)
    }

    /// Declare the value type. A field has one type; declaring another
    /// replaces it.
    pub fn of_type(self, name: &str) -> Self {
        self.push(name, Vec::new(), Slot::Type)
    }

    /// Value used when the field is missing or does not count as present.
    /// Defaults are coerced but never validated.
    pub fn default(self, value: impl Into<Value>) -> Self {
        self.spec.default = Some(value.into());
        self
    }

    pub fn required(self) -> Self {
        self.policy("required")
    }

    pub fn present(self) -> Self {
        self.policy("present")
    }

    pub fn format(self, pattern: &str) -> Self {
        self.policy_with("format", [Value::from(pattern)])
    }

    pub fn format_with_message(self, pattern: &str, message: &str) -> Self {
        self.policy_with("format", [Value::from(pattern), Value::from(message)])
    }

    pub fn email(self) -> Self {
        self.policy("email")
    }

    pub fn options<I, V>(self, allowed: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let list: Vec<Value> = allowed.into_iter().map(Into::into).collect();
        self.policy_with("options", [Value::Array(list)])
    }

    pub fn gt(self, bound: impl Into<Value>) -> Self {
        self.policy_with("gt", [bound.into()])
    }

    pub fn lt(self, bound: impl Into<Value>) -> Self {
        self.policy_with("lt", [bound.into()])
    }

    /// Declare the nested schema inline.
    ///
    /// Declaring a nested schema twice merges the second over the first.
    pub fn schema<F>(self, declare: F) -> Self
    where
        F: FnOnce(&mut SchemaBuilder<'_>),
    {
        let mut nested = SchemaBuilder::new(self.registry);
        declare(&mut nested);
        let (schema, error) = nested.finish();
        if self.error.is_none() {
            *self.error = error;
        }
        self.child(schema)
    }

    /// Use an already built schema for nested values.
    pub fn child(self, schema: Schema) -> Self {
        self.spec.child = Some(match self.spec.child.take() {
            Some(existing) => existing.merge(&schema),
            None => schema,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chain_keeps_declaration_order() {
        let registry = PolicyRegistry::with_builtins();
        let mut builder = Schema::builder(&registry);
        builder.field("age").of_type("integer").required().gt(0).lt(150);
        let schema = builder.build().unwrap();

        let field = schema.field("age").unwrap();
        let names: Vec<&str> = field.chain().iter().map(|p| p.name()).collect();
        assert_eq!(names, ["integer", "required", "gt", "lt"]);
        assert_eq!(field.type_name(), Some("integer"));
    }

    #[test]
    fn second_type_replaces_first() {
        let registry = PolicyRegistry::with_builtins();
        let mut builder = Schema::builder(&registry);
        builder.field("n").of_type("integer").present().of_type("string");
        let schema = builder.build().unwrap();

        let field = schema.field("n").unwrap();
        let names: Vec<&str> = field.chain().iter().map(|p| p.name()).collect();
        assert_eq!(names, ["string", "present"]);
    }

    #[test]
    fn first_error_is_kept() {
        let registry = PolicyRegistry::with_builtins();
        let mut builder = Schema::builder(&registry);
        builder.field("a").policy("nope").policy("also_nope");
        let err = builder.build().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPolicy { name } if name == "nope"));
    }

    #[test]
    fn merged_singleton_replaces_in_place() {
        let registry = PolicyRegistry::with_builtins();
        let mut base = Schema::builder(&registry);
        base.field("n").of_type("integer").required().default(1);
        let base = base.build().unwrap();

        let mut ext = Schema::builder(&registry);
        ext.field("n").of_type("string").gt(3);
        let ext = ext.build().unwrap();

        let merged = base.field("n").unwrap().merged(ext.field("n").unwrap());
        let names: Vec<&str> = merged.chain().iter().map(|p| p.name()).collect();
        assert_eq!(names, ["string", "required", "gt"]);
        assert_eq!(merged.default_value(), Some(&json!(1)));
    }

    #[test]
    fn merged_new_type_goes_first() {
        let registry = PolicyRegistry::with_builtins();
        let mut base = Schema::builder(&registry);
        base.field("n").gt(5);
        let base = base.build().unwrap();

        let mut ext = Schema::builder(&registry);
        ext.field("n").of_type("integer");
        let ext = ext.build().unwrap();

        let merged = base.merge(&ext);
        let names: Vec<&str> = merged
            .field("n")
            .unwrap()
            .chain()
            .iter()
            .map(|p| p.name())
            .collect();
        assert_eq!(names, ["integer", "gt"]);

        let result = merged.resolve(json!({ "n": "abc" }).as_object().unwrap());
        assert_eq!(result.errors[0].message, r#"expects an integer, but got "abc""#);
    }

    #[test]
    fn merged_accumulating_deduplicates() {
        let registry = PolicyRegistry::with_builtins();
        let mut base = Schema::builder(&registry);
        base.field("n").required().gt(1);
        let base = base.build().unwrap();

        let mut ext = Schema::builder(&registry);
        ext.field("n").gt(1).gt(2).default(5);
        let ext = ext.build().unwrap();

        let merged = base.field("n").unwrap().merged(ext.field("n").unwrap());
        let entries: Vec<(&str, &[Value])> = merged
            .chain()
            .iter()
            .map(|p| (p.name(), p.args()))
            .collect();
        assert_eq!(
            entries,
            [
                ("required", &[][..]),
                ("gt", &[json!(1)][..]),
                ("gt", &[json!(2)][..]),
            ]
        );
        assert_eq!(merged.default_value(), Some(&json!(5)));
    }
}
