//! Schemas: ordered field declarations, composable through merge.

use serde_json::{json, Map, Value};
use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::field::{FieldBuilder, FieldSpec};
use crate::policy::Slot;
use crate::registry::PolicyRegistry;
use crate::resolver::{resolve, Resolution};
use crate::types::Payload;

/// An ordered collection of fields plus opaque declaration options.
///
/// Immutable once built; `merge` always returns a new schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    fields: Vec<FieldSpec>,
    options: Map<String, Value>,
}

impl Schema {
    /// A schema with no fields. Neutral element of [`merge`](Self::merge).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Start declaring a schema whose policies come from `registry`.
    pub fn builder(registry: &PolicyRegistry) -> SchemaBuilder<'_> {
        SchemaBuilder::new(registry)
    }

    /// Start declaring an extension of this schema.
    ///
    /// The built schema is `self.merge(&extension)`.
    pub fn extend<'r>(&self, registry: &'r PolicyRegistry) -> SchemaBuilder<'r> {
        let mut builder = SchemaBuilder::new(registry);
        builder.base = Some(self.clone());
        builder
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key() == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(FieldSpec::key)
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Compose `extension` over this schema.
    ///
    /// Keys keep this schema's order, followed by keys only the extension
    /// declares. Fields declared on both sides are combined entry by entry
    /// (see [`FieldSpec`] merge rules); options are unioned with the
    /// extension winning.
    pub fn merge(&self, extension: &Schema) -> Schema {
        let mut fields: Vec<FieldSpec> = self
            .fields
            .iter()
            .map(|field| match extension.field(field.key()) {
                Some(ext) => field.merged(ext),
                None => field.clone(),
            })
            .collect();
        fields.extend(
            extension
                .fields
                .iter()
                .filter(|f| self.field(f.key()).is_none())
                .cloned(),
        );

        let mut options = self.options.clone();
        for (key, value) in &extension.options {
            options.insert(key.clone(), value.clone());
        }

        trace!(
            base = self.fields.len(),
            extension = extension.fields.len(),
            merged = fields.len(),
            "schemas merged"
        );
        Schema { fields, options }
    }

    /// Resolve a payload against this schema. See [`resolve`].
    pub fn resolve(&self, payload: &Payload) -> Resolution {
        resolve(self, payload)
    }

    /// Describe every field as JSON: type, default, policies and nested
    /// structure, in declaration order.
    pub fn structure(&self) -> Value {
        let mut out = Map::new();
        for field in &self.fields {
            let mut entry = Map::new();
            if let Some(name) = field.type_name() {
                entry.insert("type".to_string(), json!(name));
            }
            if let Some(default) = field.default_value() {
                entry.insert("default".to_string(), default.clone());
            }
            let policies: Vec<Value> = field
                .chain()
                .iter()
                .filter(|p| p.slot() == Slot::Chain)
                .map(|p| {
                    if p.args().is_empty() {
                        json!(p.name())
                    } else {
                        json!({ p.name(): p.args() })
                    }
                })
                .collect();
            entry.insert("policies".to_string(), Value::Array(policies));
            if let Some(child) = field.child() {
                entry.insert("structure".to_string(), child.structure());
            }
            out.insert(field.key().to_string(), Value::Object(entry));
        }
        Value::Object(out)
    }
}

/// Accumulates field declarations into a [`Schema`].
///
/// ```
/// use param_schema::{PolicyRegistry, Schema};
///
/// let registry = PolicyRegistry::with_builtins();
/// let mut builder = Schema::builder(&registry);
/// builder.field("title").of_type("string").present();
/// builder.field("age").of_type("integer").default(20);
/// let schema = builder.build().unwrap();
///
/// assert_eq!(schema.keys().collect::<Vec<_>>(), ["title", "age"]);
/// ```
pub struct SchemaBuilder<'r> {
    registry: &'r PolicyRegistry,
    base: Option<Schema>,
    fields: Vec<FieldSpec>,
    options: Map<String, Value>,
    error: Option<ConfigError>,
}

impl<'r> SchemaBuilder<'r> {
    pub(crate) fn new(registry: &'r PolicyRegistry) -> Self {
        Self {
            registry,
            base: None,
            fields: Vec::new(),
            options: Map::new(),
            error: None,
        }
    }

    /// Add declaration options; later keys overwrite earlier ones.
    pub fn options(&mut self, options: Map<String, Value>) -> &mut Self {
        for (key, value) in options {
            self.options.insert(key, value);
        }
        self
    }

    pub fn option(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Declare a field. Declaring the same key again starts that field over,
    /// keeping its position.
    pub fn field(&mut self, key: impl Into<String>) -> FieldBuilder<'_> {
        let key = key.into();
        let index = match self.fields.iter().position(|f| f.key() == key) {
            Some(index) => {
                self.fields[index] = FieldSpec::new(key);
                index
            }
            None => {
                self.fields.push(FieldSpec::new(key));
                self.fields.len() - 1
            }
        };
        FieldBuilder::new(self.registry, &mut self.fields[index], &mut self.error)
    }

    /// The first configuration error recorded so far, if any.
    pub fn error(&self) -> Option<&ConfigError> {
        self.error.as_ref()
    }

    pub(crate) fn finish(self) -> (Schema, Option<ConfigError>) {
        let schema = Schema {
            fields: self.fields,
            options: self.options,
        };
        let schema = match self.base {
            Some(base) => base.merge(&schema),
            None => schema,
        };
        (schema, self.error)
    }

    /// Finish the declaration.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` recorded while declaring fields.
    pub fn build(self) -> Result<Schema, ConfigError> {
        let (schema, error) = self.finish();
        if let Some(error) = error {
            return Err(error);
        }
        debug!(fields = schema.len(), "schema built");
        Ok(schema)
    }
}
