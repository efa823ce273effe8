//! Declarative parameter schemas.
//!
//! Describe the shape of an untyped record as named fields, each with an
//! ordered chain of policies, then resolve input records against it. The
//! result is a normalized record holding only declared fields plus a list of
//! validation errors; bad data is reported, never raised.
//!
//! # Example
//!
//! ```
//! use param_schema::{PolicyRegistry, Schema};
//! use serde_json::json;
//!
//! let mut registry = PolicyRegistry::with_builtins();
//! registry.seal();
//!
//! let mut builder = Schema::builder(&registry);
//! builder.field("title").of_type("string").present();
//! builder.field("age").of_type("integer").default(20);
//! builder.field("status").options(["draft", "live"]);
//! let schema = builder.build().unwrap();
//!
//! let payload = json!({ "title": "", "status": "gone", "extra": true });
//! let result = schema.resolve(payload.as_object().unwrap());
//!
//! assert_eq!(json!(result.value), json!({ "age": 20 }));
//! let messages: Vec<String> = result.errors.iter().map(|e| e.to_string()).collect();
//! assert_eq!(
//!     messages,
//!     [
//!         "title: is required and value must be present",
//!         "status: must be one of draft, live, but got gone",
//!     ]
//! );
//! ```
//!
//! # Merge rules
//!
//! `base.merge(&extension)` keeps base's key order and appends keys only the
//! extension declares. For a key declared on both sides:
//!
//! | entry | effect |
//! |-------|--------|
//! | declared type (`of_type`) | extension replaces base in place; a type the base lacks is put first |
//! | default value | extension replaces base |
//! | singleton policies (`integer`, `number`, `string`, `boolean`, `split`) | extension replaces base |
//! | other policies | appended, identical name + arguments dropped |
//! | child schema | merged recursively |

mod builtins;
mod error;
mod field;
mod linter;
mod loader;
mod policy;
mod registry;
mod resolver;
mod schema;
mod types;

pub use builtins::Format;
pub use error::{
    ArgumentError, ConfigError, FieldError, FieldPath, InvalidPayload, LoadError, PathSegment,
};
pub use field::{FieldBuilder, FieldSpec};
pub use linter::{lint, lint_file, Diagnostic, FileResult, FileStatus, LintResult, Severity};
pub use loader::{
    is_url, load_json, load_json_auto, load_json_str, load_schema, schema_from_declaration,
};
pub use policy::{BoundPolicy, CoerceContext, Instance, MergeKind, Policy, PolicyFactory, Rules, Slot};
pub use registry::PolicyRegistry;
pub use resolver::{resolve, Resolution};
pub use schema::{Schema, SchemaBuilder};
pub use types::{as_number, display_value, inspect_value, is_blank, json_type_name, Payload};

#[cfg(feature = "remote")]
pub use loader::load_json_url;
