//! Loading JSON documents and schema declarations.
//!
//! Documents come from files, strings, or HTTP URLs (feature `remote`).
//! A schema declaration looks like:
//!
//! ```json
//! {
//!   "options": { "name": "signup" },
//!   "fields": {
//!     "title": { "type": "string", "policies": ["present"] },
//!     "age": { "type": "integer", "default": 20, "policies": [{ "gt": 0 }] },
//!     "address": {
//!       "type": "object",
//!       "schema": { "fields": { "city": { "policies": ["required"] } } }
//!     }
//!   }
//! }
//! ```
//!
//! A policy entry is a bare name, or a one-key object whose value is the
//! argument list (an array) or a single argument (anything else).

use std::path::Path;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::LoadError;
use crate::registry::PolicyRegistry;
use crate::schema::{Schema, SchemaBuilder};
use crate::types::{json_type_name, FIELD_ATTRIBUTES};

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Load a JSON document from a file path.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// or `LoadError::InvalidJson` if the file isn't valid JSON.
pub fn load_json(path: &Path) -> Result<Value, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| LoadError::InvalidJson { source })
}

/// Load a JSON document from a string.
///
/// # Errors
///
/// Returns `LoadError::InvalidJson` if the string isn't valid JSON.
pub fn load_json_str(content: &str) -> Result<Value, LoadError> {
    serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })
}

/// Load a JSON document from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `LoadError::NetworkError` if the request fails or the server
/// answers with an error status, or `LoadError::InvalidJson` if the body
/// isn't valid JSON.
#[cfg(feature = "remote")]
pub fn load_json_url(url: &str) -> Result<Value, LoadError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|source| LoadError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    let response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|source| LoadError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    let body = response.text().map_err(|source| LoadError::NetworkError {
        url: url.to_string(),
        source,
    })?;
    load_json_str(&body)
}

/// Load from a URL when `source` looks like one, otherwise from a file.
///
/// # Errors
///
/// See [`load_json`] and [`load_json_url`].
pub fn load_json_auto(source: &str) -> Result<Value, LoadError> {
    #[cfg(feature = "remote")]
    if is_url(source) {
        return load_json_url(source);
    }
    load_json(Path::new(source))
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load a declaration (file or URL) and build it into a schema.
///
/// # Errors
///
/// Returns IO/parse errors from loading, `LoadError::InvalidDeclaration` for
/// a malformed declaration, or `LoadError::Config` for unknown policies and
/// bad arguments.
pub fn load_schema(source: &str, registry: &PolicyRegistry) -> Result<Schema, LoadError> {
    let declaration = load_json_auto(source)?;
    let schema = schema_from_declaration(&declaration, registry)?;
    debug!(source, fields = schema.len(), "schema declaration loaded");
    Ok(schema)
}

/// Build a schema from a parsed declaration.
///
/// # Errors
///
/// Returns `LoadError::InvalidDeclaration` for a malformed declaration, or
/// `LoadError::Config` for unknown policies and bad arguments.
pub fn schema_from_declaration(
    declaration: &Value,
    registry: &PolicyRegistry,
) -> Result<Schema, LoadError> {
    let mut builder = Schema::builder(registry);
    declare(declaration, &mut builder, "")?;
    Ok(builder.build()?)
}

/// A policy reference parsed from a declaration: name and call arguments.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PolicyRef {
    pub name: String,
    pub args: Vec<Value>,
    pub path: String,
}

/// A field declaration with its shape checked.
pub(crate) struct FieldDecl<'a> {
    pub key: &'a str,
    pub path: String,
    pub type_name: Option<&'a str>,
    pub default: Option<&'a Value>,
    pub policies: Vec<PolicyRef>,
    pub schema: Option<&'a Value>,
}

/// Escape a key for use as a JSON pointer token (RFC 6901).
fn escape_pointer_token(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

fn invalid(path: &str, message: impl Into<String>) -> LoadError {
    LoadError::InvalidDeclaration {
        path: if path.is_empty() { "/".to_string() } else { path.to_string() },
        message: message.into(),
    }
}

/// Check the top-level shape and return the options and field entries.
pub(crate) fn parse_declaration<'a>(
    declaration: &'a Value,
    path: &str,
) -> Result<(Option<&'a Map<String, Value>>, Vec<FieldDecl<'a>>), LoadError> {
    let obj = declaration.as_object().ok_or_else(|| {
        invalid(
            path,
            format!("expected object, got {}", json_type_name(declaration)),
        )
    })?;

    for key in obj.keys() {
        if key != "options" && key != "fields" {
            return Err(invalid(path, format!("unknown key \"{}\"", key)));
        }
    }

    let options = match obj.get("options") {
        None => None,
        Some(Value::Object(map)) => Some(map),
        Some(other) => {
            return Err(invalid(
                &format!("{}/options", path),
                format!("expected object, got {}", json_type_name(other)),
            ))
        }
    };

    let fields = match obj.get("fields") {
        None => return Ok((options, Vec::new())),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(invalid(
                &format!("{}/fields", path),
                format!("expected object, got {}", json_type_name(other)),
            ))
        }
    };

    let mut decls = Vec::with_capacity(fields.len());
    for (key, value) in fields {
        let field_path = format!("{}/fields/{}", path, escape_pointer_token(key));
        decls.push(parse_field(key, value, &field_path)?);
    }
    Ok((options, decls))
}

fn parse_field<'a>(key: &'a str, value: &'a Value, path: &str) -> Result<FieldDecl<'a>, LoadError> {
    let obj = value.as_object().ok_or_else(|| {
        invalid(
            path,
            format!("expected object, got {}", json_type_name(value)),
        )
    })?;

    for attr in obj.keys() {
        if !FIELD_ATTRIBUTES.contains(&attr.as_str()) {
            return Err(invalid(
                path,
                format!(
                    "unknown attribute \"{}\": expected {}",
                    attr,
                    FIELD_ATTRIBUTES.join(", ")
                ),
            ));
        }
    }

    let type_name = match obj.get("type") {
        None => None,
        Some(Value::String(s)) => Some(s.as_str()),
        Some(other) => {
            return Err(invalid(
                &format!("{}/type", path),
                format!("expected string, got {}", json_type_name(other)),
            ))
        }
    };

    let policies = match obj.get("policies") {
        None => Vec::new(),
        Some(Value::Array(entries)) => entries
            .iter()
            .enumerate()
            .map(|(i, entry)| parse_policy(entry, &format!("{}/policies/{}", path, i)))
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => {
            return Err(invalid(
                &format!("{}/policies", path),
                format!("expected array, got {}", json_type_name(other)),
            ))
        }
    };

    Ok(FieldDecl {
        key,
        path: path.to_string(),
        type_name,
        default: obj.get("default"),
        policies,
        schema: obj.get("schema"),
    })
}

fn parse_policy(entry: &Value, path: &str) -> Result<PolicyRef, LoadError> {
    match entry {
        Value::String(name) => Ok(PolicyRef {
            name: name.clone(),
            args: Vec::new(),
            path: path.to_string(),
        }),
        Value::Object(map) if map.len() == 1 => {
            let (name, args) = map.iter().next().ok_or_else(|| invalid(path, "empty policy"))?;
            let args = match args {
                Value::Array(list) => list.clone(),
                single => vec![single.clone()],
            };
            Ok(PolicyRef {
                name: name.clone(),
                args,
                path: path.to_string(),
            })
        }
        Value::Object(map) => Err(invalid(
            path,
            format!("expected a single policy name, got {} keys", map.len()),
        )),
        other => Err(invalid(
            path,
            format!("expected string or object, got {}", json_type_name(other)),
        )),
    }
}

fn declare(
    declaration: &Value,
    builder: &mut SchemaBuilder<'_>,
    path: &str,
) -> Result<(), LoadError> {
    let (options, fields) = parse_declaration(declaration, path)?;
    if let Some(options) = options {
        builder.options(options.clone());
    }

    for decl in fields {
        let mut field = builder.field(decl.key);
        if let Some(name) = decl.type_name {
            field = field.of_type(name);
        }
        if let Some(default) = decl.default {
            field = field.default(default.clone());
        }
        for policy in decl.policies {
            field = field.policy_with(&policy.name, policy.args);
        }
        if let Some(nested) = decl.schema {
            let mut outcome = Ok(());
            let nested_path = format!("{}/schema", decl.path);
            field.schema(|child| outcome = declare(nested, child, &nested_path));
            outcome?;
        }
        if let Some(error) = builder.error() {
            debug!(path = %decl.path, %error, "declaration rejected");
            break;
        }
    }
    Ok(())
}
