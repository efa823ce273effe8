//! Error types for schema construction, declaration loading and resolution.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Errors raised while registering policies or building a schema.
///
/// These are fatal at build time: a schema that would reference an unknown
/// policy is never produced.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown policy '{name}'")]
    UnknownPolicy { name: String },

    #[error("invalid registration for policy '{name}': {message}")]
    InvalidRegistration { name: String, message: String },

    #[error("cannot register policy '{name}': registry is sealed")]
    RegistrySealed { name: String },

    #[error("invalid arguments for policy '{policy}': {message}")]
    InvalidArguments { policy: String, message: String },
}

impl ConfigError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// Rejected call arguments, reported by a policy factory while binding.
///
/// The registry wraps this into [`ConfigError::InvalidArguments`] together
/// with the policy name.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ArgumentError(pub String);

impl ArgumentError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors while loading JSON documents and schema declarations.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid declaration at {path}: {message}")]
    InvalidDeclaration { path: String, message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            LoadError::NetworkError { .. } => 3,
            LoadError::Config(e) => e.exit_code(),
            _ => 2,
        }
    }
}

/// Returned by [`Resolution::into_result`](crate::Resolution::into_result)
/// when a payload was rejected.
#[derive(Debug, Error)]
#[error("validation failed with {} error(s)", .errors.len())]
pub struct InvalidPayload {
    pub errors: Vec<FieldError>,
}

impl InvalidPayload {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Location of a field inside a (possibly nested) payload.
///
/// Serializes as the sequence of keys and array indexes, displays as
/// `addresses[0].street`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    /// The empty path (the payload itself).
    pub fn root() -> Self {
        Self::default()
    }

    /// Path of a nested key below this one.
    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Key(key.into()));
        Self(segments)
    }

    /// Path of an array element below this one.
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Index(index));
        Self(segments)
    }
}

impl From<&str> for FieldPath {
    fn from(key: &str) -> Self {
        FieldPath::root().key(key)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if i == 0 => write!(f, "{}", key)?,
                PathSegment::Key(key) => write!(f, ".{}", key)?,
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

/// Single validation error with path context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Keys (and array indexes) leading to the invalid field.
    pub path: FieldPath,
    /// Human-readable error message.
    pub message: String,
}

impl FieldError {
    pub fn new(path: FieldPath, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}
