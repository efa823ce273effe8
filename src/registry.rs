//! Policy registry: the catalog schemas look policy names up in.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace};

use crate::builtins;
use crate::error::ConfigError;
use crate::policy::{BoundPolicy, Instance, Policy, PolicyFactory, Slot};

/// Maps policy names to factories.
///
/// Registration needs `&mut self`, so a registry shared by reference is
/// already read-only. [`seal`](Self::seal) makes that explicit for registries
/// handed to other components: later registrations fail with
/// [`ConfigError::RegistrySealed`].
///
/// Re-registering a name replaces the previous factory (last write wins).
pub struct PolicyRegistry {
    factories: HashMap<String, Arc<dyn PolicyFactory>>,
    sealed: bool,
}

impl PolicyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            sealed: false,
        }
    }

    /// A registry with every built-in policy registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtins::install(&mut registry);
        registry
    }

    /// Register (or replace) a policy factory.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::RegistrySealed` after [`seal`](Self::seal), or
    /// `ConfigError::InvalidRegistration` for an empty name.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<(), ConfigError>
    where
        F: PolicyFactory + 'static,
    {
        let name = name.into();
        if self.sealed {
            return Err(ConfigError::RegistrySealed { name });
        }
        if name.trim().is_empty() {
            return Err(ConfigError::InvalidRegistration {
                name,
                message: "policy name must not be empty".to_string(),
            });
        }
        if self.factories.contains_key(&name) {
            debug!(policy = %name, "replacing registered policy");
        }
        self.insert(name, Arc::new(factory));
        Ok(())
    }

    /// Register a ready-made policy object that takes no arguments.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn register_instance<P>(
        &mut self,
        name: impl Into<String>,
        policy: P,
    ) -> Result<(), ConfigError>
    where
        P: Policy + 'static,
    {
        self.register(name, Instance::new(policy))
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, factory: Arc<dyn PolicyFactory>) {
        self.factories.insert(name.into(), factory);
    }

    /// Look up a factory by name.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownPolicy` if nothing is registered under
    /// `name`.
    pub fn lookup(&self, name: &str) -> Result<&dyn PolicyFactory, ConfigError> {
        self.factories
            .get(name)
            .map(|f| f.as_ref())
            .ok_or_else(|| ConfigError::UnknownPolicy {
                name: name.to_string(),
            })
    }

    /// Look up `name` and bind `args` into a chain entry.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownPolicy` or
    /// `ConfigError::InvalidArguments`.
    pub fn bind(&self, name: &str, args: Vec<Value>, slot: Slot) -> Result<BoundPolicy, ConfigError> {
        let factory = self.lookup(name)?;
        let policy = factory
            .bind(&args)
            .map_err(|e| ConfigError::InvalidArguments {
                policy: name.to_string(),
                message: e.to_string(),
            })?;
        trace!(policy = name, args = args.len(), "policy bound");
        Ok(BoundPolicy::new(
            name.to_string(),
            args,
            slot,
            factory.merge_kind(),
            policy,
        ))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Refuse further registrations.
    pub fn seal(&mut self) {
        if !self.sealed {
            debug!(policies = self.factories.len(), "policy registry sealed");
        }
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("policies", &self.names())
            .field("sealed", &self.sealed)
            .finish()
    }
}
