//! Task arguments and the global argument context.
//!
//! Plan arguments are dynamic YAML values. [`Arguments`] wraps them with
//! typed accessors that produce structured precondition errors instead of
//! ad hoc checks, and [`GlobalContext`] carries the run-wide values
//! (credentials, mostly) that are injected into every task ahead of the
//! plan-specific arguments.

use std::collections::BTreeMap;

use serde_yaml::Value;

use crate::error::ProvisionError;

/// Argument names that are always allowed by `bind`, regardless of a
/// provisioner's declared schema.
///
/// `name` sets the task's display name; the credential values are supplied
/// once per run rather than repeated per task in the plan document.
pub const RESERVED_GLOBAL_ARGS: &[&str] = &["name", "aws_access_key", "aws_secret_key"];

/// An argument mapping bound to one task invocation.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    values: BTreeMap<String, Value>,
}

impl Arguments {
    /// Creates an empty argument mapping.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Builds an argument mapping from a parsed YAML mapping.
    ///
    /// Returns the non-string key's rendering as an error message when a
    /// key is not a string.
    pub(crate) fn from_mapping(mapping: &serde_yaml::Mapping) -> Result<Self, String> {
        let mut values = BTreeMap::new();
        for (key, value) in mapping {
            let Some(key) = key.as_str() else {
                return Err(format!("argument key {key:?} is not a string"));
            };
            values.insert(key.to_owned(), value.clone());
        }
        Ok(Self { values })
    }

    /// Inserts or replaces an argument value.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Returns the raw value of an argument, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns true if the argument is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Iterates over the provided argument names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Returns a required string argument.
    ///
    /// # Errors
    ///
    /// Returns a precondition error if the argument is absent, not a
    /// string, or empty.
    pub fn str(&self, name: &str) -> Result<&str, ProvisionError> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| ProvisionError::precondition(format!("'{name}' should not be null")))?;
        let s = value.as_str().ok_or_else(|| {
            ProvisionError::precondition(format!("'{name}' is not a string value"))
        })?;
        if s.is_empty() {
            return Err(ProvisionError::precondition(format!(
                "'{name}' should not be empty"
            )));
        }
        Ok(s)
    }

    /// Returns an optional string argument.
    ///
    /// # Errors
    ///
    /// Returns a precondition error if the argument is present but not a
    /// string.
    pub fn opt_str(&self, name: &str) -> Result<Option<&str>, ProvisionError> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_str().map(Some).ok_or_else(|| {
                ProvisionError::precondition(format!("'{name}' is not a string value"))
            }),
        }
    }

    /// Returns a required unsigned integer argument.
    ///
    /// # Errors
    ///
    /// Returns a precondition error if the argument is absent or not an
    /// unsigned integer.
    pub fn u64(&self, name: &str) -> Result<u64, ProvisionError> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| ProvisionError::precondition(format!("'{name}' should not be null")))?;
        value.as_u64().ok_or_else(|| {
            ProvisionError::precondition(format!("'{name}' is not an unsigned integer"))
        })
    }

    /// Returns an optional unsigned integer argument.
    ///
    /// # Errors
    ///
    /// Returns a precondition error if the argument is present but not an
    /// unsigned integer.
    pub fn opt_u64(&self, name: &str) -> Result<Option<u64>, ProvisionError> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_u64().map(Some).ok_or_else(|| {
                ProvisionError::precondition(format!("'{name}' is not an unsigned integer"))
            }),
        }
    }

    /// Returns a required sequence argument.
    ///
    /// # Errors
    ///
    /// Returns a precondition error if the argument is absent or not a
    /// sequence.
    pub fn seq(&self, name: &str) -> Result<&Vec<Value>, ProvisionError> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| ProvisionError::precondition(format!("'{name}' should not be null")))?;
        value
            .as_sequence()
            .ok_or_else(|| ProvisionError::precondition(format!("'{name}' is not a sequence")))
    }

    /// Merges the global context into this mapping. Global keys always
    /// override task-local duplicates.
    pub fn merge_globals(&mut self, globals: &GlobalContext) {
        for (name, value) in globals.entries() {
            self.values.insert(name.clone(), value.clone());
        }
    }
}

/// Run-wide argument values injected into every task.
#[derive(Debug, Clone, Default)]
pub struct GlobalContext {
    values: BTreeMap<String, Value>,
}

impl GlobalContext {
    /// Creates an empty global context.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Adds a global value.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Returns true if a global with this name is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Iterates over the global entries.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}
