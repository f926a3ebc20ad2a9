//! File-backed key-value state store.
//!
//! The store maps caller-chosen reference names to opaque resource
//! identifiers (for example a list of instance ids). No provisioner owns a
//! key: any provisioner may read or write any entry, and the reference name
//! is the correlation key between creation and later deletion or reuse.
//!
//! Every mutating operation fully rewrites the backing file from the
//! in-memory map. A failed write leaves the prior file contents or an
//! inconsistent file; no partial-write recovery is attempted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tracing::{debug, info};

use crate::error::StateError;

/// Default state directory name under the user's home directory.
const STATE_DIR: &str = ".cloudplan";

/// State file name.
const STATE_FILE: &str = "state.yaml";

/// Persisted mapping from reference name to opaque resource identifiers.
#[derive(Debug)]
pub struct StateStore {
    /// Path to the backing file; `None` for a purely in-memory store.
    path: Option<PathBuf>,
    /// The in-memory map, authoritative between mutations.
    entries: BTreeMap<String, Value>,
}

impl StateStore {
    /// Returns the default per-user state file path
    /// (`~/.cloudplan/state.yaml`).
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn default_path() -> Result<PathBuf, StateError> {
        let home = dirs::home_dir().ok_or(StateError::NoHomeDir)?;
        Ok(home.join(STATE_DIR).join(STATE_FILE))
    }

    /// Opens the store at `path`, creating an empty file on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created, read, or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let path = path.into();

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| StateError::Load {
                path: path.clone(),
                message: e.to_string(),
            })?;

            let entries: BTreeMap<String, Value> = if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_yaml::from_str(&content).map_err(|e| StateError::Load {
                    path: path.clone(),
                    message: e.to_string(),
                })?
            };

            debug!("Loaded {} state entries from {}", entries.len(), path.display());
            return Ok(Self {
                path: Some(path),
                entries,
            });
        }

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                info!("Creating state directory: {}", parent.display());
                std::fs::create_dir_all(parent).map_err(|e| StateError::Persist {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            }
        }

        info!("Creating state file: {}", path.display());
        let store = Self {
            path: Some(path),
            entries: BTreeMap::new(),
        };
        store.persist()?;
        Ok(store)
    }

    /// Creates a store that lives only in memory. Used by tests and by
    /// callers that do not want persistence.
    #[must_use]
    pub const fn in_memory() -> Self {
        Self {
            path: None,
            entries: BTreeMap::new(),
        }
    }

    /// Returns the value stored under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Returns the value stored under `key` interpreted as a list of
    /// string identifiers.
    ///
    /// A single string value is treated as a one-element list.
    #[must_use]
    pub fn get_ids(&self, key: &str) -> Option<Vec<String>> {
        match self.entries.get(key)? {
            Value::String(s) => Some(vec![s.clone()]),
            Value::Sequence(seq) => Some(
                seq.iter()
                    .filter_map(|v| v.as_str().map(str::to_owned))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Returns true if a value is stored under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Stores `value` under `key` and rewrites the backing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be rewritten.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Result<(), StateError> {
        let key = key.into();
        debug!("State set: '{key}'");
        self.entries.insert(key, value);
        self.persist()
    }

    /// Removes the entry under `key` and rewrites the backing file.
    ///
    /// Removing an absent key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be rewritten.
    pub fn delete(&mut self, key: &str) -> Result<(), StateError> {
        if self.entries.remove(key).is_none() {
            debug!("State delete: '{key}' was not present");
            return Ok(());
        }
        debug!("State delete: '{key}'");
        self.persist()
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over all entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Returns a copy of the current contents. Used by tests to assert
    /// that dry runs leave the store untouched.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.entries.clone()
    }

    /// Returns the backing file path, if the store is persistent.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Rewrites the backing file from the in-memory map.
    fn persist(&self) -> Result<(), StateError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let content = serde_yaml::to_string(&self.entries).map_err(|e| StateError::Serialize {
            message: e.to_string(),
        })?;

        std::fs::write(path, content).map_err(|e| StateError::Persist {
            path: path.clone(),
            message: e.to_string(),
        })?;

        debug!("Flushed {} state entries to {}", self.entries.len(), path.display());
        Ok(())
    }
}
