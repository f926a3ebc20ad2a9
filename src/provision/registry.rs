//! The provisioner registry.
//!
//! Maps provisioner slugs to registered handler types. The registry is an
//! explicit instance assembled at startup (see
//! [`crate::provisioners::builtin_registry`]) and passed into the
//! executor; registration is append-only for the process lifetime and
//! there is no removal operation.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::RegistryError;

use super::contract::Provisioner;

/// Lookup table from slug to provisioner type.
#[derive(Default)]
pub struct Registry {
    /// Registered handlers in registration order.
    slots: Vec<Arc<dyn Provisioner>>,
    /// Slug to slot index.
    index: HashMap<String, usize>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provisioner type under its spec's slug.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateSlug` if the slug is already taken.
    pub fn register(&mut self, provisioner: Arc<dyn Provisioner>) -> Result<(), RegistryError> {
        let slug = provisioner.spec().slug().to_owned();
        if self.index.contains_key(&slug) {
            return Err(RegistryError::DuplicateSlug { slug });
        }

        debug!("Registered provisioner '{slug}'");
        self.index.insert(slug, self.slots.len());
        self.slots.push(provisioner);
        Ok(())
    }

    /// Returns the provisioner type registered under `slug`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSlug` if nothing is registered under `slug`.
    pub fn get(&self, slug: &str) -> Result<Arc<dyn Provisioner>, RegistryError> {
        self.index
            .get(slug)
            .map(|&i| Arc::clone(&self.slots[i]))
            .ok_or_else(|| RegistryError::UnknownSlug {
                slug: slug.to_owned(),
            })
    }

    /// Iterates over all registered types in registration order.
    pub fn list(&self) -> impl Iterator<Item = &Arc<dyn Provisioner>> {
        self.slots.iter()
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
