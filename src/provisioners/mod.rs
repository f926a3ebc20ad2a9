//! Built-in resource provisioners.
//!
//! Each provisioner implements the [`Provisioner`] contract over injected
//! collaborators. [`builtin_registry`] assembles them into a [`Registry`]
//! at startup; nothing registers itself as a side effect.

mod debug;
mod instance;
mod key_pair;
mod security_group;
mod user;

use std::sync::Arc;

use crate::cloud::{CloudClient, KeyPairStorage, RemoteExecutor};
use crate::error::Result;
use crate::provision::{Provisioner, Registry};

pub use debug::DebugProvisioner;
pub use instance::InstanceProvisioner;
pub use key_pair::KeyPairProvisioner;
pub use security_group::SecurityGroupProvisioner;
pub use user::UserProvisioner;

/// The external collaborators shared by the built-in provisioners.
#[derive(Clone)]
pub struct Collaborators {
    /// Cloud resource operations.
    pub cloud: Arc<dyn CloudClient>,
    /// Remote command execution.
    pub remote: Arc<dyn RemoteExecutor>,
    /// Local private key storage.
    pub key_storage: KeyPairStorage,
}

/// Builds the registry of built-in provisioners.
///
/// # Errors
///
/// Returns an error if a provisioner descriptor fails its self-check or a
/// slug is registered twice. Both indicate a programming error in this
/// module.
pub fn builtin_registry(collaborators: &Collaborators) -> Result<Registry> {
    let mut registry = Registry::default();

    registry.register(Arc::new(KeyPairProvisioner::new(
        Arc::clone(&collaborators.cloud),
        collaborators.key_storage.clone(),
    )?) as Arc<dyn Provisioner>)?;

    registry.register(Arc::new(SecurityGroupProvisioner::new(Arc::clone(
        &collaborators.cloud,
    ))?) as Arc<dyn Provisioner>)?;

    registry.register(Arc::new(InstanceProvisioner::new(Arc::clone(
        &collaborators.cloud,
    ))?) as Arc<dyn Provisioner>)?;

    registry.register(Arc::new(UserProvisioner::new(
        Arc::clone(&collaborators.cloud),
        Arc::clone(&collaborators.remote),
        collaborators.key_storage.clone(),
    )?) as Arc<dyn Provisioner>)?;

    registry.register(Arc::new(DebugProvisioner::new()?) as Arc<dyn Provisioner>)?;

    Ok(registry)
}
