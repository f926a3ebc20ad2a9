//! External collaborator interfaces and adapters.
//!
//! The engine core only sees the capability traits defined here:
//! [`CloudClient`] for cloud resource operations, [`RemoteExecutor`] for
//! command execution over a transport, and [`KeyPairStorage`] for on-disk
//! private key material. Production adapters ([`Ec2CloudClient`],
//! [`SshExecutor`]) live beside them; tests replace them with the
//! recording fakes in `fake`.

mod client;
mod ec2;
mod keys;
mod remote;

#[cfg(test)]
pub mod fake;

pub use client::{
    CloudClient, CloudResult, IngressRule, InstanceLifecycle, KeyPairMaterial, LaunchSpec,
    Protocol, RemoteInstance, SecurityGroupInfo,
};
pub use ec2::Ec2CloudClient;
pub use keys::KeyPairStorage;
pub use remote::{RemoteCommand, RemoteExecutor, RemoteOutput, SshExecutor, UploadSpec};
