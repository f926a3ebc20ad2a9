//! Cloud resource client capability.
//!
//! [`CloudClient`] is the seam between provisioners and the cloud
//! provider. Every operation returns [`ExternalError`] with an explicit
//! `NotFound` variant, so teardown paths can tolerate "resource confirmed
//! absent" without masking authorization or network failures.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::error::ExternalError;

/// Result alias for collaborator operations.
pub type CloudResult<T> = Result<T, ExternalError>;

/// A freshly created key pair, including its private key material.
#[derive(Debug, Clone)]
pub struct KeyPairMaterial {
    /// The key pair name.
    pub name: String,
    /// Provider-reported fingerprint.
    pub fingerprint: String,
    /// PEM-encoded private key. Only available at creation time.
    pub private_key_pem: String,
}

/// An ingress rule on a security group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRule {
    /// IP protocol.
    pub protocol: Protocol,
    /// First port of the allowed range.
    pub from_port: u16,
    /// Last port of the allowed range.
    pub to_port: u16,
    /// CIDR block granted access.
    pub cidr_ip: String,
}

/// Supported ingress protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// TCP.
    Tcp,
    /// UDP.
    Udp,
    /// ICMP.
    Icmp,
}

impl Protocol {
    /// All protocol names accepted in plan rules.
    pub const ALLOWED: &'static [&'static str] = &["tcp", "udp", "icmp"];

    /// Returns the wire name of the protocol.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "icmp" => Ok(Self::Icmp),
            other => Err(format!(
                "'{other}' is not a valid protocol. Valid values: {:?}",
                Self::ALLOWED
            )),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An existing security group and its current rules.
#[derive(Debug, Clone)]
pub struct SecurityGroupInfo {
    /// Provider-assigned group id.
    pub id: String,
    /// The group name.
    pub name: String,
    /// Currently authorized ingress rules.
    pub rules: Vec<IngressRule>,
}

/// Parameters for launching instances.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Machine image id.
    pub image_id: String,
    /// Instance type name.
    pub instance_type: String,
    /// Key pair granting SSH access.
    pub key_name: String,
    /// Security group id attached to the instances.
    pub security_group_id: String,
    /// Number of instances to launch.
    pub count: u32,
}

/// Lifecycle state of a remote instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceLifecycle {
    /// Provisioning, not yet running.
    Pending,
    /// Up and reachable.
    Running,
    /// Shutting down or stopping.
    Stopping,
    /// Stopped but not destroyed.
    Stopped,
    /// Destroyed.
    Terminated,
}

impl fmt::Display for InstanceLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

/// A provider-side instance as seen by `launch`/`describe`.
#[derive(Debug, Clone)]
pub struct RemoteInstance {
    /// Provider-assigned instance id.
    pub id: String,
    /// Public DNS name, once assigned.
    pub public_dns: Option<String>,
    /// Current lifecycle state.
    pub lifecycle: InstanceLifecycle,
}

/// Cloud resource operations consumed by the built-in provisioners.
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// Returns true if a key pair with this name exists in the region.
    async fn key_pair_exists(&self, region: &str, key_name: &str) -> CloudResult<bool>;

    /// Creates a key pair and returns its private key material.
    async fn create_key_pair(&self, region: &str, key_name: &str) -> CloudResult<KeyPairMaterial>;

    /// Deletes a key pair. `NotFound` when it does not exist.
    async fn delete_key_pair(&self, region: &str, key_name: &str) -> CloudResult<()>;

    /// Looks up a security group by name.
    async fn find_security_group(
        &self,
        region: &str,
        group_name: &str,
    ) -> CloudResult<Option<SecurityGroupInfo>>;

    /// Creates a security group with no rules.
    async fn create_security_group(
        &self,
        region: &str,
        group_name: &str,
        description: &str,
    ) -> CloudResult<SecurityGroupInfo>;

    /// Authorizes one ingress rule on an existing group.
    async fn authorize_ingress(
        &self,
        region: &str,
        group_id: &str,
        rule: &IngressRule,
    ) -> CloudResult<()>;

    /// Deletes a security group by name. `NotFound` when it does not
    /// exist.
    async fn delete_security_group(&self, region: &str, group_name: &str) -> CloudResult<()>;

    /// Launches instances and returns them (possibly still pending).
    async fn launch_instances(
        &self,
        region: &str,
        spec: &LaunchSpec,
    ) -> CloudResult<Vec<RemoteInstance>>;

    /// Describes instances by id.
    async fn describe_instances(
        &self,
        region: &str,
        ids: &[String],
    ) -> CloudResult<Vec<RemoteInstance>>;

    /// Terminates instances by id.
    async fn terminate_instances(&self, region: &str, ids: &[String]) -> CloudResult<()>;
}
