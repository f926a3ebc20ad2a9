//! AWS EC2 adapter for the [`CloudClient`] capability.
//!
//! One SDK client is built lazily per region and cached for the process
//! lifetime. Credentials come from an explicit static pair when provided,
//! otherwise from the default `aws-config` provider chain.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_ec2::Client;
use aws_sdk_ec2::config::Credentials;
use aws_sdk_ec2::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_ec2::types::{Filter, InstanceStateName, InstanceType, IpPermission, IpRange};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ExternalError;

use super::client::{
    CloudClient, CloudResult, IngressRule, InstanceLifecycle, KeyPairMaterial, LaunchSpec,
    Protocol, RemoteInstance, SecurityGroupInfo,
};

/// EC2-backed cloud client.
#[derive(Debug)]
pub struct Ec2CloudClient {
    /// Explicit static credentials, when not using the provider chain.
    credentials: Option<Credentials>,
    /// One client per region, built on first use.
    clients: Mutex<HashMap<String, Client>>,
}

impl Ec2CloudClient {
    /// Creates an adapter using the default credential provider chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            credentials: None,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Creates an adapter with explicit static credentials.
    #[must_use]
    pub fn with_credentials(access_key: &str, secret_key: &str) -> Self {
        Self {
            credentials: Some(Credentials::new(
                access_key, secret_key, None, None, "cloudplan",
            )),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached client for `region`, building it on first use.
    async fn client_for(&self, region: &str) -> Client {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(region) {
            return client.clone();
        }

        debug!("Building EC2 client for region '{region}'");
        let mut loader =
            aws_config::from_env().region(aws_config::Region::new(region.to_owned()));
        if let Some(credentials) = &self.credentials {
            loader = loader.credentials_provider(credentials.clone());
        }
        let config = loader.load().await;

        let client = Client::new(&config);
        clients.insert(region.to_owned(), client.clone());
        client
    }
}

impl Default for Ec2CloudClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps an SDK failure to [`ExternalError`], degrading EC2 `*.NotFound`
/// error codes to the explicit not-found variant.
fn external<E, R>(operation: &'static str, resource: &str, err: SdkError<E, R>) -> ExternalError
where
    SdkError<E, R>: ProvideErrorMetadata + std::fmt::Debug,
{
    let code = ProvideErrorMetadata::code(&err).map(str::to_owned);
    if code.as_deref().is_some_and(|c| c.ends_with(".NotFound")) {
        return ExternalError::not_found(resource);
    }

    let message = ProvideErrorMetadata::message(&err)
        .map_or_else(|| format!("{err:?}"), str::to_owned);
    ExternalError::operation(operation, message)
}

/// Maps an SDK instance state name to the engine's lifecycle enum.
fn lifecycle_of(state: Option<&InstanceStateName>) -> InstanceLifecycle {
    match state.map(InstanceStateName::as_str) {
        Some("running") => InstanceLifecycle::Running,
        Some("shutting-down" | "stopping") => InstanceLifecycle::Stopping,
        Some("stopped") => InstanceLifecycle::Stopped,
        Some("terminated") => InstanceLifecycle::Terminated,
        _ => InstanceLifecycle::Pending,
    }
}

/// Converts an SDK instance to the engine's view of it.
fn remote_instance(instance: &aws_sdk_ec2::types::Instance) -> RemoteInstance {
    RemoteInstance {
        id: instance.instance_id().unwrap_or_default().to_owned(),
        public_dns: instance
            .public_dns_name()
            .filter(|dns| !dns.is_empty())
            .map(str::to_owned),
        lifecycle: lifecycle_of(instance.state().and_then(|s| s.name())),
    }
}

#[async_trait]
impl CloudClient for Ec2CloudClient {
    async fn key_pair_exists(&self, region: &str, key_name: &str) -> CloudResult<bool> {
        let client = self.client_for(region).await;
        let result = client
            .describe_key_pairs()
            .key_names(key_name)
            .send()
            .await;

        match result {
            Ok(out) => Ok(!out.key_pairs().is_empty()),
            Err(err) => {
                let mapped = external("describe key pairs", &format!("Key pair '{key_name}'"), err);
                if mapped.is_not_found() {
                    Ok(false)
                } else {
                    Err(mapped)
                }
            }
        }
    }

    async fn create_key_pair(&self, region: &str, key_name: &str) -> CloudResult<KeyPairMaterial> {
        let client = self.client_for(region).await;
        let out = client
            .create_key_pair()
            .key_name(key_name)
            .send()
            .await
            .map_err(|e| external("create key pair", &format!("Key pair '{key_name}'"), e))?;

        Ok(KeyPairMaterial {
            name: out.key_name().unwrap_or(key_name).to_owned(),
            fingerprint: out.key_fingerprint().unwrap_or_default().to_owned(),
            private_key_pem: out.key_material().unwrap_or_default().to_owned(),
        })
    }

    async fn delete_key_pair(&self, region: &str, key_name: &str) -> CloudResult<()> {
        let client = self.client_for(region).await;

        // DeleteKeyPair succeeds for absent keys, so probe first to give
        // teardown its explicit not-found signal.
        let existing = client
            .describe_key_pairs()
            .key_names(key_name)
            .send()
            .await
            .map_err(|e| external("describe key pairs", &format!("Key pair '{key_name}'"), e))?;
        if existing.key_pairs().is_empty() {
            return Err(ExternalError::not_found(format!("Key pair '{key_name}'")));
        }

        client
            .delete_key_pair()
            .key_name(key_name)
            .send()
            .await
            .map_err(|e| external("delete key pair", &format!("Key pair '{key_name}'"), e))?;
        Ok(())
    }

    async fn find_security_group(
        &self,
        region: &str,
        group_name: &str,
    ) -> CloudResult<Option<SecurityGroupInfo>> {
        let client = self.client_for(region).await;
        let out = client
            .describe_security_groups()
            .filters(
                Filter::builder()
                    .name("group-name")
                    .values(group_name)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| {
                external(
                    "describe security groups",
                    &format!("Security group '{group_name}'"),
                    e,
                )
            })?;

        let Some(group) = out.security_groups().first() else {
            return Ok(None);
        };

        let mut rules = Vec::new();
        for permission in group.ip_permissions() {
            let Ok(protocol) = permission.ip_protocol().unwrap_or_default().parse::<Protocol>()
            else {
                // ignore non tcp/udp/icmp permissions (e.g. "-1" all-traffic)
                continue;
            };
            let from_port = permission.from_port().unwrap_or_default();
            let to_port = permission.to_port().unwrap_or_default();
            for range in permission.ip_ranges() {
                rules.push(IngressRule {
                    protocol,
                    from_port: u16::try_from(from_port).unwrap_or_default(),
                    to_port: u16::try_from(to_port).unwrap_or_default(),
                    cidr_ip: range.cidr_ip().unwrap_or_default().to_owned(),
                });
            }
        }

        Ok(Some(SecurityGroupInfo {
            id: group.group_id().unwrap_or_default().to_owned(),
            name: group.group_name().unwrap_or(group_name).to_owned(),
            rules,
        }))
    }

    async fn create_security_group(
        &self,
        region: &str,
        group_name: &str,
        description: &str,
    ) -> CloudResult<SecurityGroupInfo> {
        let client = self.client_for(region).await;
        let out = client
            .create_security_group()
            .group_name(group_name)
            .description(description)
            .send()
            .await
            .map_err(|e| {
                external(
                    "create security group",
                    &format!("Security group '{group_name}'"),
                    e,
                )
            })?;

        Ok(SecurityGroupInfo {
            id: out.group_id().unwrap_or_default().to_owned(),
            name: group_name.to_owned(),
            rules: Vec::new(),
        })
    }

    async fn authorize_ingress(
        &self,
        region: &str,
        group_id: &str,
        rule: &IngressRule,
    ) -> CloudResult<()> {
        let client = self.client_for(region).await;
        let permission = IpPermission::builder()
            .ip_protocol(rule.protocol.as_str())
            .from_port(i32::from(rule.from_port))
            .to_port(i32::from(rule.to_port))
            .ip_ranges(IpRange::builder().cidr_ip(&rule.cidr_ip).build())
            .build();

        client
            .authorize_security_group_ingress()
            .group_id(group_id)
            .ip_permissions(permission)
            .send()
            .await
            .map_err(|e| {
                external(
                    "authorize security group ingress",
                    &format!("Security group '{group_id}'"),
                    e,
                )
            })?;
        Ok(())
    }

    async fn delete_security_group(&self, region: &str, group_name: &str) -> CloudResult<()> {
        let client = self.client_for(region).await;
        client
            .delete_security_group()
            .group_name(group_name)
            .send()
            .await
            .map_err(|e| {
                external(
                    "delete security group",
                    &format!("Security group '{group_name}'"),
                    e,
                )
            })?;
        Ok(())
    }

    async fn launch_instances(
        &self,
        region: &str,
        spec: &LaunchSpec,
    ) -> CloudResult<Vec<RemoteInstance>> {
        let client = self.client_for(region).await;
        let count = i32::try_from(spec.count).map_err(|_| {
            ExternalError::operation("run instances", format!("count {} too large", spec.count))
        })?;

        let out = client
            .run_instances()
            .image_id(&spec.image_id)
            .instance_type(InstanceType::from(spec.instance_type.as_str()))
            .key_name(&spec.key_name)
            .security_group_ids(&spec.security_group_id)
            .min_count(count)
            .max_count(count)
            .send()
            .await
            .map_err(|e| external("run instances", &format!("Image '{}'", spec.image_id), e))?;

        Ok(out.instances().iter().map(remote_instance).collect())
    }

    async fn describe_instances(
        &self,
        region: &str,
        ids: &[String],
    ) -> CloudResult<Vec<RemoteInstance>> {
        let client = self.client_for(region).await;
        let out = client
            .describe_instances()
            .set_instance_ids(Some(ids.to_vec()))
            .send()
            .await
            .map_err(|e| external("describe instances", &format!("Instances {ids:?}"), e))?;

        let mut instances = Vec::new();
        for reservation in out.reservations() {
            for instance in reservation.instances() {
                instances.push(remote_instance(instance));
            }
        }
        Ok(instances)
    }

    async fn terminate_instances(&self, region: &str, ids: &[String]) -> CloudResult<()> {
        let client = self.client_for(region).await;
        client
            .terminate_instances()
            .set_instance_ids(Some(ids.to_vec()))
            .send()
            .await
            .map_err(|e| external("terminate instances", &format!("Instances {ids:?}"), e))?;
        Ok(())
    }
}
