//! Security group provisioner.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cloud::{CloudClient, IngressRule, Protocol};
use crate::error::{ConfigurationError, ProvisionError};
use crate::provision::{ArgSet, Arguments, Provisioner, ProvisionerSpec, TaskContext};

/// Creates a security group and authorizes its ingress rules.
pub struct SecurityGroupProvisioner {
    spec: ProvisionerSpec,
    cloud: Arc<dyn CloudClient>,
}

impl SecurityGroupProvisioner {
    /// Creates the provisioner with its collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor fails its self-check.
    pub fn new(cloud: Arc<dyn CloudClient>) -> Result<Self, ConfigurationError> {
        Ok(Self {
            spec: ProvisionerSpec::new(
                "Security Group",
                "security_group",
                "Creates an EC2 security group and authorizes its ingress rules.",
                ArgSet::named(&["region", "group_name", "group_description", "rules"]),
                ArgSet::None,
            )?,
            cloud,
        })
    }
}

/// Parses the plan's `rules` sequence into ingress rules.
///
/// Each entry is a single-key mapping keyed by protocol name:
///
/// ```yaml
/// rules:
///   - tcp: { start: 22, end: 22, cidr_ip: 0.0.0.0/0 }
/// ```
fn parse_rules(args: &Arguments) -> Result<Vec<IngressRule>, ProvisionError> {
    let entries = args.seq("rules")?;
    let mut rules = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        let mapping = entry.as_mapping().ok_or_else(|| {
            ProvisionError::precondition(format!("rule {index} is not a mapping"))
        })?;
        if mapping.len() != 1 {
            return Err(ProvisionError::precondition(format!(
                "rule {index} must have exactly one protocol key, found {}",
                mapping.len()
            )));
        }

        let (key, body) = mapping
            .iter()
            .next()
            .ok_or_else(|| ProvisionError::precondition(format!("rule {index} is empty")))?;
        let protocol_name = key.as_str().ok_or_else(|| {
            ProvisionError::precondition(format!("rule {index} protocol key is not a string"))
        })?;
        let protocol: Protocol = protocol_name.parse().map_err(|_| {
            ProvisionError::precondition(format!(
                "rule {index} protocol '{protocol_name}' is not one of {:?}",
                Protocol::ALLOWED
            ))
        })?;

        let body = body.as_mapping().ok_or_else(|| {
            ProvisionError::precondition(format!("rule {index} body is not a mapping"))
        })?;

        let port = |field: &str| -> Result<u16, ProvisionError> {
            let value = body.get(field).and_then(serde_yaml::Value::as_u64).ok_or_else(|| {
                ProvisionError::precondition(format!(
                    "rule {index} is missing an integer '{field}'"
                ))
            })?;
            u16::try_from(value).map_err(|_| {
                ProvisionError::precondition(format!(
                    "rule {index} '{field}' {value} is outside the valid port range"
                ))
            })
        };
        let from_port = port("start")?;
        let to_port = port("end")?;
        if from_port > to_port {
            return Err(ProvisionError::precondition(format!(
                "rule {index} start {from_port} is greater than end {to_port}"
            )));
        }

        let cidr_ip = body
            .get("cidr_ip")
            .and_then(serde_yaml::Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ProvisionError::precondition(format!("rule {index} is missing 'cidr_ip'"))
            })?;

        rules.push(IngressRule {
            protocol,
            from_port,
            to_port,
            cidr_ip: cidr_ip.to_owned(),
        });
    }

    Ok(rules)
}

#[async_trait]
impl Provisioner for SecurityGroupProvisioner {
    fn spec(&self) -> &ProvisionerSpec {
        &self.spec
    }

    async fn verify(&self, _task_name: &str, args: &Arguments) -> Result<(), ProvisionError> {
        args.str("region")?;
        args.str("group_name")?;
        args.str("group_description")?;
        parse_rules(args)?;
        Ok(())
    }

    async fn up(&self, ctx: &mut TaskContext<'_>) -> Result<(), ProvisionError> {
        let region = ctx.args.str("region")?.to_owned();
        let group_name = ctx.args.str("group_name")?.to_owned();
        let description = ctx.args.str("group_description")?.to_owned();
        let rules = parse_rules(&ctx.args)?;

        if ctx.dry_run {
            info!(
                "[dry-run] Task '{}': would ensure security group '{group_name}' with {} rules in {region}",
                ctx.task_name,
                rules.len()
            );
            return Ok(());
        }

        let group = match self.cloud.find_security_group(&region, &group_name).await? {
            Some(existing) => {
                warn!(
                    "Task '{}': security group '{group_name}' already exists, reusing it",
                    ctx.task_name
                );
                existing
            }
            None => {
                let created = self
                    .cloud
                    .create_security_group(&region, &group_name, &description)
                    .await?;
                info!(
                    "Task '{}': created security group '{group_name}' ({})",
                    ctx.task_name, created.id
                );
                created
            }
        };

        for rule in &rules {
            if group.rules.contains(rule) {
                continue;
            }
            self.cloud.authorize_ingress(&region, &group.id, rule).await?;
            info!(
                "Task '{}': authorized {} {}-{} from {}",
                ctx.task_name, rule.protocol, rule.from_port, rule.to_port, rule.cidr_ip
            );
        }

        Ok(())
    }

    async fn down(&self, ctx: &mut TaskContext<'_>) -> Result<(), ProvisionError> {
        let region = ctx.args.str("region")?.to_owned();
        let group_name = ctx.args.str("group_name")?.to_owned();

        if ctx.dry_run {
            info!(
                "[dry-run] Task '{}': would delete security group '{group_name}' in {region}",
                ctx.task_name
            );
            return Ok(());
        }

        match self.cloud.delete_security_group(&region, &group_name).await {
            Ok(()) => {
                info!(
                    "Task '{}': deleted security group '{group_name}'",
                    ctx.task_name
                );
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                warn!(
                    "Task '{}': security group '{group_name}' already absent, skipping",
                    ctx.task_name
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
