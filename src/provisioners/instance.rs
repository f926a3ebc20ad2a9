//! Instance provisioner.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cloud::{CloudClient, InstanceLifecycle, LaunchSpec};
use crate::error::{ConfigurationError, ExternalError, ProvisionError};
use crate::provision::{ArgSet, Arguments, Provisioner, ProvisionerSpec, TaskContext};

/// Attempts before giving up on instances reaching the running state.
const READY_ATTEMPTS: u32 = 60;

/// Delay between readiness checks.
const READY_DELAY: Duration = Duration::from_secs(5);

/// Launches EC2 instances and records their ids in the state store.
///
/// The `instance_ref` argument names the state entry used for idempotency:
/// a second `up` with the same reference skips the launch, and `down`
/// terminates exactly the recorded ids.
pub struct InstanceProvisioner {
    spec: ProvisionerSpec,
    cloud: Arc<dyn CloudClient>,
}

impl InstanceProvisioner {
    /// Creates the provisioner with its collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor fails its self-check.
    pub fn new(cloud: Arc<dyn CloudClient>) -> Result<Self, ConfigurationError> {
        Ok(Self {
            spec: ProvisionerSpec::new(
                "Instance",
                "instance",
                "Launches EC2 instances and tracks them under a state reference.",
                ArgSet::named(&[
                    "region",
                    "image_id",
                    "instance_type",
                    "security_group",
                    "key_name",
                    "instance_ref",
                ]),
                ArgSet::named(&["count"]),
            )?,
            cloud,
        })
    }

    /// Polls until every instance reports running, with bounded retries.
    async fn wait_until_running(
        &self,
        region: &str,
        ids: &[String],
    ) -> Result<(), ProvisionError> {
        for attempt in 1..=READY_ATTEMPTS {
            let instances = self.cloud.describe_instances(region, ids).await?;
            if instances
                .iter()
                .all(|i| i.lifecycle == InstanceLifecycle::Running)
            {
                return Ok(());
            }

            info!(
                "Waiting for {} instances to run (attempt {attempt}/{READY_ATTEMPTS})",
                ids.len()
            );
            tokio::time::sleep(READY_DELAY).await;
        }

        Err(ExternalError::Timeout {
            resource: format!("instances {ids:?}"),
            waited_secs: u64::from(READY_ATTEMPTS) * READY_DELAY.as_secs(),
        }
        .into())
    }
}

#[async_trait]
impl Provisioner for InstanceProvisioner {
    fn spec(&self) -> &ProvisionerSpec {
        &self.spec
    }

    async fn verify(&self, _task_name: &str, args: &Arguments) -> Result<(), ProvisionError> {
        args.str("region")?;
        args.str("image_id")?;
        args.str("instance_type")?;
        args.str("security_group")?;
        args.str("key_name")?;
        args.str("instance_ref")?;

        if let Some(count) = args.opt_u64("count")? {
            if count == 0 {
                return Err(ProvisionError::precondition("'count' must be at least 1"));
            }
        }
        Ok(())
    }

    async fn up(&self, ctx: &mut TaskContext<'_>) -> Result<(), ProvisionError> {
        let region = ctx.args.str("region")?.to_owned();
        let image_id = ctx.args.str("image_id")?.to_owned();
        let instance_type = ctx.args.str("instance_type")?.to_owned();
        let security_group = ctx.args.str("security_group")?.to_owned();
        let key_name = ctx.args.str("key_name")?.to_owned();
        let instance_ref = ctx.args.str("instance_ref")?.to_owned();
        let count = ctx.args.opt_u64("count")?.unwrap_or(1);

        if ctx.dry_run {
            info!(
                "[dry-run] Task '{}': would launch {count} x {instance_type} from {image_id} in {region} as '{instance_ref}'",
                ctx.task_name
            );
            return Ok(());
        }

        if let Some(existing) = ctx.state.get_ids(&instance_ref) {
            warn!(
                "Task '{}': state already holds '{instance_ref}' ({existing:?}), skipping launch",
                ctx.task_name
            );
            return Ok(());
        }

        let group = self
            .cloud
            .find_security_group(&region, &security_group)
            .await?
            .ok_or_else(|| {
                ProvisionError::precondition(format!(
                    "security group '{security_group}' does not exist in {region}"
                ))
            })?;

        let launched = self
            .cloud
            .launch_instances(
                &region,
                &LaunchSpec {
                    image_id,
                    instance_type,
                    key_name,
                    security_group_id: group.id,
                    count: u32::try_from(count).map_err(|_| {
                        ProvisionError::precondition(format!("'count' {count} is too large"))
                    })?,
                },
            )
            .await?;
        let ids: Vec<String> = launched.into_iter().map(|i| i.id).collect();
        info!("Task '{}': launched instances {ids:?}", ctx.task_name);

        self.wait_until_running(&region, &ids).await?;

        ctx.state.set(
            instance_ref.clone(),
            serde_yaml::Value::Sequence(
                ids.iter().cloned().map(serde_yaml::Value::String).collect(),
            ),
        )?;
        info!(
            "Task '{}': recorded {} running instances under '{instance_ref}'",
            ctx.task_name,
            ids.len()
        );
        Ok(())
    }

    async fn down(&self, ctx: &mut TaskContext<'_>) -> Result<(), ProvisionError> {
        let region = ctx.args.str("region")?.to_owned();
        let instance_ref = ctx.args.str("instance_ref")?.to_owned();

        if ctx.dry_run {
            info!(
                "[dry-run] Task '{}': would terminate instances recorded under '{instance_ref}'",
                ctx.task_name
            );
            return Ok(());
        }

        let Some(ids) = ctx.state.get_ids(&instance_ref) else {
            warn!(
                "Task '{}': no instances recorded under '{instance_ref}', skipping",
                ctx.task_name
            );
            return Ok(());
        };

        match self.cloud.terminate_instances(&region, &ids).await {
            Ok(()) => {
                info!("Task '{}': terminated instances {ids:?}", ctx.task_name);
            }
            Err(e) if e.is_not_found() => {
                warn!(
                    "Task '{}': instances {ids:?} already absent, clearing '{instance_ref}'",
                    ctx.task_name
                );
            }
            Err(e) => return Err(e.into()),
        }

        ctx.state.delete(&instance_ref)?;
        Ok(())
    }
}
