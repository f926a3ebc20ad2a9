//! Key pair provisioner.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cloud::{CloudClient, KeyPairStorage};
use crate::error::{ConfigurationError, ProvisionError};
use crate::provision::{ArgSet, Arguments, Provisioner, ProvisionerSpec, TaskContext};

/// Creates a cloud key pair and stores its private key material locally.
pub struct KeyPairProvisioner {
    spec: ProvisionerSpec,
    cloud: Arc<dyn CloudClient>,
    storage: KeyPairStorage,
}

impl KeyPairProvisioner {
    /// Creates the provisioner with its collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor fails its self-check.
    pub fn new(
        cloud: Arc<dyn CloudClient>,
        storage: KeyPairStorage,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            spec: ProvisionerSpec::new(
                "Key Pair",
                "key_pair",
                "Creates an EC2 key pair and saves the private key locally.",
                ArgSet::named(&["region", "key_name"]),
                ArgSet::None,
            )?,
            cloud,
            storage,
        })
    }
}

#[async_trait]
impl Provisioner for KeyPairProvisioner {
    fn spec(&self) -> &ProvisionerSpec {
        &self.spec
    }

    async fn verify(&self, _task_name: &str, args: &Arguments) -> Result<(), ProvisionError> {
        args.str("region")?;
        args.str("key_name")?;
        Ok(())
    }

    async fn up(&self, ctx: &mut TaskContext<'_>) -> Result<(), ProvisionError> {
        let region = ctx.args.str("region")?.to_owned();
        let key_name = ctx.args.str("key_name")?.to_owned();

        if ctx.dry_run {
            info!(
                "[dry-run] Task '{}': would create key pair '{key_name}' in {region}",
                ctx.task_name
            );
            return Ok(());
        }

        if self.cloud.key_pair_exists(&region, &key_name).await? {
            warn!(
                "Task '{}': key pair '{key_name}' already exists, skipping",
                ctx.task_name
            );
            return Ok(());
        }

        let material = self.cloud.create_key_pair(&region, &key_name).await?;
        self.storage.save(&key_name, &material.private_key_pem)?;
        info!(
            "Task '{}': created key pair '{key_name}' ({})",
            ctx.task_name, material.fingerprint
        );
        Ok(())
    }

    async fn down(&self, ctx: &mut TaskContext<'_>) -> Result<(), ProvisionError> {
        let region = ctx.args.str("region")?.to_owned();
        let key_name = ctx.args.str("key_name")?.to_owned();

        if ctx.dry_run {
            info!(
                "[dry-run] Task '{}': would delete key pair '{key_name}' in {region}",
                ctx.task_name
            );
            return Ok(());
        }

        match self.cloud.delete_key_pair(&region, &key_name).await {
            Ok(()) => {
                info!("Task '{}': deleted key pair '{key_name}'", ctx.task_name);
            }
            Err(e) if e.is_not_found() => {
                warn!(
                    "Task '{}': key pair '{key_name}' already absent, skipping",
                    ctx.task_name
                );
            }
            Err(e) => return Err(e.into()),
        }

        self.storage.delete(&key_name)?;
        Ok(())
    }
}
