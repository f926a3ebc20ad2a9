//! Debug provisioner. Logs its arguments and touches nothing, which makes
//! it handy for exercising plans end to end without any collaborator.

use async_trait::async_trait;
use tracing::info;

use crate::error::{ConfigurationError, ProvisionError};
use crate::provision::{ArgSet, Arguments, Provisioner, ProvisionerSpec, TaskContext};

/// No-op provisioner that echoes its arguments into the log.
pub struct DebugProvisioner {
    spec: ProvisionerSpec,
}

impl DebugProvisioner {
    /// Creates the provisioner.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor fails its self-check.
    pub fn new() -> Result<Self, ConfigurationError> {
        Ok(Self {
            spec: ProvisionerSpec::new(
                "Debug",
                "debug",
                "Logs its arguments without provisioning anything.",
                ArgSet::named(&["echo"]),
                ArgSet::named(&["whoami"]),
            )?,
        })
    }
}

#[async_trait]
impl Provisioner for DebugProvisioner {
    fn spec(&self) -> &ProvisionerSpec {
        &self.spec
    }

    async fn verify(&self, _task_name: &str, args: &Arguments) -> Result<(), ProvisionError> {
        args.str("echo")?;
        Ok(())
    }

    async fn up(&self, ctx: &mut TaskContext<'_>) -> Result<(), ProvisionError> {
        let echo = ctx.args.str("echo")?;
        info!("Task '{}' up: {echo}", ctx.task_name);
        if let Some(whoami) = ctx.args.opt_str("whoami")? {
            info!("Task '{}' up: running as {whoami}", ctx.task_name);
        }
        Ok(())
    }

    async fn down(&self, ctx: &mut TaskContext<'_>) -> Result<(), ProvisionError> {
        let echo = ctx.args.str("echo")?;
        info!("Task '{}' down: {echo}", ctx.task_name);
        Ok(())
    }
}
