//! Linux user provisioner.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cloud::{CloudClient, KeyPairStorage, RemoteCommand, RemoteExecutor, UploadSpec};
use crate::error::{ConfigurationError, ExternalError, ProvisionError};
use crate::provision::{ArgSet, Arguments, Provisioner, ProvisionerSpec, TaskContext};

/// Login user preinstalled on the machine images we target.
const ADMIN_USER: &str = "ubuntu";

/// Default SSH port when `ssh_port` is not given.
const DEFAULT_SSH_PORT: u16 = 22;

/// Default login shell when `login_shell` is not given.
const DEFAULT_SHELL: &str = "/bin/bash";

/// Creates a Linux user on every instance recorded under a state reference.
pub struct UserProvisioner {
    spec: ProvisionerSpec,
    cloud: Arc<dyn CloudClient>,
    remote: Arc<dyn RemoteExecutor>,
    storage: KeyPairStorage,
}

impl UserProvisioner {
    /// Creates the provisioner with its collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor fails its self-check.
    pub fn new(
        cloud: Arc<dyn CloudClient>,
        remote: Arc<dyn RemoteExecutor>,
        storage: KeyPairStorage,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            spec: ProvisionerSpec::new(
                "Linux User",
                "user",
                "Creates a Linux user on the instances recorded under a state reference.",
                ArgSet::named(&["region", "instance_ref", "key_name", "user_name"]),
                ArgSet::named(&["ssh_port", "login_shell", "public_key"]),
            )?,
            cloud,
            remote,
            storage,
        })
    }

    /// Resolves the reachable hosts behind `instance_ref`.
    async fn resolve_hosts(
        &self,
        ctx: &TaskContext<'_>,
        region: &str,
        instance_ref: &str,
    ) -> Result<Vec<String>, ProvisionError> {
        let ids = ctx.state.get_ids(instance_ref).ok_or_else(|| {
            ProvisionError::precondition(format!(
                "no instances recorded under '{instance_ref}'"
            ))
        })?;

        let mut hosts = Vec::with_capacity(ids.len());
        for instance in self.cloud.describe_instances(region, &ids).await? {
            let dns = instance.public_dns.ok_or_else(|| {
                ProvisionError::precondition(format!(
                    "instance '{}' has no public DNS name yet",
                    instance.id
                ))
            })?;
            hosts.push(dns);
        }
        Ok(hosts)
    }

    /// Returns the local private key path for SSH access.
    fn identity_file(&self, key_name: &str) -> Result<PathBuf, ProvisionError> {
        if !self.storage.exists(key_name) {
            return Err(ProvisionError::precondition(format!(
                "no private key stored locally for key pair '{key_name}'"
            )));
        }
        Ok(self.storage.path_for(key_name))
    }

    fn command(&self, host: &str, port: u16, identity_file: &Path, command: String) -> RemoteCommand {
        RemoteCommand {
            host: host.to_owned(),
            user: ADMIN_USER.to_owned(),
            port,
            identity_file: identity_file.to_path_buf(),
            command,
        }
    }

    /// Installs a public key into the new user's `~/.ssh`.
    async fn install_public_key(
        &self,
        host: &str,
        port: u16,
        identity_file: &Path,
        user_name: &str,
        public_key: &str,
    ) -> Result<(), ProvisionError> {
        let key_file = Path::new(public_key)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                ProvisionError::precondition(format!(
                    "'public_key' path '{public_key}' has no file name"
                ))
            })?;
        let ssh_dir = format!("/home/{user_name}/.ssh");
        let remote_path = format!("{ssh_dir}/{key_file}");

        let mkdir = self.command(host, port, identity_file, format!("sudo mkdir -p {ssh_dir}"));
        let output = self.remote.run(&mkdir).await?;
        if !output.success() {
            return Err(ExternalError::operation("mkdir", output.stderr.trim().to_owned()).into());
        }

        self.remote
            .upload(&UploadSpec {
                host: host.to_owned(),
                user: ADMIN_USER.to_owned(),
                port,
                identity_file: identity_file.to_path_buf(),
                local_path: PathBuf::from(public_key),
                remote_path: remote_path.clone(),
            })
            .await?;

        let chmod = self.command(host, port, identity_file, format!("sudo chmod -R 400 {remote_path}"));
        let output = self.remote.run(&chmod).await?;
        if !output.success() {
            return Err(ExternalError::operation("chmod", output.stderr.trim().to_owned()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl Provisioner for UserProvisioner {
    fn spec(&self) -> &ProvisionerSpec {
        &self.spec
    }

    async fn verify(&self, _task_name: &str, args: &Arguments) -> Result<(), ProvisionError> {
        args.str("region")?;
        args.str("instance_ref")?;
        args.str("key_name")?;
        args.str("user_name")?;

        if let Some(port) = args.opt_u64("ssh_port")? {
            u16::try_from(port).map_err(|_| {
                ProvisionError::precondition(format!("'ssh_port' {port} is not a valid port"))
            })?;
        }
        Ok(())
    }

    async fn up(&self, ctx: &mut TaskContext<'_>) -> Result<(), ProvisionError> {
        let region = ctx.args.str("region")?.to_owned();
        let instance_ref = ctx.args.str("instance_ref")?.to_owned();
        let key_name = ctx.args.str("key_name")?.to_owned();
        let user_name = ctx.args.str("user_name")?.to_owned();
        let port = ctx
            .args
            .opt_u64("ssh_port")?
            .map_or(DEFAULT_SSH_PORT, |p| u16::try_from(p).unwrap_or(DEFAULT_SSH_PORT));
        let shell = ctx
            .args
            .opt_str("login_shell")?
            .unwrap_or(DEFAULT_SHELL)
            .to_owned();
        let public_key = ctx.args.opt_str("public_key")?.map(str::to_owned);

        if ctx.dry_run {
            info!(
                "[dry-run] Task '{}': would create user '{user_name}' on instances under '{instance_ref}'",
                ctx.task_name
            );
            return Ok(());
        }

        let identity_file = self.identity_file(&key_name)?;
        let hosts = self.resolve_hosts(ctx, &region, &instance_ref).await?;

        for host in &hosts {
            let useradd = self.command(
                host,
                port,
                &identity_file,
                format!("sudo useradd {user_name} -m -s {shell}"),
            );
            let output = self.remote.run(&useradd).await?;
            if output.success() {
                info!("Task '{}': created user '{user_name}' on {host}", ctx.task_name);
            } else {
                return Err(ExternalError::operation(
                    "useradd",
                    format!("exit {} on {host}: {}", output.exit_code, output.stderr.trim()),
                )
                .into());
            }

            if let Some(public_key) = &public_key {
                info!(
                    "Task '{}': installing public key '{public_key}' for '{user_name}' on {host}",
                    ctx.task_name
                );
                self.install_public_key(host, port, &identity_file, &user_name, public_key)
                    .await?;
            }
        }
        Ok(())
    }

    async fn down(&self, ctx: &mut TaskContext<'_>) -> Result<(), ProvisionError> {
        let region = ctx.args.str("region")?.to_owned();
        let instance_ref = ctx.args.str("instance_ref")?.to_owned();
        let key_name = ctx.args.str("key_name")?.to_owned();
        let user_name = ctx.args.str("user_name")?.to_owned();
        let port = ctx
            .args
            .opt_u64("ssh_port")?
            .map_or(DEFAULT_SSH_PORT, |p| u16::try_from(p).unwrap_or(DEFAULT_SSH_PORT));

        if ctx.dry_run {
            info!(
                "[dry-run] Task '{}': would delete user '{user_name}' on instances under '{instance_ref}'",
                ctx.task_name
            );
            return Ok(());
        }

        let identity_file = self.identity_file(&key_name)?;
        let hosts = self.resolve_hosts(ctx, &region, &instance_ref).await?;

        for host in &hosts {
            let userdel = self.command(
                host,
                port,
                &identity_file,
                format!("sudo userdel {user_name} -r"),
            );
            // best effort: a nonzero exit (user already gone) only warns,
            // transport failures still propagate
            let output = self.remote.run(&userdel).await?;
            if output.success() {
                info!("Task '{}': deleted user '{user_name}' on {host}", ctx.task_name);
            } else {
                warn!(
                    "Task '{}': could not delete user '{user_name}' on {host} (exit {})",
                    ctx.task_name, output.exit_code
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::fake::{FakeCloud, FakeRemote};
    use crate::cloud::{LaunchSpec, RemoteOutput};
    use crate::state::StateStore;

    struct Fixture {
        provisioner: UserProvisioner,
        cloud: Arc<FakeCloud>,
        remote: Arc<FakeRemote>,
        _dir: tempfile::TempDir,
    }

    async fn fixture_with_instances(state: &mut StateStore) -> Fixture {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let storage = KeyPairStorage::at(dir.path().join("keypairs"));
        storage.save("web", "key material").expect("save failed");

        let cloud = Arc::new(FakeCloud::new());
        let launched = cloud
            .launch_instances(
                "us-west-2",
                &LaunchSpec {
                    image_id: String::from("ami-0abc"),
                    instance_type: String::from("t3.micro"),
                    key_name: String::from("web"),
                    security_group_id: String::from("sg-0001"),
                    count: 2,
                },
            )
            .await
            .expect("launch failed");
        // one describe flips the fake instances to running
        let ids: Vec<String> = launched.into_iter().map(|i| i.id).collect();
        cloud
            .describe_instances("us-west-2", &ids)
            .await
            .expect("describe failed");
        state
            .set(
                "web",
                serde_yaml::Value::Sequence(
                    ids.into_iter().map(serde_yaml::Value::String).collect(),
                ),
            )
            .expect("seed failed");

        let remote = Arc::new(FakeRemote::new());
        let provisioner = UserProvisioner::new(
            Arc::clone(&cloud) as Arc<dyn CloudClient>,
            Arc::clone(&remote) as Arc<dyn RemoteExecutor>,
            storage,
        )
        .expect("descriptor self-check failed");

        Fixture {
            provisioner,
            cloud,
            remote,
            _dir: dir,
        }
    }

    fn user_args() -> Arguments {
        let mut args = Arguments::new();
        args.insert("region", serde_yaml::Value::from("us-west-2"));
        args.insert("instance_ref", serde_yaml::Value::from("web"));
        args.insert("key_name", serde_yaml::Value::from("web"));
        args.insert("user_name", serde_yaml::Value::from("deploy"));
        args
    }

    #[tokio::test]
    async fn test_up_creates_user_on_every_instance() {
        let mut state = StateStore::in_memory();
        let fixture = fixture_with_instances(&mut state).await;
        let mut ctx = TaskContext {
            task_name: String::from("deploy user"),
            args: user_args(),
            dry_run: false,
            state: &mut state,
        };

        fixture.provisioner.up(&mut ctx).await.expect("up failed");

        let commands = fixture.remote.commands();
        assert_eq!(commands.len(), 2);
        assert!(commands
            .iter()
            .all(|c| c == "sudo useradd deploy -m -s /bin/bash"));
    }

    #[tokio::test]
    async fn test_up_without_recorded_instances_fails() {
        let mut seeded = StateStore::in_memory();
        let fixture = fixture_with_instances(&mut seeded).await;

        let mut empty = StateStore::in_memory();
        let mut ctx = TaskContext {
            task_name: String::from("deploy user"),
            args: user_args(),
            dry_run: false,
            state: &mut empty,
        };

        let err = fixture.provisioner.up(&mut ctx).await.expect_err("up succeeded");
        assert!(matches!(err, ProvisionError::Precondition { .. }));
        assert!(fixture.remote.commands().is_empty());
    }

    #[tokio::test]
    async fn test_down_warns_on_nonzero_exit() {
        let mut state = StateStore::in_memory();
        let fixture = fixture_with_instances(&mut state).await;
        fixture.remote.script(RemoteOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: String::from("user does not exist"),
        });
        let mut ctx = TaskContext {
            task_name: String::from("deploy user"),
            args: user_args(),
            dry_run: false,
            state: &mut state,
        };

        fixture.provisioner.down(&mut ctx).await.expect("down failed");
        assert_eq!(fixture.remote.commands().len(), 2);
    }

    #[tokio::test]
    async fn test_up_installs_public_key_when_given() {
        let mut state = StateStore::in_memory();
        let fixture = fixture_with_instances(&mut state).await;
        let mut args = user_args();
        args.insert(
            "public_key",
            serde_yaml::Value::from("/tmp/id_ed25519.pub"),
        );
        let mut ctx = TaskContext {
            task_name: String::from("deploy user"),
            args,
            dry_run: false,
            state: &mut state,
        };

        fixture.provisioner.up(&mut ctx).await.expect("up failed");

        let uploads = fixture.remote.uploads();
        assert_eq!(uploads.len(), 2);
        assert!(uploads
            .iter()
            .all(|u| u == "/home/deploy/.ssh/id_ed25519.pub"));
        assert!(fixture
            .remote
            .commands()
            .iter()
            .any(|c| c == "sudo mkdir -p /home/deploy/.ssh"));
    }

    #[tokio::test]
    async fn test_dry_run_runs_nothing() {
        let mut state = StateStore::in_memory();
        let fixture = fixture_with_instances(&mut state).await;
        let calls_before = fixture.cloud.calls().len();
        let mut ctx = TaskContext {
            task_name: String::from("deploy user"),
            args: user_args(),
            dry_run: true,
            state: &mut state,
        };

        fixture.provisioner.up(&mut ctx).await.expect("up failed");

        assert!(fixture.remote.commands().is_empty());
        assert_eq!(fixture.cloud.calls().len(), calls_before);
    }
}
