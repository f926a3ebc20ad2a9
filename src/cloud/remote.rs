//! Remote command execution over SSH.
//!
//! The [`RemoteExecutor`] trait is the seam between provisioners and the
//! transport. The production implementation shells out to the system `ssh`
//! and `scp` binaries.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::ExternalError;

use super::client::CloudResult;

/// A command to run on a remote host.
#[derive(Debug, Clone)]
pub struct RemoteCommand {
    /// Hostname or public DNS of the target.
    pub host: String,
    /// Login user.
    pub user: String,
    /// SSH port.
    pub port: u16,
    /// Private key granting access.
    pub identity_file: PathBuf,
    /// Shell command to run.
    pub command: String,
}

/// A file to copy onto a remote host.
#[derive(Debug, Clone)]
pub struct UploadSpec {
    /// Hostname or public DNS of the target.
    pub host: String,
    /// Login user.
    pub user: String,
    /// SSH port.
    pub port: u16,
    /// Private key granting access.
    pub identity_file: PathBuf,
    /// Local file to upload.
    pub local_path: PathBuf,
    /// Destination path on the remote host.
    pub remote_path: String,
}

/// Captured result of a remote command.
#[derive(Debug, Clone)]
pub struct RemoteOutput {
    /// Process exit code. `-1` when terminated by a signal.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl RemoteOutput {
    /// Returns true when the remote command exited successfully.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Transport for running commands and uploading files on remote hosts.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Runs a command on the remote host and captures its output.
    ///
    /// A nonzero remote exit code is reported through [`RemoteOutput`],
    /// not as an error. Errors mean the transport itself failed.
    async fn run(&self, command: &RemoteCommand) -> CloudResult<RemoteOutput>;

    /// Uploads a local file to the remote host.
    async fn upload(&self, spec: &UploadSpec) -> CloudResult<()>;
}

/// Executor shelling out to the system `ssh` and `scp` binaries.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    connect_timeout_secs: u32,
}

impl SshExecutor {
    /// Creates an executor with the given connection timeout.
    #[must_use]
    pub const fn new(connect_timeout_secs: u32) -> Self {
        Self {
            connect_timeout_secs,
        }
    }

    fn common_options(&self) -> Vec<String> {
        vec![
            "-o".to_owned(),
            "StrictHostKeyChecking=no".to_owned(),
            "-o".to_owned(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
        ]
    }
}

impl Default for SshExecutor {
    fn default() -> Self {
        Self::new(10)
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(&self, command: &RemoteCommand) -> CloudResult<RemoteOutput> {
        debug!(
            "Running remote command on {}@{}: {}",
            command.user, command.host, command.command
        );

        let output = Command::new("ssh")
            .args(self.common_options())
            .arg("-i")
            .arg(&command.identity_file)
            .arg("-p")
            .arg(command.port.to_string())
            .arg(format!("{}@{}", command.user, command.host))
            .arg(&command.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ExternalError::operation("ssh", e.to_string()))?;

        Ok(RemoteOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn upload(&self, spec: &UploadSpec) -> CloudResult<()> {
        debug!(
            "Uploading {} to {}@{}:{}",
            spec.local_path.display(),
            spec.user,
            spec.host,
            spec.remote_path
        );

        let output = Command::new("scp")
            .args(self.common_options())
            .arg("-i")
            .arg(&spec.identity_file)
            .arg("-P")
            .arg(spec.port.to_string())
            .arg(&spec.local_path)
            .arg(format!("{}@{}:{}", spec.user, spec.host, spec.remote_path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ExternalError::operation("scp", e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExternalError::operation(
                "scp",
                format!("upload failed: {}", stderr.trim()),
            ));
        }
        Ok(())
    }
}
