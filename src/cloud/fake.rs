//! Recording in-memory fakes for the cloud and remote-execution seams.
//!
//! Tests assert against the recorded call log and the fake resource state
//! instead of hitting real infrastructure.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ExternalError;

use super::client::{
    CloudClient, CloudResult, IngressRule, InstanceLifecycle, KeyPairMaterial, LaunchSpec,
    RemoteInstance, SecurityGroupInfo,
};
use super::remote::{RemoteCommand, RemoteExecutor, RemoteOutput, UploadSpec};

#[derive(Debug, Default)]
struct FakeCloudState {
    calls: Vec<String>,
    key_pairs: BTreeSet<String>,
    groups: BTreeMap<String, SecurityGroupInfo>,
    instances: BTreeMap<String, RemoteInstance>,
    next_id: u32,
    pending_describes: u32,
    fail_on: Option<&'static str>,
}

/// In-memory [`CloudClient`] that records every call it receives.
#[derive(Debug, Default)]
pub struct FakeCloud {
    inner: Mutex<FakeCloudState>,
}

impl FakeCloud {
    /// Creates an empty fake with no resources.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an already existing key pair.
    pub fn seed_key_pair(&self, name: &str) {
        self.inner.lock().unwrap().key_pairs.insert(name.to_owned());
    }

    /// Seeds an already existing security group.
    pub fn seed_group(&self, info: SecurityGroupInfo) {
        self.inner
            .lock()
            .unwrap()
            .groups
            .insert(info.name.clone(), info);
    }

    /// Makes instances report `Pending` for the first `n` describe calls.
    pub fn delay_running(&self, n: u32) {
        self.inner.lock().unwrap().pending_describes = n;
    }

    /// Makes the named operation fail with a generic external error.
    pub fn fail_on(&self, operation: &'static str) {
        self.inner.lock().unwrap().fail_on = Some(operation);
    }

    /// Returns the recorded call log.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Returns the names of currently existing key pairs.
    #[must_use]
    pub fn key_pair_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .key_pairs
            .iter()
            .cloned()
            .collect()
    }

    /// Returns the names of currently existing security groups.
    #[must_use]
    pub fn group_names(&self) -> Vec<String> {
        self.inner.lock().unwrap().groups.keys().cloned().collect()
    }

    /// Returns the ids of currently existing instances.
    #[must_use]
    pub fn instance_ids(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .instances
            .keys()
            .cloned()
            .collect()
    }

    fn record(&self, operation: &'static str, detail: &str) -> CloudResult<()> {
        let mut state = self.inner.lock().unwrap();
        state.calls.push(format!("{operation}:{detail}"));
        if state.fail_on == Some(operation) {
            return Err(ExternalError::operation(operation, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl CloudClient for FakeCloud {
    async fn key_pair_exists(&self, _region: &str, key_name: &str) -> CloudResult<bool> {
        self.record("key_pair_exists", key_name)?;
        Ok(self.inner.lock().unwrap().key_pairs.contains(key_name))
    }

    async fn create_key_pair(
        &self,
        _region: &str,
        key_name: &str,
    ) -> CloudResult<KeyPairMaterial> {
        self.record("create_key_pair", key_name)?;
        self.inner
            .lock()
            .unwrap()
            .key_pairs
            .insert(key_name.to_owned());
        Ok(KeyPairMaterial {
            name: key_name.to_owned(),
            fingerprint: "aa:bb:cc".to_owned(),
            private_key_pem: format!("fake key material for {key_name}"),
        })
    }

    async fn delete_key_pair(&self, _region: &str, key_name: &str) -> CloudResult<()> {
        self.record("delete_key_pair", key_name)?;
        if self.inner.lock().unwrap().key_pairs.remove(key_name) {
            Ok(())
        } else {
            Err(ExternalError::not_found(format!("Key pair '{key_name}'")))
        }
    }

    async fn find_security_group(
        &self,
        _region: &str,
        group_name: &str,
    ) -> CloudResult<Option<SecurityGroupInfo>> {
        self.record("find_security_group", group_name)?;
        Ok(self.inner.lock().unwrap().groups.get(group_name).cloned())
    }

    async fn create_security_group(
        &self,
        _region: &str,
        group_name: &str,
        _description: &str,
    ) -> CloudResult<SecurityGroupInfo> {
        self.record("create_security_group", group_name)?;
        let mut state = self.inner.lock().unwrap();
        let info = SecurityGroupInfo {
            id: format!("sg-{:04}", state.groups.len() + 1),
            name: group_name.to_owned(),
            rules: Vec::new(),
        };
        state.groups.insert(group_name.to_owned(), info.clone());
        Ok(info)
    }

    async fn authorize_ingress(
        &self,
        _region: &str,
        group_id: &str,
        rule: &IngressRule,
    ) -> CloudResult<()> {
        self.record(
            "authorize_ingress",
            &format!("{group_id}:{}:{}-{}", rule.protocol, rule.from_port, rule.to_port),
        )?;
        let mut state = self.inner.lock().unwrap();
        for group in state.groups.values_mut() {
            if group.id == group_id {
                group.rules.push(rule.clone());
                return Ok(());
            }
        }
        Err(ExternalError::not_found(format!(
            "Security group '{group_id}'"
        )))
    }

    async fn delete_security_group(&self, _region: &str, group_name: &str) -> CloudResult<()> {
        self.record("delete_security_group", group_name)?;
        if self.inner.lock().unwrap().groups.remove(group_name).is_some() {
            Ok(())
        } else {
            Err(ExternalError::not_found(format!(
                "Security group '{group_name}'"
            )))
        }
    }

    async fn launch_instances(
        &self,
        _region: &str,
        spec: &LaunchSpec,
    ) -> CloudResult<Vec<RemoteInstance>> {
        self.record("launch_instances", &spec.image_id)?;
        let mut state = self.inner.lock().unwrap();
        let mut launched = Vec::new();
        for _ in 0..spec.count {
            state.next_id += 1;
            let instance = RemoteInstance {
                id: format!("i-{:08}", state.next_id),
                public_dns: None,
                lifecycle: InstanceLifecycle::Pending,
            };
            state.instances.insert(instance.id.clone(), instance.clone());
            launched.push(instance);
        }
        Ok(launched)
    }

    async fn describe_instances(
        &self,
        _region: &str,
        ids: &[String],
    ) -> CloudResult<Vec<RemoteInstance>> {
        self.record("describe_instances", &ids.join(","))?;
        let mut state = self.inner.lock().unwrap();
        if state.pending_describes > 0 {
            state.pending_describes -= 1;
        } else {
            for instance in state.instances.values_mut() {
                if instance.lifecycle == InstanceLifecycle::Pending {
                    instance.lifecycle = InstanceLifecycle::Running;
                    instance.public_dns = Some(format!("{}.example.test", instance.id));
                }
            }
        }

        let mut described = Vec::new();
        for id in ids {
            let instance = state.instances.get(id).ok_or_else(|| {
                ExternalError::not_found(format!("Instance '{id}'"))
            })?;
            described.push(instance.clone());
        }
        Ok(described)
    }

    async fn terminate_instances(&self, _region: &str, ids: &[String]) -> CloudResult<()> {
        self.record("terminate_instances", &ids.join(","))?;
        let mut state = self.inner.lock().unwrap();
        for id in ids {
            if state.instances.remove(id).is_none() {
                return Err(ExternalError::not_found(format!("Instance '{id}'")));
            }
        }
        Ok(())
    }
}

/// In-memory [`RemoteExecutor`] that records commands and replays scripted
/// outputs.
#[derive(Debug, Default)]
pub struct FakeRemote {
    commands: Mutex<Vec<RemoteCommand>>,
    uploads: Mutex<Vec<UploadSpec>>,
    scripted: Mutex<VecDeque<RemoteOutput>>,
}

impl FakeRemote {
    /// Creates a fake that answers every command with a clean exit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an output to return for the next command, in FIFO order.
    pub fn script(&self, output: RemoteOutput) {
        self.scripted.lock().unwrap().push_back(output);
    }

    /// Returns the shell commands run so far.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.command.clone())
            .collect()
    }

    /// Returns the uploads performed so far.
    #[must_use]
    pub fn uploads(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.remote_path.clone())
            .collect()
    }
}

#[async_trait]
impl RemoteExecutor for FakeRemote {
    async fn run(&self, command: &RemoteCommand) -> CloudResult<RemoteOutput> {
        self.commands.lock().unwrap().push(command.clone());
        Ok(self
            .scripted
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RemoteOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            }))
    }

    async fn upload(&self, spec: &UploadSpec) -> CloudResult<()> {
        self.uploads.lock().unwrap().push(spec.clone());
        Ok(())
    }
}
