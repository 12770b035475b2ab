//! In-memory [`ContainerRuntime`] used by tests.
//!
//! Mirrors the Docker behaviours the registry relies on: name collisions on
//! create, `NotFound` for missing resources and attachments, `-v name:/path`
//! implicitly creating unlabelled volumes. Failures can be injected per
//! [`Operation`].

use crate::types::{ContainerFilter, ContainerSpec, Labels};
use crate::{ContainerRuntime, RuntimeResult};
use k3d_core::RuntimeError;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

/// Runtime calls, used to inject failures and to inspect the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListContainers,
    ContainerLabels,
    CreateContainer,
    StartContainer,
    RemoveContainer,
    ConnectNetwork,
    DisconnectNetwork,
    ContainerNetworks,
    VolumeMountedAt,
    FindVolume,
    CreateVolume,
    RemoveVolume,
    CopyToContainer,
}

/// The kind of error an injected failure produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unavailable,
    NotFound,
    Command,
}

impl FailureKind {
    fn error(self, what: &str) -> RuntimeError {
        match self {
            FailureKind::Unavailable => {
                RuntimeError::Unavailable(format!("{}: connection refused", what))
            }
            FailureKind::NotFound => RuntimeError::NotFound(format!("{}: not found", what)),
            FailureKind::Command => RuntimeError::CommandFailed {
                command: what.to_string(),
                stderr: "injected failure".to_string(),
            },
        }
    }
}

/// A container as the mock sees it.
#[derive(Debug, Clone)]
pub struct MockContainer {
    pub id: String,
    pub spec: ContainerSpec,
    pub running: bool,
    /// network name -> aliases
    pub networks: BTreeMap<String, Vec<String>>,
    /// mount destination -> volume name
    pub mounts: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct MockState {
    containers: BTreeMap<String, MockContainer>,
    volumes: BTreeMap<String, Labels>,
    files: HashMap<(String, String), Vec<u8>>,
    failures: HashMap<Operation, FailureKind>,
    calls: Vec<Operation>,
    next_id: u64,
}

#[derive(Debug, Default)]
pub struct MockRuntime {
    state: Mutex<MockState>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // a test that panicked while holding the lock already failed
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every subsequent call of `op` fail with `kind`.
    pub fn fail_on(&self, op: Operation, kind: FailureKind) {
        self.state().failures.insert(op, kind);
    }

    pub fn clear_failure(&self, op: Operation) {
        self.state().failures.remove(&op);
    }

    /// Make every call fail as if the daemon were down.
    pub fn fail_unavailable(&self, op: Operation) {
        self.fail_on(op, FailureKind::Unavailable);
    }

    pub fn fail_command(&self, op: Operation) {
        self.fail_on(op, FailureKind::Command);
    }

    /// Number of times `op` was invoked (including failed invocations).
    pub fn call_count(&self, op: Operation) -> usize {
        self.state().calls.iter().filter(|c| **c == op).count()
    }

    pub fn container(&self, id: &str) -> Option<MockContainer> {
        self.state().containers.get(id).cloned()
    }

    pub fn container_ids(&self) -> Vec<String> {
        self.state().containers.keys().cloned().collect()
    }

    pub fn volume_labels(&self, name: &str) -> Option<Labels> {
        self.state().volumes.get(name).cloned()
    }

    /// Register a volume that exists independently of the registry tooling.
    pub fn add_volume(&self, name: &str, labels: Labels) {
        self.state().volumes.insert(name.to_string(), labels);
    }

    /// Attach a container to a network behind the tooling's back.
    pub fn attach_external(&self, id: &str, network: &str) {
        if let Some(container) = self.state().containers.get_mut(id) {
            container.networks.insert(network.to_string(), Vec::new());
        }
    }

    /// Detach a container from a network behind the tooling's back.
    pub fn detach_external(&self, id: &str, network: &str) {
        if let Some(container) = self.state().containers.get_mut(id) {
            container.networks.remove(network);
        }
    }

    pub fn stop_container(&self, id: &str) {
        if let Some(container) = self.state().containers.get_mut(id) {
            container.running = false;
        }
    }

    pub fn file(&self, id: &str, path: &str) -> Option<Vec<u8>> {
        self.state()
            .files
            .get(&(id.to_string(), path.to_string()))
            .cloned()
    }

    fn record(state: &mut MockState, op: Operation, what: &str) -> RuntimeResult<()> {
        state.calls.push(op);
        match state.failures.get(&op) {
            Some(kind) => Err(kind.error(what)),
            None => Ok(()),
        }
    }

    fn missing_container(id: &str) -> RuntimeError {
        RuntimeError::NotFound(format!("No such container: {}", id))
    }
}

impl ContainerRuntime for MockRuntime {
    fn list_containers(&self, filter: &ContainerFilter) -> RuntimeResult<Vec<String>> {
        let mut state = self.state();
        Self::record(&mut state, Operation::ListContainers, "ps")?;
        Ok(state
            .containers
            .values()
            .filter(|c| filter.matches(&c.spec.name, &c.spec.labels))
            .map(|c| c.id.clone())
            .collect())
    }

    fn container_labels(&self, id: &str) -> RuntimeResult<Labels> {
        let mut state = self.state();
        Self::record(&mut state, Operation::ContainerLabels, id)?;
        state
            .containers
            .get(id)
            .map(|c| c.spec.labels.clone())
            .ok_or_else(|| Self::missing_container(id))
    }

    fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<String> {
        let mut state = self.state();
        Self::record(&mut state, Operation::CreateContainer, &spec.name)?;

        if state.containers.values().any(|c| c.spec.name == spec.name) {
            return Err(RuntimeError::Conflict(format!(
                "The container name \"/{}\" is already in use",
                spec.name
            )));
        }

        let mut mounts = BTreeMap::new();
        for bind in &spec.host_config.binds {
            let mut parts = bind.splitn(3, ':');
            if let (Some(source), Some(destination)) = (parts.next(), parts.next()) {
                if !source.starts_with('/') {
                    state.volumes.entry(source.to_string()).or_default();
                    mounts.insert(destination.to_string(), source.to_string());
                }
            }
        }

        state.next_id += 1;
        let id = format!("{:012x}", state.next_id);
        let networks = spec
            .network
            .iter()
            .map(|endpoint| (endpoint.network.clone(), endpoint.aliases.clone()))
            .collect();

        state.containers.insert(
            id.clone(),
            MockContainer {
                id: id.clone(),
                spec: spec.clone(),
                running: false,
                networks,
                mounts,
            },
        );
        Ok(id)
    }

    fn start_container(&self, id: &str) -> RuntimeResult<()> {
        let mut state = self.state();
        Self::record(&mut state, Operation::StartContainer, id)?;
        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| Self::missing_container(id))?;
        container.running = true;
        Ok(())
    }

    fn remove_container(&self, id: &str) -> RuntimeResult<()> {
        let mut state = self.state();
        Self::record(&mut state, Operation::RemoveContainer, id)?;
        state
            .containers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Self::missing_container(id))
    }

    fn connect_network(&self, id: &str, network: &str, aliases: &[String]) -> RuntimeResult<()> {
        let mut state = self.state();
        Self::record(&mut state, Operation::ConnectNetwork, id)?;
        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| Self::missing_container(id))?;
        if container.networks.contains_key(network) {
            return Err(RuntimeError::Conflict(format!(
                "endpoint with name {} already exists in network {}",
                container.spec.name, network
            )));
        }
        container
            .networks
            .insert(network.to_string(), aliases.to_vec());
        Ok(())
    }

    fn disconnect_network(&self, id: &str, network: &str) -> RuntimeResult<()> {
        let mut state = self.state();
        Self::record(&mut state, Operation::DisconnectNetwork, id)?;
        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| Self::missing_container(id))?;
        container
            .networks
            .remove(network)
            .map(|_| ())
            .ok_or_else(|| {
                RuntimeError::NotFound(format!(
                    "container {} is not connected to network {}",
                    id, network
                ))
            })
    }

    fn container_networks(&self, id: &str) -> RuntimeResult<Vec<String>> {
        let mut state = self.state();
        Self::record(&mut state, Operation::ContainerNetworks, id)?;
        state
            .containers
            .get(id)
            .map(|c| c.networks.keys().cloned().collect())
            .ok_or_else(|| Self::missing_container(id))
    }

    fn volume_mounted_at(&self, id: &str, path: &str) -> RuntimeResult<Option<String>> {
        let mut state = self.state();
        Self::record(&mut state, Operation::VolumeMountedAt, id)?;
        state
            .containers
            .get(id)
            .map(|c| c.mounts.get(path).cloned())
            .ok_or_else(|| Self::missing_container(id))
    }

    fn find_volume(&self, name: &str, labels: &Labels) -> RuntimeResult<Option<String>> {
        let mut state = self.state();
        Self::record(&mut state, Operation::FindVolume, name)?;
        Ok(state.volumes.get(name).and_then(|actual| {
            labels
                .iter()
                .all(|(k, v)| actual.get(k) == Some(v))
                .then(|| name.to_string())
        }))
    }

    fn create_volume(&self, name: &str, labels: &Labels) -> RuntimeResult<String> {
        let mut state = self.state();
        Self::record(&mut state, Operation::CreateVolume, name)?;
        state.volumes.insert(name.to_string(), labels.clone());
        Ok(name.to_string())
    }

    fn remove_volume(&self, name: &str) -> RuntimeResult<()> {
        let mut state = self.state();
        Self::record(&mut state, Operation::RemoveVolume, name)?;
        if state.containers.values().any(|c| c.mounts.values().any(|v| v == name)) {
            return Err(RuntimeError::Conflict(format!("volume is in use - [{}]", name)));
        }
        state
            .volumes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::NotFound(format!("No such volume: {}", name)))
    }

    fn copy_to_container(&self, id: &str, path: &str, content: &[u8]) -> RuntimeResult<()> {
        let mut state = self.state();
        Self::record(&mut state, Operation::CopyToContainer, id)?;
        if !state.containers.contains_key(id) {
            return Err(Self::missing_container(id));
        }
        state
            .files
            .insert((id.to_string(), path.to_string()), content.to_vec());
        Ok(())
    }
}
