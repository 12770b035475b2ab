//! Registry lifecycle: create-or-reuse on cluster creation, detach and
//! conditional removal on cluster deletion.
//!
//! The registry is reference counted by reachability. Every cluster network it
//! is attached to is a referent, and the count is always read back from the
//! runtime rather than kept anywhere locally. When a release leaves no network
//! attached, the container goes away, and with it the backing volume if this
//! tooling created that volume and the caller did not ask to keep it.

use crate::labels::{container_labels, managed_volume_labels, volume_labels, CREATED_FORMAT};
use crate::locator::RegistryLocator;
use crate::lock::HostLock;
use crate::merge::merge_host_config;
use crate::types::RegistrySpec;
use crate::{
    cluster_network_name, mirror, DOCKER_HUB_REGISTRY_ADDRESS, PROXY_REMOTE_URL_ENV,
    REGISTRY_CONTAINER_NAME, REGISTRY_IMAGE, REGISTRY_INTERNAL_PORT, REGISTRY_MOUNT_PATH,
};
use k3d_core::{K3dError, Result, RuntimeError};
use k3d_runtime::{
    ContainerRuntime, ContainerSpec, HostConfig, Labels, NetworkEndpoint, PortBinding,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of a teardown sub-step that did not succeed.
#[derive(Debug)]
pub enum StepFailure {
    /// Logged and recorded; the release carries on.
    Recoverable(K3dError),
    /// Aborts the release.
    Fatal(K3dError),
}

impl StepFailure {
    /// Classify a failure of a best-effort step. Losing the runtime connection
    /// is never best-effort.
    pub fn best_effort(err: impl Into<K3dError>) -> Self {
        let err = err.into();
        if err.is_unavailable() {
            StepFailure::Fatal(err)
        } else {
            StepFailure::Recoverable(err)
        }
    }

    /// Record a recoverable failure as a warning on `report`, or hand back a
    /// fatal one.
    pub fn recover(self, report: &mut ReleaseReport, step: &str) -> Result<()> {
        match self {
            StepFailure::Recoverable(err) => {
                warn!("Failed {}: {}", step, err);
                report.warnings.push(format!("failed {}: {}", step, err));
                Ok(())
            }
            StepFailure::Fatal(err) => Err(err),
        }
    }
}

/// What happened to the registry volume during a release.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VolumeOutcome {
    /// No volume was mounted, or the registry was not removed.
    #[default]
    NoVolume,
    Deleted(String),
    /// Managed, but the caller asked to keep it.
    Kept(String),
    /// Not created by this tooling; left untouched.
    NotOwned(String),
}

/// Summary of a [`RegistryManager::release_registry`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    /// The registry found, if any.
    pub registry_id: Option<String>,
    /// Whether the cluster network was detached by this call.
    pub detached: bool,
    /// Networks still attached after detaching; `None` when not queried.
    pub remaining_networks: Option<Vec<String>>,
    /// Whether the registry container is gone.
    pub removed: bool,
    pub volume: VolumeOutcome,
    /// Best-effort steps that failed.
    pub warnings: Vec<String>,
}

/// Resources created by an in-flight `ensure_registry` call, removed again if
/// a later step fails.
#[derive(Debug, Default)]
struct CreatedResources {
    container: Option<String>,
    volume: Option<String>,
}

/// Drives the shared registry through a [`ContainerRuntime`].
pub struct RegistryManager<R: ContainerRuntime> {
    runtime: R,
    lock_path: Option<PathBuf>,
}

impl<R: ContainerRuntime> RegistryManager<R> {
    pub fn new(runtime: R) -> Self {
        Self {
            runtime,
            lock_path: None,
        }
    }

    /// Serialize `ensure_registry` and `release_registry` against other
    /// processes through a lock file at `path`.
    pub fn with_host_lock(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_path = Some(path.into());
        self
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn locator(&self) -> RegistryLocator<'_, R> {
        RegistryLocator::new(&self.runtime)
    }

    pub fn find_registry(&self) -> Result<Option<String>> {
        self.locator().find_registry()
    }

    fn lock(&self) -> Result<Option<HostLock>> {
        self.lock_path
            .as_deref()
            .map(HostLock::acquire)
            .transpose()
    }

    /// Make sure the registry exists, runs, and is attached to the cluster's
    /// network. Returns the registry id.
    pub fn ensure_registry(&self, spec: &RegistrySpec) -> Result<String> {
        spec.validate_for_cluster()?;
        let _lock = self.lock()?;

        match self.locator().find_registry()? {
            Some(id) => {
                self.reuse_registry(&id, spec)?;
                Ok(id)
            }
            None => self.create_registry(spec),
        }
    }

    fn reuse_registry(&self, id: &str, spec: &RegistrySpec) -> Result<()> {
        info!("Using existing registry {}", id);

        match self.locator().registry_hostname(id) {
            Ok(Some(hostname)) if hostname != spec.name => warn!(
                "Registry {} was created as '{}', not '{}'; nodes will use '{}'",
                id, hostname, spec.name, spec.name
            ),
            Ok(_) => {}
            Err(e) if e.is_unavailable() => return Err(e),
            Err(e) => debug!("Could not read labels of registry {}: {}", id, e),
        }

        if let Err(e) = self.runtime.start_container(id) {
            if e.is_unavailable() {
                return Err(e.into());
            }
            warn!("Failed to start registry {}: {}", id, e);
        }

        let network = spec.network_name();
        match self
            .runtime
            .connect_network(id, &network, &[spec.name.clone()])
        {
            Ok(()) => info!("Attached registry to network {}", network),
            Err(RuntimeError::Conflict(_)) => {
                debug!("Registry already attached to network {}", network)
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn create_registry(&self, spec: &RegistrySpec) -> Result<String> {
        let mut created = CreatedResources::default();
        let result = self.create_resources(spec, &mut created);
        if result.is_err() {
            self.rollback(created);
        }
        result
    }

    fn create_resources(&self, spec: &RegistrySpec, created: &mut CreatedResources) -> Result<String> {
        info!("Creating registry {}", spec.external_address());

        let mut host_config = registry_host_config(spec)?;

        if let Some(volume) = &spec.volume {
            let exists = self
                .runtime
                .find_volume(volume, &Labels::new())
                .map_err(|e| K3dError::creation("inspecting volume", e))?;
            if exists.is_some() {
                info!("Reusing existing volume {}", volume);
            } else {
                self.runtime
                    .create_volume(volume, &volume_labels(spec))
                    .map_err(|e| K3dError::creation("creating volume", e))?;
                info!("Created volume {}", volume);
                created.volume = Some(volume.clone());
            }
            host_config
                .binds
                .push(format!("{}:{}", volume, REGISTRY_MOUNT_PATH));
        }

        let created_at = chrono::Local::now().format(CREATED_FORMAT).to_string();
        let container = registry_container_spec(spec, host_config, &created_at);

        let id = self
            .runtime
            .create_container(&container)
            .map_err(|e| K3dError::creation("creating container", e))?;
        created.container = Some(id.clone());

        self.runtime
            .start_container(&id)
            .map_err(|e| K3dError::creation("starting container", e))?;

        info!("Registry {} running as {}", spec.external_address(), id);
        Ok(id)
    }

    fn rollback(&self, created: CreatedResources) {
        if let Some(id) = created.container {
            match self.runtime.remove_container(&id) {
                Ok(()) => debug!("Removed partially created registry {}", id),
                Err(e) => warn!("Failed to remove partially created registry {}: {}", id, e),
            }
        }
        if let Some(volume) = created.volume {
            match self.runtime.remove_volume(&volume) {
                Ok(()) => debug!("Removed volume {} created for the failed registry", volume),
                Err(e) => warn!("Failed to remove volume {}: {}", volume, e),
            }
        }
    }

    /// Detach the registry from `cluster`'s network and remove it once no
    /// network is left attached.
    pub fn release_registry(&self, cluster: &str, keep_volume: bool) -> Result<ReleaseReport> {
        if cluster.trim().is_empty() {
            return Err(K3dError::Config("Cluster name must not be empty".to_string()));
        }
        let _lock = self.lock()?;

        let network = cluster_network_name(cluster);
        let mut report = ReleaseReport::default();

        let id = match self.locator().find_registry()? {
            Some(id) => id,
            None => {
                info!("No registry found, nothing to release");
                return Ok(report);
            }
        };
        report.registry_id = Some(id.clone());

        match self.runtime.disconnect_network(&id, &network) {
            Ok(()) => {
                info!("Detached registry from network {}", network);
                report.detached = true;
            }
            // not a referent; an earlier release may still have left teardown unfinished
            Err(e) if e.is_not_found() => {
                info!("Registry is not attached to network {}", network);
            }
            Err(e) => return Err(e.into()),
        }

        let remaining = match self.runtime.container_networks(&id) {
            Ok(networks) => networks,
            Err(e) => {
                StepFailure::best_effort(e).recover(&mut report, "listing registry networks")?;
                return Ok(report);
            }
        };
        report.remaining_networks = Some(remaining.clone());

        if !remaining.is_empty() {
            info!(
                "Registry still attached to {}, keeping it",
                remaining.join(", ")
            );
            return Ok(report);
        }

        self.remove_registry(&id, keep_volume, &mut report)?;
        Ok(report)
    }

    fn remove_registry(&self, id: &str, keep_volume: bool, report: &mut ReleaseReport) -> Result<()> {
        info!("No cluster uses registry {} anymore, removing it", id);

        let volume = match self.runtime.volume_mounted_at(id, REGISTRY_MOUNT_PATH) {
            Ok(volume) => volume,
            Err(e) => {
                StepFailure::best_effort(e).recover(report, "finding registry volume")?;
                None
            }
        };

        match self.runtime.remove_container(id) {
            Ok(()) => report.removed = true,
            Err(e) if e.is_not_found() => {
                debug!("Registry {} already removed", id);
                report.removed = true;
            }
            Err(e) => {
                StepFailure::best_effort(e).recover(report, "removing registry container")?;
                if let Some(volume) = volume {
                    report
                        .warnings
                        .push(format!("volume {} left in place, registry still present", volume));
                }
                return Ok(());
            }
        }

        let volume = match volume {
            Some(volume) => volume,
            None => return Ok(()),
        };

        if self
            .runtime
            .find_volume(&volume, &managed_volume_labels())?
            .is_none()
        {
            info!("Volume {} was not created by k3d, leaving it", volume);
            report.volume = VolumeOutcome::NotOwned(volume);
            return Ok(());
        }

        if keep_volume {
            info!("Keeping registry volume {}", volume);
            report.volume = VolumeOutcome::Kept(volume);
            return Ok(());
        }

        match self.runtime.remove_volume(&volume) {
            Ok(()) => info!("Deleted registry volume {}", volume),
            Err(e) if e.is_not_found() => debug!("Volume {} already gone", volume),
            Err(e) => return Err(e.into()),
        }
        report.volume = VolumeOutcome::Deleted(volume);
        Ok(())
    }

    /// Point `node_id` at the registry by writing its mirror configuration.
    pub fn write_mirror_config(&self, spec: &RegistrySpec, node_id: &str) -> Result<()> {
        mirror::write_mirror_config(&self.runtime, spec, node_id)
    }

    /// Lock file location in use, if any.
    pub fn lock_path(&self) -> Option<&Path> {
        self.lock_path.as_deref()
    }
}

/// Host configuration of a new registry container, before the volume bind.
fn registry_host_config(spec: &RegistrySpec) -> Result<HostConfig> {
    let binding = PortBinding::parse(&format!(
        "0.0.0.0:{}:{}/tcp",
        spec.port, REGISTRY_INTERNAL_PORT
    ))
    .map_err(|e| K3dError::creation("parsing port binding", e))?;

    let baseline = HostConfig {
        port_bindings: vec![binding],
        privileged: true,
        init: true,
        ..HostConfig::default()
    };

    let mut host_config = merge_host_config(baseline, spec.host_config.as_ref())
        .map_err(|e| K3dError::creation("merging host config", e))?;

    if spec.auto_restart {
        host_config.restart_policy = Some("unless-stopped".to_string());
    }
    Ok(host_config)
}

fn registry_container_spec(
    spec: &RegistrySpec,
    host_config: HostConfig,
    created_at: &str,
) -> ContainerSpec {
    let mut container = ContainerSpec::new(REGISTRY_CONTAINER_NAME, REGISTRY_IMAGE);
    container.hostname = Some(spec.name.clone());
    container.labels = container_labels(spec, created_at);
    container.host_config = host_config;
    container.network = Some(NetworkEndpoint {
        network: spec.network_name(),
        aliases: vec![spec.name.clone()],
    });
    if spec.cache {
        container.env.push(format!(
            "{}=https://{}",
            PROXY_REMOTE_URL_ENV, DOCKER_HUB_REGISTRY_ADDRESS
        ));
    }
    container
}

#[cfg(test)]
mod tests {
    use super::*;
    use k3d_runtime::{FailureKind, MockRuntime, Operation};
    use serde_json::json;
    use tempfile::TempDir;

    fn spec(cluster: &str) -> RegistrySpec {
        let mut spec = RegistrySpec::for_cluster(cluster);
        spec.name = "registry.local".into();
        spec.port = 5001;
        spec
    }

    #[test]
    fn test_host_config_baseline_and_restart() {
        let mut spec = spec("dev");
        let config = registry_host_config(&spec).unwrap();
        assert!(config.privileged);
        assert!(config.init);
        assert_eq!(config.restart_policy, None);
        assert_eq!(
            config.port_bindings,
            vec![PortBinding::all_interfaces(5001, 5000)]
        );

        spec.auto_restart = true;
        spec.host_config = Some(json!({"restart_policy": "always", "privileged": false}));
        let config = registry_host_config(&spec).unwrap();
        assert_eq!(config.restart_policy.as_deref(), Some("unless-stopped"));
        assert!(!config.privileged);
    }

    #[test]
    fn test_invalid_override_names_step() {
        let mut spec = spec("dev");
        spec.host_config = Some(json!("privileged"));
        let err = registry_host_config(&spec).unwrap_err();
        assert!(matches!(
            err,
            K3dError::Creation {
                step: "merging host config",
                ..
            }
        ));
    }

    #[test]
    fn test_container_spec_for_cache() {
        let mut spec = spec("dev");
        spec.cache = true;
        let container = registry_container_spec(&spec, HostConfig::default(), "now");

        assert_eq!(container.name, "k3d-registry");
        assert_eq!(container.image, "registry:2");
        assert_eq!(container.hostname.as_deref(), Some("registry.local"));
        assert_eq!(
            container.env,
            vec!["REGISTRY_PROXY_REMOTEURL=https://registry-1.docker.io"]
        );
        let endpoint = container.network.unwrap();
        assert_eq!(endpoint.network, "k3d-dev");
        assert_eq!(endpoint.aliases, vec!["registry.local"]);
    }

    #[test]
    fn test_ensure_then_release_single_cluster() {
        let manager = RegistryManager::new(MockRuntime::new());
        let id = manager.ensure_registry(&spec("dev")).unwrap();

        let container = manager.runtime().container(&id).unwrap();
        assert!(container.running);
        assert!(container.networks.contains_key("k3d-dev"));

        let report = manager.release_registry("dev", false).unwrap();
        assert!(report.detached);
        assert!(report.removed);
        assert_eq!(report.remaining_networks, Some(Vec::new()));
        assert!(manager.runtime().container_ids().is_empty());
    }

    #[test]
    fn test_step_failure_classification() {
        let mut report = ReleaseReport::default();
        StepFailure::best_effort(RuntimeError::CommandFailed {
            command: "docker rm".into(),
            stderr: "boom".into(),
        })
        .recover(&mut report, "removing registry container")
        .unwrap();
        assert_eq!(report.warnings.len(), 1);

        let fatal = StepFailure::best_effort(RuntimeError::Unavailable("down".into()));
        assert!(matches!(fatal, StepFailure::Fatal(_)));
        assert!(fatal.recover(&mut report, "x").is_err());
    }

    #[test]
    fn test_start_failure_rolls_back_container_and_new_volume() {
        let manager = RegistryManager::new(MockRuntime::new());
        manager
            .runtime()
            .fail_on(Operation::StartContainer, FailureKind::Command);

        let mut spec = spec("dev");
        spec.volume = Some("reg-data".into());

        let err = manager.ensure_registry(&spec).unwrap_err();
        assert!(matches!(
            err,
            K3dError::Creation {
                step: "starting container",
                ..
            }
        ));
        assert!(manager.runtime().container_ids().is_empty());
        assert_eq!(manager.runtime().volume_labels("reg-data"), None);
    }

    #[test]
    fn test_host_lock_is_taken_and_released() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.lock");
        let manager = RegistryManager::new(MockRuntime::new()).with_host_lock(&path);

        manager.ensure_registry(&spec("dev")).unwrap();
        assert_eq!(manager.lock_path(), Some(path.as_path()));
        assert!(HostLock::try_acquire(&path).unwrap().is_some());
    }

    #[test]
    fn test_empty_cluster_is_rejected() {
        let manager = RegistryManager::new(MockRuntime::new());
        assert!(matches!(
            manager.ensure_registry(&RegistrySpec::default()),
            Err(K3dError::Config(_))
        ));
        assert!(matches!(
            manager.release_registry(" ", false),
            Err(K3dError::Config(_))
        ));
        assert_eq!(manager.runtime().call_count(Operation::ListContainers), 0);
    }
}
