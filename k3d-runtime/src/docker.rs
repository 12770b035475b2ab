//! [`ContainerRuntime`] backed by the `docker` command line client.

use crate::command::DockerCommand;
use crate::types::{ContainerFilter, ContainerSpec, Labels};
use crate::{ContainerRuntime, RuntimeResult};
use k3d_core::RuntimeError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Drives a local Docker daemon through its CLI.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    executable: String,
}

#[derive(Debug, Deserialize)]
struct MountInfo {
    #[serde(rename = "Type", default)]
    kind: String,
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "Destination", default)]
    destination: String,
}

impl DockerRuntime {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Locate `docker` on `PATH`.
    pub fn detect() -> RuntimeResult<Self> {
        let path = which::which("docker").map_err(|_| {
            RuntimeError::Unavailable("Docker is not installed or not in PATH".to_string())
        })?;
        Ok(Self::new(path.to_string_lossy()))
    }

    /// Check that the daemon answers, via `docker version`.
    pub fn check_daemon_running(&self) -> RuntimeResult<()> {
        self.docker("version")
            .args(["--format", "{{.Server.Version}}"])
            .execute_with_output()
            .map(|version| debug!("Docker daemon version {}", version))
    }

    fn docker(&self, subcommand: &str) -> DockerCommand {
        DockerCommand::new(self.executable.clone()).subcommand(subcommand)
    }

    fn inspect_json(&self, id: &str, template: &str) -> RuntimeResult<serde_json::Value> {
        let raw = self
            .docker("inspect")
            .args(["--type", "container", "--format", template, id])
            .execute_with_output()?;
        serde_json::from_str(&raw).map_err(|e| {
            RuntimeError::InvalidOutput(format!("could not parse inspect output '{}': {}", raw, e))
        })
    }

    /// `docker create` arguments for a container spec, without the subcommand.
    pub fn create_args(spec: &ContainerSpec) -> Vec<String> {
        let mut args = vec!["--name".to_string(), spec.name.clone()];
        let host = &spec.host_config;

        if let Some(hostname) = &spec.hostname {
            args.extend(["--hostname".to_string(), hostname.clone()]);
        }
        for (key, value) in &spec.labels {
            args.extend(["--label".to_string(), format!("{}={}", key, value)]);
        }
        for env in &spec.env {
            args.extend(["--env".to_string(), env.clone()]);
        }
        for port in spec.exposed_ports() {
            args.extend(["--expose".to_string(), port]);
        }
        for binding in &host.port_bindings {
            args.extend(["--publish".to_string(), binding.to_string()]);
        }
        if host.privileged {
            args.push("--privileged".to_string());
        }
        if host.init {
            args.push("--init".to_string());
        }
        if let Some(policy) = &host.restart_policy {
            args.extend(["--restart".to_string(), policy.clone()]);
        }
        for bind in &host.binds {
            args.extend(["--volume".to_string(), bind.clone()]);
        }
        for entry in &host.extra_hosts {
            args.extend(["--add-host".to_string(), entry.clone()]);
        }
        for server in &host.dns {
            args.extend(["--dns".to_string(), server.clone()]);
        }
        if let Some(endpoint) = &spec.network {
            args.extend(["--network".to_string(), endpoint.network.clone()]);
            for alias in &endpoint.aliases {
                args.extend(["--network-alias".to_string(), alias.clone()]);
            }
        }

        args.push(spec.image.clone());
        args
    }
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl ContainerRuntime for DockerRuntime {
    fn list_containers(&self, filter: &ContainerFilter) -> RuntimeResult<Vec<String>> {
        let mut cmd = self.docker("ps").args(["--all", "--no-trunc"]);
        if let Some(name) = &filter.name {
            cmd = cmd.args(["--filter".to_string(), format!("name=^/?{}$", name)]);
        }
        let output = cmd
            .repeated(
                "--filter",
                filter.labels.iter().map(|(k, v)| format!("label={}={}", k, v)),
            )
            .args(["--format", "{{.ID}}"])
            .execute_with_output()?;

        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn container_labels(&self, id: &str) -> RuntimeResult<Labels> {
        let value = self.inspect_json(id, "{{json .Config.Labels}}")?;
        if value.is_null() {
            return Ok(Labels::new());
        }
        serde_json::from_value(value)
            .map_err(|e| RuntimeError::InvalidOutput(format!("unexpected labels: {}", e)))
    }

    fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<String> {
        let id = self
            .docker("create")
            .args(Self::create_args(spec))
            .execute_with_output()?;
        // `docker create` may print pull progress before the id
        id.lines()
            .last()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .ok_or_else(|| RuntimeError::InvalidOutput("docker create printed no id".to_string()))
    }

    fn start_container(&self, id: &str) -> RuntimeResult<()> {
        self.docker("start").arg(id).execute()
    }

    fn remove_container(&self, id: &str) -> RuntimeResult<()> {
        self.docker("rm").args(["--force", "--volumes", id]).execute()
    }

    fn connect_network(&self, id: &str, network: &str, aliases: &[String]) -> RuntimeResult<()> {
        self.docker("network")
            .arg("connect")
            .repeated("--alias", aliases.iter().cloned())
            .args([network, id])
            .execute()
    }

    fn disconnect_network(&self, id: &str, network: &str) -> RuntimeResult<()> {
        self.docker("network")
            .args(["disconnect", network, id])
            .execute()
    }

    fn container_networks(&self, id: &str) -> RuntimeResult<Vec<String>> {
        let value = self.inspect_json(id, "{{json .NetworkSettings.Networks}}")?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        let networks: BTreeMap<String, serde_json::Value> = serde_json::from_value(value)
            .map_err(|e| RuntimeError::InvalidOutput(format!("unexpected networks: {}", e)))?;
        Ok(networks.into_keys().collect())
    }

    fn volume_mounted_at(&self, id: &str, path: &str) -> RuntimeResult<Option<String>> {
        let value = self.inspect_json(id, "{{json .Mounts}}")?;
        if value.is_null() {
            return Ok(None);
        }
        let mounts: Vec<MountInfo> = serde_json::from_value(value)
            .map_err(|e| RuntimeError::InvalidOutput(format!("unexpected mounts: {}", e)))?;
        Ok(mounts
            .into_iter()
            .find(|m| m.kind == "volume" && m.destination == path)
            .and_then(|m| m.name))
    }

    fn find_volume(&self, name: &str, labels: &Labels) -> RuntimeResult<Option<String>> {
        let output = self
            .docker("volume")
            .arg("ls")
            .args(["--filter".to_string(), format!("name={}", name)])
            .repeated(
                "--filter",
                labels.iter().map(|(k, v)| format!("label={}={}", k, v)),
            )
            .args(["--format", "{{.Name}}"])
            .execute_with_output()?;

        Ok(output
            .lines()
            .map(str::trim)
            .find(|line| *line == name)
            .map(str::to_string))
    }

    fn create_volume(&self, name: &str, labels: &Labels) -> RuntimeResult<String> {
        self.docker("volume")
            .arg("create")
            .repeated(
                "--label",
                labels.iter().map(|(k, v)| format!("{}={}", k, v)),
            )
            .arg(name)
            .execute_with_output()
    }

    fn remove_volume(&self, name: &str) -> RuntimeResult<()> {
        self.docker("volume").args(["rm", name]).execute()
    }

    fn copy_to_container(&self, id: &str, path: &str, content: &[u8]) -> RuntimeResult<()> {
        let staging = tempfile::tempdir()?;
        stage_file(staging.path(), path, content)?;

        let source = format!("{}/.", staging.path().display());
        self.docker("cp")
            .args([source, format!("{}:/", id)])
            .execute()
    }
}

/// Lay `content` out under `root` at the relative form of the absolute `path`,
/// so `docker cp root/. id:/` creates missing parents inside the container.
///
/// `docker cp` carries directory modes over, the staging root included, so
/// every staged directory is set to 0755 and the file to 0644.
fn stage_file(root: &Path, path: &str, content: &[u8]) -> std::io::Result<PathBuf> {
    let staged = root.join(path.trim_start_matches('/'));
    if let Some(parent) = staged.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&staged, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        fs::set_permissions(&staged, fs::Permissions::from_mode(0o644))?;
        let mut dir = staged.parent();
        while let Some(current) = dir.filter(|d| d.starts_with(root)) {
            fs::set_permissions(current, fs::Permissions::from_mode(0o755))?;
            dir = current.parent();
        }
    }

    Ok(staged)
}
