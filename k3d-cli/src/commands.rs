// Command handlers for registry operations

use crate::cli::{Args, Command, SpecArgs};
use anyhow::{Context, Result};
use k3d_core::{k3d_info, k3d_println, k3d_success, k3d_warning, paths, K3dError};
use k3d_registry::{render_mirror_config, RegistryManager, RegistrySpec, VolumeOutcome};
use k3d_runtime::DockerRuntime;
use tracing::debug;

impl SpecArgs {
    /// Build the registry spec: file values first, then flags.
    pub fn resolve(&self, cluster: Option<&str>) -> Result<RegistrySpec> {
        let mut spec = match &self.spec {
            Some(path) => RegistrySpec::from_yaml_file(path)?,
            None => RegistrySpec::default(),
        };

        if let Some(cluster) = cluster {
            spec.cluster_name = cluster.to_string();
        }
        if let Some(name) = &self.name {
            spec.name = name.clone();
        }
        if let Some(port) = self.port {
            spec.port = port;
        }
        if let Some(volume) = &self.volume {
            spec.volume = Some(volume.clone());
        }
        spec.cache |= self.cache;
        spec.auto_restart |= self.auto_restart;
        if self.no_mirror {
            spec.enabled = false;
        }

        if let Some(base) = &self.base_config {
            spec.base_config = Some(base.clone());
        } else if spec.base_config.is_none() {
            spec.base_config = paths::global_registries_path()
                .ok()
                .and_then(|path| paths::existing_file(&path));
        }

        spec.validate()?;
        debug!("Resolved registry spec: {:?}", spec);
        Ok(spec)
    }
}

fn manager(no_lock: bool) -> Result<RegistryManager<DockerRuntime>> {
    let runtime = DockerRuntime::detect().map_err(K3dError::from)?;
    runtime.check_daemon_running().map_err(K3dError::from)?;

    let manager = RegistryManager::new(runtime);
    if no_lock {
        return Ok(manager);
    }
    Ok(manager.with_host_lock(paths::registry_lock_path()?))
}

/// Main command dispatcher
pub fn execute_command(args: Args) -> Result<()> {
    match &args.command {
        Command::Ensure { cluster, settings } => {
            let spec = settings.resolve(cluster.as_deref())?;
            let id = manager(args.no_lock)?.ensure_registry(&spec)?;
            k3d_success!(
                "Registry {} attached to {}",
                spec.external_address(),
                spec.network_name()
            );
            k3d_println!("{}", id);
        }
        Command::Release {
            cluster,
            keep_volume,
        } => {
            let report = manager(args.no_lock)?.release_registry(cluster, *keep_volume)?;
            for warning in &report.warnings {
                k3d_warning!("{}", warning);
            }
            if report.registry_id.is_none() {
                k3d_info!("No registry found");
            } else if report.removed {
                k3d_success!("Registry removed");
            } else if report.detached {
                k3d_success!("Registry detached from cluster {}", cluster);
            }
            match &report.volume {
                VolumeOutcome::Deleted(volume) => {
                    k3d_info!("Deleted volume {}", volume);
                }
                VolumeOutcome::Kept(volume) => {
                    k3d_info!("Kept volume {}", volume);
                }
                VolumeOutcome::NotOwned(volume) => {
                    k3d_info!("Volume {} is not managed by k3d, left untouched", volume);
                }
                VolumeOutcome::NoVolume => {}
            }
        }
        Command::Find => match manager(true)?.find_registry()? {
            Some(id) => {
                k3d_println!("{}", id);
            }
            None => {
                k3d_println!("no registry");
            }
        },
        Command::WriteConfig { node, settings } => {
            let spec = settings.resolve(None)?;
            manager(true)?
                .write_mirror_config(&spec, node)
                .with_context(|| format!("Failed to configure node {}", node))?;
            k3d_success!("Wrote registry configuration to {}", node);
        }
        Command::Render { settings } => {
            let spec = settings.resolve(None)?;
            k3d_println!("{}", render_mirror_config(&spec)?.trim_end());
        }
    }
    Ok(())
}
