//! Mirror configuration for cluster nodes.
//!
//! Builds the `registries.yaml` document that redirects node image pulls to
//! the shared registry and copies it into node containers.

use crate::types::{Mirror, MirrorConfig, RegistrySpec};
use crate::{DOCKER_HUB_ADDRESS, NODE_REGISTRIES_PATH};
use k3d_core::{K3dError, Result};
use k3d_runtime::ContainerRuntime;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Load a base mirror document. A named base file must exist and parse.
pub fn load_base_config(path: &Path) -> Result<MirrorConfig> {
    info!("Using registries definitions from {}", path.display());
    let content = fs::read_to_string(path).map_err(|e| {
        K3dError::Config(format!(
            "Failed to read registries file {}: {}",
            path.display(),
            e
        ))
    })?;
    serde_yaml_ng::from_str(&content).map_err(|e| {
        K3dError::Config(format!(
            "Failed to parse registries file {}: {}",
            path.display(),
            e
        ))
    })
}

/// Build the mirror document for `spec`.
///
/// The result contains everything from the base document, plus a mirror for
/// `name:port` and, with the cache enabled, one for Docker Hub. Both point at
/// the registry's internal endpoint.
pub fn build_mirror_config(spec: &RegistrySpec) -> Result<MirrorConfig> {
    let mut config = match &spec.base_config {
        Some(path) => load_base_config(path)?,
        None => MirrorConfig::default(),
    };

    if spec.enabled {
        let endpoint = spec.internal_endpoint();

        config
            .mirrors
            .insert(spec.external_address(), Mirror::single(endpoint.clone()));

        // with the cache, every Docker Hub pull goes through the local registry
        if spec.cache {
            config
                .mirrors
                .insert(DOCKER_HUB_ADDRESS.to_string(), Mirror::single(endpoint));
        }
    }

    Ok(config)
}

/// Render the mirror document for `spec` as YAML.
pub fn render_mirror_config(spec: &RegistrySpec) -> Result<String> {
    let config = build_mirror_config(spec)?;
    Ok(serde_yaml_ng::to_string(&config)?)
}

/// Write the mirror document for `spec` into `node_id` at the fixed node path.
///
/// Must be called for every node that resolves images through the registry.
pub fn write_mirror_config<R>(runtime: &R, spec: &RegistrySpec, node_id: &str) -> Result<()>
where
    R: ContainerRuntime + ?Sized,
{
    let rendered = render_mirror_config(spec)?;
    debug!(
        "Writing {} ({} bytes) into {}",
        NODE_REGISTRIES_PATH,
        rendered.len(),
        node_id
    );
    runtime.copy_to_container(node_id, NODE_REGISTRIES_PATH, rendered.as_bytes())?;
    Ok(())
}
