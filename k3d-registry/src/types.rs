//! Type definitions for the shared registry

use crate::{cluster_network_name, DEFAULT_REGISTRY_NAME, DEFAULT_REGISTRY_PORT, REGISTRY_INTERNAL_PORT};
use k3d_core::{K3dError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Desired configuration of the shared registry for one cluster operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySpec {
    /// Cluster requesting the registry; selects the network to attach.
    pub cluster_name: String,
    /// Whether nodes should be pointed at the registry at all.
    pub enabled: bool,
    /// Hostname the registry is reachable under (default: registry.localhost)
    pub name: String,
    /// Port published on the host (default: 5000)
    pub port: u16,
    /// Named volume backing the registry storage
    pub volume: Option<String>,
    /// Proxy and cache pulls from Docker Hub
    pub cache: bool,
    /// Restart the registry unless it was stopped manually
    pub auto_restart: bool,
    /// Base `registries.yaml` merged into the generated mirror configuration
    pub base_config: Option<PathBuf>,
    /// Partial host configuration deep-merged over the built-in one
    pub host_config: Option<serde_json::Value>,
}

impl Default for RegistrySpec {
    fn default() -> Self {
        Self {
            cluster_name: String::new(),
            enabled: true,
            name: DEFAULT_REGISTRY_NAME.to_string(),
            port: DEFAULT_REGISTRY_PORT,
            volume: None,
            cache: false,
            auto_restart: false,
            base_config: None,
            host_config: None,
        }
    }
}

impl RegistrySpec {
    pub fn for_cluster(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            ..Self::default()
        }
    }

    /// Load a spec from a YAML document on disk.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            K3dError::Config(format!("Failed to read registry spec {}: {}", path.display(), e))
        })?;
        serde_yaml_ng::from_str(&content).map_err(|e| {
            K3dError::Config(format!("Failed to parse registry spec {}: {}", path.display(), e))
        })
    }

    /// Check the fields every operation relies on.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(K3dError::Config("Registry name must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(K3dError::Config("Registry port must not be 0".to_string()));
        }
        Ok(())
    }

    /// Like [`validate`](Self::validate), additionally requiring a cluster.
    pub fn validate_for_cluster(&self) -> Result<()> {
        self.validate()?;
        if self.cluster_name.trim().is_empty() {
            return Err(K3dError::Config("Cluster name must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn internal_port(&self) -> u16 {
        REGISTRY_INTERNAL_PORT
    }

    pub fn network_name(&self) -> String {
        cluster_network_name(&self.cluster_name)
    }

    /// `name:port` as seen from the host and used as the mirror key.
    pub fn external_address(&self) -> String {
        format!("{}:{}", self.name, self.port)
    }

    /// `http://name:5000`, the address nodes reach the registry on.
    pub fn internal_endpoint(&self) -> String {
        format!("http://{}:{}", self.name, self.internal_port())
    }
}

/// Registry mirror configuration as read by k3s from `registries.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Namespace (registry host) to mirror mapping.
    #[serde(default, deserialize_with = "null_as_default")]
    pub mirrors: BTreeMap<String, Mirror>,

    /// Per-registry settings, keyed by host. Passed through untouched.
    #[serde(default, deserialize_with = "null_as_default")]
    pub configs: BTreeMap<String, serde_yaml_ng::Value>,

    /// Deprecated per-endpoint auth settings. Passed through untouched.
    #[serde(default, deserialize_with = "null_as_default")]
    pub auths: BTreeMap<String, serde_yaml_ng::Value>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml_ng::Value>,
}

/// Endpoints tried in order until one serves the pull.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mirror {
    #[serde(rename = "endpoint", default, deserialize_with = "null_as_default")]
    pub endpoints: Vec<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml_ng::Value>,
}

impl Mirror {
    pub fn single(endpoint: impl Into<String>) -> Self {
        Self {
            endpoints: vec![endpoint.into()],
            extra: BTreeMap::new(),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
