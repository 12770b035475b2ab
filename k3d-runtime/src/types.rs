//! Parameter types passed to the runtime.

use crate::ports::PortBinding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resource labels, kept ordered so generated commands are deterministic.
pub type Labels = BTreeMap<String, String>;

/// Selects containers by exact name and a set of labels that must all match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerFilter {
    pub name: Option<String>,
    pub labels: Labels,
}

impl ContainerFilter {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            labels: Labels::new(),
        }
    }

    pub fn with_labels<'a, I>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.labels
            .extend(labels.into_iter().map(|(k, v)| (k.to_string(), v.to_string())));
        self
    }

    /// True when `name` and `labels` satisfy every criterion of the filter.
    pub fn matches(&self, name: &str, labels: &Labels) -> bool {
        self.name.as_deref().map_or(true, |wanted| wanted == name)
            && self
                .labels
                .iter()
                .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }
}

/// Host-level settings of a container.
///
/// Every field has a default so a partial document can be deserialized and
/// deep-merged on top of a baseline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub port_bindings: Vec<PortBinding>,
    pub privileged: bool,
    pub init: bool,
    /// Restart policy name, e.g. `unless-stopped`.
    pub restart_policy: Option<String>,
    /// `source:destination[:mode]` bind or volume mounts.
    pub binds: Vec<String>,
    /// `host:ip` entries added to the container's hosts file.
    pub extra_hosts: Vec<String>,
    pub dns: Vec<String>,
}

/// A network the container joins at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEndpoint {
    pub network: String,
    pub aliases: Vec<String>,
}

/// Everything needed to create a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub hostname: Option<String>,
    pub labels: Labels,
    /// `KEY=value` entries.
    pub env: Vec<String>,
    pub host_config: HostConfig,
    pub network: Option<NetworkEndpoint>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            hostname: None,
            labels: Labels::new(),
            env: Vec::new(),
            host_config: HostConfig::default(),
            network: None,
        }
    }

    /// Ports exposed by the container, derived from the published bindings.
    pub fn exposed_ports(&self) -> Vec<String> {
        let mut ports: Vec<String> = self
            .host_config
            .port_bindings
            .iter()
            .map(PortBinding::exposed_port)
            .collect();
        ports.dedup();
        ports
    }
}
