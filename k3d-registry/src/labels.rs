//! Label sets identifying the registry container and the volumes it owns.
//!
//! These keys and values are matched by existing deployments and must not change.

use crate::types::RegistrySpec;
use k3d_runtime::Labels;

const CONTAINER_LABELS: &[(&str, &str)] = &[("app", "k3d"), ("component", "registry")];

const VOLUME_LABELS: &[(&str, &str)] = &[
    ("app", "k3d"),
    ("component", "registry"),
    ("managed", "true"),
];

pub const CREATED_LABEL: &str = "created";
pub const HOSTNAME_LABEL: &str = "hostname";
pub const REGISTRY_NAME_LABEL: &str = "registry-name";
pub const REGISTRY_PORT_LABEL: &str = "registry-port";

/// Format of the `created` label value.
pub const CREATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn to_labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Labels every registry container carries; used to find it.
pub fn registry_container_labels() -> Labels {
    to_labels(CONTAINER_LABELS)
}

/// Labels marking a volume as created (and therefore deletable) by this tooling.
pub fn managed_volume_labels() -> Labels {
    to_labels(VOLUME_LABELS)
}

/// Full label set for a new registry container.
pub fn container_labels(spec: &RegistrySpec, created: &str) -> Labels {
    let mut labels = registry_container_labels();
    labels.insert(CREATED_LABEL.to_string(), created.to_string());
    labels.insert(HOSTNAME_LABEL.to_string(), spec.name.clone());
    labels
}

/// Full label set for a registry volume created for `spec`.
pub fn volume_labels(spec: &RegistrySpec) -> Labels {
    let mut labels = managed_volume_labels();
    labels.insert(REGISTRY_NAME_LABEL.to_string(), spec.name.clone());
    labels.insert(REGISTRY_PORT_LABEL.to_string(), spec.port.to_string());
    labels
}
