//! Registry lifecycle against the in-memory runtime.

use k3d_core::K3dError;
use k3d_registry::{RegistryManager, RegistrySpec, VolumeOutcome};
use k3d_runtime::{ContainerRuntime, FailureKind, Labels, MockRuntime, Operation};
use std::collections::BTreeMap;

fn spec(cluster: &str) -> RegistrySpec {
    let mut spec = RegistrySpec::for_cluster(cluster);
    spec.name = "registry.local".into();
    spec.port = 5001;
    spec
}

fn spec_with_volume(cluster: &str, volume: &str) -> RegistrySpec {
    let mut spec = spec(cluster);
    spec.volume = Some(volume.into());
    spec
}

fn manager() -> RegistryManager<MockRuntime> {
    RegistryManager::new(MockRuntime::new())
}

#[test]
fn test_reuse_never_creates_a_second_container() {
    let manager = manager();
    let first = manager.ensure_registry(&spec("one")).unwrap();
    let second = manager.ensure_registry(&spec("two")).unwrap();
    let again = manager.ensure_registry(&spec("two")).unwrap();

    assert_eq!(first, second);
    assert_eq!(second, again);
    assert_eq!(manager.runtime().container_ids(), vec![first.clone()]);
    assert_eq!(manager.runtime().call_count(Operation::CreateContainer), 1);

    let networks = manager.runtime().container_networks(&first).unwrap();
    assert_eq!(networks, vec!["k3d-one", "k3d-two"]);
    let container = manager.runtime().container(&first).unwrap();
    assert_eq!(container.networks["k3d-two"], vec!["registry.local"]);
}

#[test]
fn test_reuse_restarts_a_stopped_registry() {
    let manager = manager();
    let id = manager.ensure_registry(&spec("one")).unwrap();
    manager.runtime().stop_container(&id);

    manager.ensure_registry(&spec("two")).unwrap();
    assert!(manager.runtime().container(&id).unwrap().running);
}

#[test]
fn test_reuse_tolerates_start_failure_but_not_lost_connectivity() {
    let manager = manager();
    let id = manager.ensure_registry(&spec("one")).unwrap();

    manager
        .runtime()
        .fail_on(Operation::StartContainer, FailureKind::Command);
    assert_eq!(manager.ensure_registry(&spec("two")).unwrap(), id);

    manager
        .runtime()
        .fail_on(Operation::StartContainer, FailureKind::Unavailable);
    let err = manager.ensure_registry(&spec("three")).unwrap_err();
    assert!(err.is_unavailable());
}

#[test]
fn test_registry_is_removed_only_after_last_release() {
    let manager = manager();
    let clusters = ["a", "b", "c"];
    for cluster in clusters {
        manager.ensure_registry(&spec(cluster)).unwrap();
    }

    let id = manager.find_registry().unwrap().unwrap();

    for (released, cluster) in clusters.iter().enumerate() {
        let report = manager.release_registry(cluster, false).unwrap();
        let remaining = clusters.len() - released - 1;

        assert!(report.detached);
        assert_eq!(report.remaining_networks.as_ref().map(Vec::len), Some(remaining));
        assert_eq!(report.removed, remaining == 0);
        match manager.runtime().container(&id) {
            Some(container) => {
                assert!(remaining > 0);
                assert!(container.running);
            }
            None => assert_eq!(remaining, 0),
        }
    }
}

#[test]
fn test_release_is_idempotent() {
    let manager = manager();
    manager.ensure_registry(&spec("one")).unwrap();
    manager.ensure_registry(&spec("two")).unwrap();

    let first = manager.release_registry("one", false).unwrap();
    assert!(first.detached);

    let second = manager.release_registry("one", false).unwrap();
    assert!(!second.detached);
    assert!(!second.removed);
    assert_eq!(second.remaining_networks, Some(vec!["k3d-two".to_string()]));
    assert_eq!(manager.runtime().container_ids().len(), 1);

    manager.release_registry("two", false).unwrap();
    let after = manager.release_registry("two", false).unwrap();
    assert_eq!(after.registry_id, None);
}

#[test]
fn test_release_of_unknown_cluster_keeps_registry() {
    let manager = manager();
    let id = manager.ensure_registry(&spec("one")).unwrap();

    let report = manager.release_registry("never-attached", false).unwrap();
    assert_eq!(report.registry_id, Some(id.clone()));
    assert!(!report.removed);
    assert!(manager.runtime().container(&id).is_some());
}

#[test]
fn test_attachments_made_outside_count_as_referents() {
    let manager = manager();
    let id = manager.ensure_registry(&spec("one")).unwrap();
    manager.runtime().attach_external(&id, "k3d-manual");

    let report = manager.release_registry("one", false).unwrap();
    assert_eq!(report.remaining_networks, Some(vec!["k3d-manual".to_string()]));
    assert!(manager.runtime().container(&id).is_some());

    // once the outside attachment is gone, a repeated release finishes the job
    manager.runtime().detach_external(&id, "k3d-manual");
    let report = manager.release_registry("one", false).unwrap();
    assert!(!report.detached);
    assert!(report.removed);
    assert!(manager.runtime().container(&id).is_none());
}

#[test]
fn test_managed_volume_is_created_labelled_and_deleted() {
    let manager = manager();
    let id = manager
        .ensure_registry(&spec_with_volume("one", "reg-data"))
        .unwrap();

    let labels = manager.runtime().volume_labels("reg-data").unwrap();
    assert_eq!(labels["app"], "k3d");
    assert_eq!(labels["component"], "registry");
    assert_eq!(labels["managed"], "true");
    assert_eq!(labels["registry-name"], "registry.local");
    assert_eq!(labels["registry-port"], "5001");

    let container = manager.runtime().container(&id).unwrap();
    assert_eq!(container.spec.host_config.binds, vec!["reg-data:/var/lib/registry"]);

    let report = manager.release_registry("one", false).unwrap();
    assert_eq!(report.volume, VolumeOutcome::Deleted("reg-data".into()));
    assert_eq!(manager.runtime().volume_labels("reg-data"), None);
}

#[test]
fn test_keep_volume_preserves_managed_volume() {
    let manager = manager();
    manager
        .ensure_registry(&spec_with_volume("one", "reg-data"))
        .unwrap();

    let report = manager.release_registry("one", true).unwrap();
    assert!(report.removed);
    assert_eq!(report.volume, VolumeOutcome::Kept("reg-data".into()));
    assert!(manager.runtime().volume_labels("reg-data").is_some());

    // a later registry picks the kept volume up again
    manager
        .ensure_registry(&spec_with_volume("two", "reg-data"))
        .unwrap();
    assert_eq!(manager.runtime().call_count(Operation::CreateVolume), 1);
}

#[test]
fn test_foreign_volume_is_never_deleted() {
    let manager = manager();
    let foreign: Labels = BTreeMap::from([("owner".to_string(), "me".to_string())]);
    manager.runtime().add_volume("precious", foreign.clone());

    manager
        .ensure_registry(&spec_with_volume("one", "precious"))
        .unwrap();
    assert_eq!(manager.runtime().call_count(Operation::CreateVolume), 0);

    let report = manager.release_registry("one", false).unwrap();
    assert!(report.removed);
    assert_eq!(report.volume, VolumeOutcome::NotOwned("precious".into()));
    assert_eq!(manager.runtime().volume_labels("precious"), Some(foreign));
}

#[test]
fn test_foreign_volume_is_never_deleted_even_when_kept() {
    let manager = manager();
    let foreign: Labels = BTreeMap::from([("owner".to_string(), "me".to_string())]);
    manager.runtime().add_volume("precious", foreign.clone());

    manager
        .ensure_registry(&spec_with_volume("one", "precious"))
        .unwrap();

    let report = manager.release_registry("one", true).unwrap();
    assert!(report.removed);
    assert_eq!(report.volume, VolumeOutcome::NotOwned("precious".into()));
    assert_eq!(manager.runtime().volume_labels("precious"), Some(foreign));
    assert_eq!(manager.runtime().call_count(Operation::RemoveVolume), 0);
}

#[test]
fn test_container_labels_round_trip() {
    let manager = manager();
    let id = manager.ensure_registry(&spec("one")).unwrap();

    let labels = manager.runtime().container_labels(&id).unwrap();
    assert_eq!(labels["app"], "k3d");
    assert_eq!(labels["component"], "registry");
    assert_eq!(labels["hostname"], "registry.local");
    assert!(chrono::NaiveDateTime::parse_from_str(&labels["created"], "%Y-%m-%d %H:%M:%S").is_ok());

    assert_eq!(manager.find_registry().unwrap(), Some(id));
}

#[test]
fn test_failed_create_leaves_existing_volume_alone() {
    let manager = manager();
    manager.runtime().add_volume("reg-data", Labels::new());
    manager
        .runtime()
        .fail_on(Operation::CreateContainer, FailureKind::Command);

    let err = manager
        .ensure_registry(&spec_with_volume("one", "reg-data"))
        .unwrap_err();
    assert!(matches!(
        err,
        K3dError::Creation {
            step: "creating container",
            ..
        }
    ));
    assert!(manager.runtime().volume_labels("reg-data").is_some());
    assert_eq!(manager.runtime().call_count(Operation::RemoveVolume), 0);
}

#[test]
fn test_failed_volume_creation_creates_no_container() {
    let manager = manager();
    manager
        .runtime()
        .fail_on(Operation::CreateVolume, FailureKind::Command);

    let err = manager
        .ensure_registry(&spec_with_volume("one", "reg-data"))
        .unwrap_err();
    assert!(matches!(
        err,
        K3dError::Creation {
            step: "creating volume",
            ..
        }
    ));
    assert_eq!(manager.runtime().call_count(Operation::CreateContainer), 0);
}

#[test]
fn test_connectivity_errors_are_fatal_everywhere() {
    let manager = manager();
    manager.ensure_registry(&spec("one")).unwrap();

    manager
        .runtime()
        .fail_on(Operation::VolumeMountedAt, FailureKind::Unavailable);
    let err = manager.release_registry("one", false).unwrap_err();
    assert!(err.is_unavailable());

    manager
        .runtime()
        .fail_on(Operation::DisconnectNetwork, FailureKind::Unavailable);
    assert!(manager.release_registry("one", false).unwrap_err().is_unavailable());
}

#[test]
fn test_network_query_failure_leaves_registry_in_place() {
    let manager = manager();
    let id = manager.ensure_registry(&spec("one")).unwrap();
    manager
        .runtime()
        .fail_command(Operation::ContainerNetworks);

    let report = manager.release_registry("one", false).unwrap();
    assert!(report.detached);
    assert_eq!(report.remaining_networks, None);
    assert_eq!(report.warnings.len(), 1);
    assert!(manager.runtime().container(&id).is_some());
}

#[test]
fn test_failed_container_removal_skips_volume_deletion() {
    let manager = manager();
    manager
        .ensure_registry(&spec_with_volume("one", "reg-data"))
        .unwrap();
    manager
        .runtime()
        .fail_command(Operation::RemoveContainer);

    let report = manager.release_registry("one", false).unwrap();
    assert!(!report.removed);
    assert_eq!(report.volume, VolumeOutcome::NoVolume);
    assert_eq!(report.warnings.len(), 2);
    assert_eq!(manager.runtime().call_count(Operation::RemoveVolume), 0);
}

#[test]
fn test_volume_deletion_failure_is_fatal() {
    let manager = manager();
    manager
        .ensure_registry(&spec_with_volume("one", "reg-data"))
        .unwrap();
    manager
        .runtime()
        .fail_on(Operation::RemoveVolume, FailureKind::Command);

    assert!(manager.release_registry("one", false).is_err());
    assert!(manager.runtime().container_ids().is_empty());
}

#[test]
fn test_mirror_config_is_written_into_node() {
    let manager = manager();
    let node = manager
        .runtime()
        .create_container(&k3d_runtime::ContainerSpec::new("k3d-one-server-0", "rancher/k3s"))
        .unwrap();

    let mut spec = spec("one");
    spec.cache = true;
    manager.write_mirror_config(&spec, &node).unwrap();

    let written = manager
        .runtime()
        .file(&node, "/etc/rancher/k3s/registries.yaml")
        .unwrap();
    let config: k3d_registry::MirrorConfig = serde_yaml_ng::from_slice(&written).unwrap();
    assert_eq!(
        config.mirrors["registry.local:5001"].endpoints,
        vec!["http://registry.local:5000"]
    );
    assert!(config.mirrors.contains_key("docker.io"));
}

#[test]
fn test_retried_release_finishes_interrupted_teardown() {
    let manager = manager();
    let id = manager
        .ensure_registry(&spec_with_volume("a", "reg-data"))
        .unwrap();

    manager.runtime().fail_command(Operation::RemoveContainer);
    let first = manager.release_registry("a", false).unwrap();
    assert!(first.detached);
    assert!(!first.removed);
    assert!(manager.runtime().container(&id).is_some());

    manager.runtime().clear_failure(Operation::RemoveContainer);
    let retry = manager.release_registry("a", false).unwrap();
    assert!(!retry.detached);
    assert_eq!(retry.remaining_networks, Some(Vec::new()));
    assert!(retry.removed);
    assert_eq!(retry.volume, VolumeOutcome::Deleted("reg-data".into()));
    assert!(manager.runtime().container(&id).is_none());
}

#[test]
fn test_retried_release_after_failed_network_query() {
    let manager = manager();
    let id = manager.ensure_registry(&spec("a")).unwrap();

    manager.runtime().fail_command(Operation::ContainerNetworks);
    let first = manager.release_registry("a", false).unwrap();
    assert_eq!(first.remaining_networks, None);
    assert!(manager.runtime().container(&id).is_some());

    manager.runtime().clear_failure(Operation::ContainerNetworks);
    let retry = manager.release_registry("a", false).unwrap();
    assert!(retry.removed);
    assert!(manager.runtime().container(&id).is_none());
}
