//! # k3d shared registry
//!
//! Lifecycle of the single local image registry shared by every k3d cluster
//! on a host.
//!
//! ## Features
//!
//! - **Singleton lookup**: the registry is found by its fixed container name
//!   and label set, never by a local record
//! - **Shared attachment**: every cluster network joins the same registry
//! - **Reference counting by reachability**: the registry (and, if managed,
//!   its volume) is removed when the last cluster network detaches
//! - **Mirror configuration**: nodes get a `registries.yaml` redirecting pulls
//!   to the registry, optionally including a Docker Hub pull-through cache
//!
//! ## Lifecycle
//!
//! ```text
//! absent → creating → running ⇄ detached-but-referenced → removing → absent
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use k3d_registry::{RegistryManager, RegistrySpec};
//! use k3d_runtime::DockerRuntime;
//!
//! # fn example() -> k3d_core::Result<()> {
//! let manager = RegistryManager::new(DockerRuntime::detect()?);
//! let spec = RegistrySpec::for_cluster("dev");
//! let id = manager.ensure_registry(&spec)?;
//! manager.write_mirror_config(&spec, "k3d-dev-server-0")?;
//! manager.release_registry("dev", false)?;
//! # let _ = id;
//! # Ok(())
//! # }
//! ```

pub mod labels;
pub mod lifecycle;
pub mod locator;
pub mod lock;
pub mod merge;
pub mod mirror;
pub mod types;

pub use lifecycle::{RegistryManager, ReleaseReport, StepFailure, VolumeOutcome};
pub use locator::RegistryLocator;
pub use lock::HostLock;
pub use mirror::{build_mirror_config, render_mirror_config, write_mirror_config};
pub use types::{Mirror, MirrorConfig, RegistrySpec};

/// Fixed name of the registry container.
pub const REGISTRY_CONTAINER_NAME: &str = "k3d-registry";

/// Image the registry container runs.
pub const REGISTRY_IMAGE: &str = "registry:2";

/// Port the registry listens on inside its container. Never configurable.
pub const REGISTRY_INTERNAL_PORT: u16 = 5000;

/// Default published port and hostname.
pub const DEFAULT_REGISTRY_PORT: u16 = 5000;
pub const DEFAULT_REGISTRY_NAME: &str = "registry.localhost";

/// Where the registry stores image data inside its container.
pub const REGISTRY_MOUNT_PATH: &str = "/var/lib/registry";

/// Where nodes read their mirror configuration from.
pub const NODE_REGISTRIES_PATH: &str = "/etc/rancher/k3s/registries.yaml";

/// Public hub namespace redirected to the cache.
pub const DOCKER_HUB_ADDRESS: &str = "docker.io";

/// Upstream the pull-through cache proxies to.
pub const DOCKER_HUB_REGISTRY_ADDRESS: &str = "registry-1.docker.io";

/// Environment variable enabling proxy mode in the registry process.
pub const PROXY_REMOTE_URL_ENV: &str = "REGISTRY_PROXY_REMOTEURL";

const NETWORK_PREFIX: &str = "k3d-";

/// Network a cluster's nodes live on.
pub fn cluster_network_name(cluster_name: &str) -> String {
    format!("{}{}", NETWORK_PREFIX, cluster_name)
}
