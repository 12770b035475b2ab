//! # k3d runtime adapter
//!
//! The container/volume/network primitives the registry lifecycle is built on.
//! [`ContainerRuntime`] is the seam: [`DockerRuntime`] drives the `docker` CLI,
//! [`MockRuntime`] keeps everything in memory for tests.
//!
//! Every resource is addressed by an opaque string identifier. Implementations
//! report missing resources (and missing attachments) as
//! [`RuntimeError::NotFound`] so callers can treat repeated removals as success.

pub mod command;
pub mod docker;
pub mod mock;
pub mod ports;
pub mod types;

pub use docker::DockerRuntime;
pub use k3d_core::RuntimeError;
pub use mock::{FailureKind, MockRuntime, Operation};
pub use ports::{PortBinding, Protocol};
pub use types::{ContainerFilter, ContainerSpec, HostConfig, Labels, NetworkEndpoint};

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Container, volume and network operations consumed by the registry.
pub trait ContainerRuntime {
    /// Ids of all containers (running or not) matching the filter.
    fn list_containers(&self, filter: &ContainerFilter) -> RuntimeResult<Vec<String>>;

    fn container_labels(&self, id: &str) -> RuntimeResult<Labels>;

    /// Create (but do not start) a container, returning its id.
    fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<String>;

    fn start_container(&self, id: &str) -> RuntimeResult<()>;

    /// Force-remove a container together with its anonymous volumes.
    fn remove_container(&self, id: &str) -> RuntimeResult<()>;

    fn connect_network(&self, id: &str, network: &str, aliases: &[String]) -> RuntimeResult<()>;

    fn disconnect_network(&self, id: &str, network: &str) -> RuntimeResult<()>;

    /// Names of the networks the container is currently attached to.
    fn container_networks(&self, id: &str) -> RuntimeResult<Vec<String>>;

    /// Name of the named volume mounted at `path` inside the container, if any.
    fn volume_mounted_at(&self, id: &str, path: &str) -> RuntimeResult<Option<String>>;

    /// Look up a volume by exact name, requiring every given label to match.
    fn find_volume(&self, name: &str, labels: &Labels) -> RuntimeResult<Option<String>>;

    fn create_volume(&self, name: &str, labels: &Labels) -> RuntimeResult<String>;

    fn remove_volume(&self, name: &str) -> RuntimeResult<()>;

    /// Write `content` to the absolute `path` inside the container's filesystem.
    fn copy_to_container(&self, id: &str, path: &str, content: &[u8]) -> RuntimeResult<()>;
}
