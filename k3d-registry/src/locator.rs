//! Finds the shared registry container.
//!
//! The runtime is the only source of truth: a container counts as the registry
//! only if it has the fixed name and carries every registry label.

use crate::labels::{registry_container_labels, HOSTNAME_LABEL};
use crate::REGISTRY_CONTAINER_NAME;
use k3d_core::Result;
use k3d_runtime::{ContainerFilter, ContainerRuntime};
use tracing::{debug, warn};

pub struct RegistryLocator<'a, R: ContainerRuntime + ?Sized> {
    runtime: &'a R,
}

impl<'a, R: ContainerRuntime + ?Sized> RegistryLocator<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        Self { runtime }
    }

    /// Name and label criteria identifying the registry.
    pub fn filter() -> ContainerFilter {
        let mut filter = ContainerFilter::by_name(REGISTRY_CONTAINER_NAME);
        filter.labels = registry_container_labels();
        filter
    }

    /// Id of the registry container, if one exists (running or not).
    pub fn find_registry(&self) -> Result<Option<String>> {
        let mut matches = self.runtime.list_containers(&Self::filter())?;

        if matches.len() > 1 {
            warn!(
                "Found {} containers matching the registry, using the first: {}",
                matches.len(),
                matches.join(", ")
            );
        }

        let found = if matches.is_empty() {
            None
        } else {
            Some(matches.swap_remove(0))
        };
        debug!("Registry lookup result: {:?}", found);
        Ok(found)
    }

    /// Hostname the registry was created with, read back from its labels.
    pub fn registry_hostname(&self, id: &str) -> Result<Option<String>> {
        let labels = self.runtime.container_labels(id)?;
        Ok(labels.get(HOSTNAME_LABEL).cloned())
    }
}
