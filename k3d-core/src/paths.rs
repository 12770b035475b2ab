//! Well-known host paths used by the registry tooling.

use crate::error::{K3dError, Result};
use std::path::{Path, PathBuf};

/// Name of the per-user state directory under `$HOME`.
pub const STATE_DIR_NAME: &str = ".k3d";

/// Get the user's home directory.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .ok_or_else(|| K3dError::Config("Could not determine home directory".to_string()))
}

/// Get the k3d state directory (`~/.k3d`).
#[must_use = "state directory path should be used"]
pub fn state_dir() -> Result<PathBuf> {
    Ok(home_dir()?.join(STATE_DIR_NAME))
}

/// Get the global registries template (`~/.k3d/registries.yaml`).
///
/// Higher-level setup uses this as the base mirror document shared by every
/// cluster node when no explicit base file is given.
#[must_use = "registries path should be used"]
pub fn global_registries_path() -> Result<PathBuf> {
    Ok(state_dir()?.join("registries.yaml"))
}

/// Get the lock file serialising registry lifecycle operations on this host.
#[must_use = "lock path should be used"]
pub fn registry_lock_path() -> Result<PathBuf> {
    Ok(state_dir()?.join("registry.lock"))
}

/// Return `path` only if it points at an existing regular file.
pub fn existing_file(path: &Path) -> Option<PathBuf> {
    path.is_file().then(|| path.to_path_buf())
}
