//! Host-wide advisory lock serializing registry lifecycle operations.
//!
//! Two invocations racing through lookup-then-create (or detach-then-remove)
//! would otherwise both act on a stale view of the registry.

use fs2::FileExt;
use k3d_core::{K3dError, Result};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive lock held for as long as the value lives.
#[derive(Debug)]
pub struct HostLock {
    file: File,
    path: PathBuf,
}

impl HostLock {
    fn open(path: &Path) -> Result<File> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                K3dError::Lock(format!(
                    "Failed to create lock directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| {
                K3dError::Lock(format!("Failed to open lock {}: {}", path.display(), e))
            })
    }

    /// Block until the lock at `path` is ours.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = Self::open(path)?;
        debug!("Waiting for registry lock {}", path.display());
        file.lock_exclusive().map_err(|e| {
            K3dError::Lock(format!(
                "Failed to acquire lock {}: {}",
                path.display(),
                e
            ))
        })?;
        debug!("Acquired registry lock {}", path.display());

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Take the lock only if nobody else holds it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let file = Self::open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(K3dError::Lock(format!(
                "Failed to acquire lock {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for HostLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            debug!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}
