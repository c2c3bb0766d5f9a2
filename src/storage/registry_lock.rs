use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use log::debug;
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

use crate::error_handling::types::StorageError;

/// Exclusive ownership of a registry file, held through `flock` on `<registry>.lock`.
///
/// The running monitor keeps its registry in memory and rewrites the file every
/// tick, so any other writer has to be turned away while it runs. The lock is
/// released when this value is dropped, or by the kernel if the process dies.
pub struct RegistryLock {
    path: PathBuf,
    _lock: Flock<File>,
}

impl RegistryLock {
    pub fn acquire(registry: &Path) -> Result<Self, StorageError> {
        let path = lock_path(registry);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| StorageError::WriteFailed(format!("{}: {}", path.display(), e)))?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => {
                debug!("Acquired registry lock {}", path.display());
                Ok(Self { path, _lock: lock })
            }
            Err((_, Errno::EWOULDBLOCK)) => Err(StorageError::Locked(format!(
                "{} is held by a running monitor",
                path.display()
            ))),
            Err((_, e)) => Err(StorageError::WriteFailed(format!(
                "{}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock_path(registry: &Path) -> PathBuf {
    let mut name = registry.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}
