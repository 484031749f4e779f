// Single-writer lock next to the registry file

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::StoreError;

/// Held for the lifetime of a mutating command. The lock file is created
/// with create-new semantics and removed on drop.
#[derive(Debug)]
pub struct RegistryLock {
    path: PathBuf,
}

impl RegistryLock {
    /// `<registry>.lock`
    pub fn path_for(registry: &Path) -> PathBuf {
        let mut name = registry.as_os_str().to_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    pub fn acquire(registry: &Path) -> Result<Self, StoreError> {
        let path = Self::path_for(registry);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::Locked { path });
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        // Holder pid, for whoever has to clear a stale lock by hand.
        writeln!(file, "{}", std::process::id()).map_err(|e| StoreError::io(&path, e))?;
        debug!("acquired {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("failed to remove lock {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_fails_until_released() {
        let dir = tempdir().unwrap();
        let registry = dir.path().join("companies.xlsx");

        let lock = RegistryLock::acquire(&registry).unwrap();
        assert_eq!(lock.path(), dir.path().join("companies.xlsx.lock"));
        assert!(lock.path().exists());

        let err = RegistryLock::acquire(&registry).unwrap_err();
        assert!(matches!(err, StoreError::Locked { .. }));

        drop(lock);
        assert!(!dir.path().join("companies.xlsx.lock").exists());
        let _again = RegistryLock::acquire(&registry).unwrap();
    }
}
