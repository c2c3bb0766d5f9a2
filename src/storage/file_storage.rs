use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::{debug, error, warn};
use tempfile::NamedTempFile;

use crate::error_handling::types::StorageError;
use crate::session_management::session::Session;
use crate::storage::storage_trait::RegistryStore;

/// JSON file holding the session registry.
///
/// Every save goes to a temporary file in the same directory which is then
/// renamed over the registry, so the previous content survives a crash mid-write.
pub struct FileRegistryStore {
    path: PathBuf,
}

impl FileRegistryStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }
}

impl RegistryStore for FileRegistryStore {
    fn load(&self) -> Result<BTreeMap<String, Session>, StorageError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No registry at {}, starting empty", self.path.display());
                return Ok(BTreeMap::new());
            }
            Err(e) => {
                error!("Failed to read registry {}: {}", self.path.display(), e);
                return Err(StorageError::ReadFailed(format!("{}: {}", self.path.display(), e)));
            }
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        let stored: BTreeMap<String, Session> = serde_json::from_str(&content).map_err(|e| {
            error!("Registry {} is not valid JSON: {}", self.path.display(), e);
            StorageError::Corrupt(format!("{}: {}", self.path.display(), e))
        })?;

        // Re-key on the record itself so a hand-edited key can't break uniqueness.
        let mut sessions = BTreeMap::new();
        for (key, session) in stored {
            if key != session.real_address {
                warn!(
                    "Registry key {} does not match real address {}, using the latter",
                    key, session.real_address
                );
            }
            sessions.insert(session.real_address.clone(), session);
        }

        debug!("Loaded {} session(s) from {}", sessions.len(), self.path.display());
        Ok(sessions)
    }

    fn save(&self, sessions: &BTreeMap<String, Session>) -> Result<(), StorageError> {
        let write_failed = |e: &dyn std::fmt::Display| {
            error!("Failed to write registry {}: {}", self.path.display(), e);
            StorageError::WriteFailed(format!("{}: {}", self.path.display(), e))
        };

        let mut tmp = NamedTempFile::new_in(self.dir()).map_err(|e| write_failed(&e))?;
        serde_json::to_writer_pretty(&mut tmp, sessions).map_err(|e| write_failed(&e))?;
        tmp.write_all(b"\n").map_err(|e| write_failed(&e))?;
        tmp.as_file().sync_all().map_err(|e| write_failed(&e))?;
        tmp.persist(&self.path).map_err(|e| write_failed(&e.error))?;

        debug!("Saved {} session(s) to {}", sessions.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry_of(sessions: &[Session]) -> BTreeMap<String, Session> {
        sessions
            .iter()
            .map(|s| (s.real_address.clone(), s.clone()))
            .collect()
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileRegistryStore::new(dir.path().join("sessions.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = FileRegistryStore::new(dir.path().join("sessions.json"));
        let alice = Session::new("203.0.113.5", "10.8.0.2", "alice");
        let bob = Session::new("198.51.100.7", "10.8.0.3", "bob");

        store.save(&registry_of(&[alice.clone(), bob.clone()])).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["203.0.113.5"], alice);
        assert_eq!(loaded["198.51.100.7"], bob);
    }

    #[test]
    fn test_file_is_keyed_by_real_address() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");
        let store = FileRegistryStore::new(&path);
        let alice = Session::new("203.0.113.5", "10.8.0.2", "alice");
        store.save(&registry_of(&[alice.clone()])).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let entry = &raw["203.0.113.5"];
        assert_eq!(entry["session_id"], alice.session_id.to_string());
        assert_eq!(entry["virtual_address"], "10.8.0.2");
        assert_eq!(entry["real_address"], "203.0.113.5");
        assert_eq!(entry["common_name"], "alice");
    }

    #[test]
    fn test_interrupted_write_keeps_previous_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");
        let store = FileRegistryStore::new(&path);
        let alice = Session::new("203.0.113.5", "10.8.0.2", "alice");
        store.save(&registry_of(&[alice.clone()])).unwrap();

        // A writer that died before the rename leaves a half-written temp file behind.
        let mut partial = NamedTempFile::new_in(dir.path()).unwrap();
        partial.write_all(b"{\"198.51.100.7\": {\"session_id\": \"").unwrap();
        let (_file, _leftover) = partial.keep().unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["203.0.113.5"], alice);
    }

    #[test]
    fn test_failed_save_keeps_previous_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");
        let store = FileRegistryStore::new(&path);
        let alice = Session::new("203.0.113.5", "10.8.0.2", "alice");
        store.save(&registry_of(&[alice.clone()])).unwrap();

        // Same file, but seen through a directory that no longer exists.
        let broken = FileRegistryStore::new(dir.path().join("gone").join("sessions.json"));
        let bob = Session::new("198.51.100.7", "10.8.0.3", "bob");
        assert!(broken.save(&registry_of(&[bob])).is_err());

        assert_eq!(store.load().unwrap()["203.0.113.5"], alice);
    }

    #[test]
    fn test_corrupt_registry_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = FileRegistryStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StorageError::Corrupt(_)));
    }
}
