use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Key/value session storage the role sub-applications read their
/// credentials from. Writes report whether the stored value changed.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<bool, StorageError>;
    fn remove(&self, key: &str) -> Result<bool, StorageError>;
    fn entries(&self) -> BTreeMap<String, String>;
}

fn lock_entries(entries: &Mutex<BTreeMap<String, String>>) -> MutexGuard<'_, BTreeMap<String, String>> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        lock_entries(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<bool, StorageError> {
        let mut entries = lock_entries(&self.entries);
        if entries.get(key).map(String::as_str) == Some(value) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        Ok(lock_entries(&self.entries).remove(key).is_some())
    }

    fn entries(&self) -> BTreeMap<String, String> {
        lock_entries(&self.entries).clone()
    }
}

/// JSON document on disk, rewritten only when a value actually changes.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, raw)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600));
        }
        Ok(())
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        lock_entries(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<bool, StorageError> {
        let mut entries = lock_entries(&self.entries);
        if entries.get(key).map(String::as_str) == Some(value) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)?;
        Ok(true)
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let mut entries = lock_entries(&self.entries);
        if entries.remove(key).is_none() {
            return Ok(false);
        }
        self.save(&entries)?;
        Ok(true)
    }

    fn entries(&self) -> BTreeMap<String, String> {
        lock_entries(&self.entries).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_reports_changes_only() {
        let storage = MemoryStorage::new();
        assert!(storage.set("fg_staff_access_token", "tok").unwrap());
        assert!(!storage.set("fg_staff_access_token", "tok").unwrap());
        assert!(storage.set("fg_staff_access_token", "tok-2").unwrap());
        assert!(storage.remove("fg_staff_access_token").unwrap());
        assert!(!storage.remove("fg_staff_access_token").unwrap());
    }

    #[test]
    fn file_storage_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let storage = FileStorage::open(&path).unwrap();
        assert!(storage.set("fg_admin_outlet_id", "outlet-1").unwrap());
        assert!(path.exists());

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(
            reopened.get("fg_admin_outlet_id").as_deref(),
            Some("outlet-1")
        );
    }

    #[test]
    fn file_storage_skips_unchanged_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let storage = FileStorage::open(&path).unwrap();
        storage.set("k", "v").unwrap();

        std::fs::remove_file(&path).unwrap();
        assert!(!storage.set("k", "v").unwrap());
        assert!(!path.exists());
    }
}
