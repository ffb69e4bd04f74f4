//! Key-value persistence backing the profile page state.
//!
//! Values are opaque strings under short logical keys, mirroring the local
//! storage area a page writes to. Writers treat every failure here as
//! non-fatal; see [`crate::call_log::CallLog::append`].

use crate::error::StorageError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Key holding the "last updated" display stamp
pub const LAST_UPDATED_KEY: &str = "lastUpdatedTimestamp";
/// Key holding the JSON-encoded call log
pub const CALL_LOG_KEY: &str = "callLog";
/// Key holding the persisted profile photo
pub const PROFILE_PHOTO_KEY: &str = "profilePhoto";

/// Durable string store addressed by logical key
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// File-backed store keeping one file per key inside a directory
pub struct FileStore {
    root: PathBuf,
    quota_bytes: u64,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    /// A `quota_bytes` of 0 disables the quota.
    pub fn open<P: AsRef<Path>>(root: P, quota_bytes: u64) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| StorageError::Unavailable {
                details: format!("Failed to create storage directory {}: {}", root.display(), e),
            })?;
            info!("Created storage directory: {}", root.display());
        }

        Ok(Self {
            root,
            quota_bytes,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(self.root.join(format!("{}.json", key)))
    }

    /// Bytes currently used by every key except `excluding`
    fn used_bytes(&self, excluding: &Path) -> Result<u64, StorageError> {
        let entries = fs::read_dir(&self.root).map_err(|e| StorageError::Unavailable {
            details: format!("Failed to read storage directory: {}", e),
        })?;

        let mut total = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path == excluding || path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            if let Ok(metadata) = entry.metadata() {
                total += metadata.len();
            }
        }
        Ok(total)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.key_path(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io {
                key: key.to_string(),
                source: e,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.key_path(key)?;
        let _guard = self.write_lock.lock();

        if self.quota_bytes > 0 {
            let used = self.used_bytes(&path)?;
            let available = self.quota_bytes.saturating_sub(used);
            let requested = value.len() as u64;
            if requested > available {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    requested,
                    available,
                });
            }
        }

        // Write to a sibling temp file and rename so readers never see a torn value
        let tmp_path = path.with_extension("json.tmp");
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };
        let mut file = fs::File::create(&tmp_path).map_err(io_err)?;
        file.write_all(value.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        fs::rename(&tmp_path, &path).map_err(io_err)?;

        debug!("Persisted {} bytes under '{}'", value.len(), key);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.key_path(key)?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed '{}'", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io {
                key: key.to_string(),
                source: e,
            }),
        }
    }
}

/// In-memory store, used for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    quota_bytes: Option<u64>,
    unavailable: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes once `quota_bytes` would be exceeded
    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::default()
        }
    }

    /// Simulate the backing store going away (or coming back)
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock() = unavailable;
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if *self.unavailable.lock() {
            return Err(StorageError::Unavailable {
                details: "memory store disabled".to_string(),
            });
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check_available()?;
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_available()?;
        let mut values = self.values.lock();

        if let Some(quota) = self.quota_bytes {
            let used: u64 = values
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len() as u64)
                .sum();
            let available = quota.saturating_sub(used);
            let requested = value.len() as u64;
            if requested > available {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    requested,
                    available,
                });
            }
        }

        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check_available()?;
        self.values.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("data"), 0).unwrap();

        assert!(store.get(CALL_LOG_KEY).unwrap().is_none());

        store.set(CALL_LOG_KEY, "[]").unwrap();
        assert_eq!(store.get(CALL_LOG_KEY).unwrap().as_deref(), Some("[]"));

        store.remove(CALL_LOG_KEY).unwrap();
        assert!(store.get(CALL_LOG_KEY).unwrap().is_none());

        // Removing an absent key is fine
        store.remove(CALL_LOG_KEY).unwrap();
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path(), 0).unwrap();
            store.set(LAST_UPDATED_KEY, "October 19, 2026").unwrap();
        }

        let reopened = FileStore::open(dir.path(), 0).unwrap();
        assert_eq!(
            reopened.get(LAST_UPDATED_KEY).unwrap().as_deref(),
            Some("October 19, 2026")
        );
    }

    #[test]
    fn test_file_store_quota() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), 16).unwrap();

        store.set(CALL_LOG_KEY, "0123456789").unwrap();
        let err = store.set(PROFILE_PHOTO_KEY, "0123456789").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { available: 6, .. }));

        // Overwriting a key does not count its previous value
        store.set(CALL_LOG_KEY, "0123456789abcdef").unwrap();
    }

    #[test]
    fn test_file_store_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), 0).unwrap();

        assert!(matches!(
            store.set("../escape", "x"),
            Err(StorageError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_memory_store_unavailable() {
        let store = MemoryStore::new();
        store.set(CALL_LOG_KEY, "[]").unwrap();

        store.set_unavailable(true);
        assert!(store.get(CALL_LOG_KEY).is_err());
        assert!(store.set(CALL_LOG_KEY, "[1]").is_err());

        store.set_unavailable(false);
        assert_eq!(store.get(CALL_LOG_KEY).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_memory_store_quota() {
        let store = MemoryStore::with_quota(4);
        store.set("a", "1234").unwrap();
        assert!(matches!(
            store.set("b", "1"),
            Err(StorageError::QuotaExceeded { .. })
        ));
    }
}
