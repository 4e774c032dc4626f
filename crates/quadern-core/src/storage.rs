//! Key-value storage backends.
//!
//! The store persists one JSON document under one key, the contract of a
//! browser's `localStorage`. Backends only move strings around.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Errors from a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: usize, available: usize },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] io::Error),
}

/// String values under string keys.
pub trait KeyValueStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a missing key is not an error.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

impl<T: KeyValueStorage + ?Sized> KeyValueStorage for &T {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove_item(key)
    }
}

impl<T: KeyValueStorage + ?Sized> KeyValueStorage for Arc<T> {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove_item(key)
    }
}

/// In-memory storage with an optional size limit.
///
/// The limit counts key and value bytes of everything stored, like the
/// per-origin quota of a browser.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(bytes: usize) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            quota: Some(bytes),
        }
    }

    /// Bytes currently used by keys and values.
    pub fn used_bytes(&self) -> usize {
        self.items
            .lock()
            .map(|items| items.iter().map(|(k, v)| k.len() + v.len()).sum())
            .unwrap_or(0)
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let items = self
            .items
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self
            .items
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        if let Some(quota) = self.quota {
            let others: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = key.len() + value.len();
            let available = quota.saturating_sub(others);
            if needed > available {
                return Err(StorageError::QuotaExceeded { needed, available });
            }
        }

        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?
            .remove(key);
        Ok(())
    }
}

/// One file per key inside a directory.
///
/// Writes go to a temporary file that is renamed over the target, so a
/// crash never leaves a half-written notebook behind.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Use `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `key`. Characters outside `[A-Za-z0-9._-]` are %-escaped.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len() + 5);
        for byte in key.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' => name.push(byte as char),
                b'.' if !name.is_empty() => name.push('.'),
                _ => name.push_str(&format!("%{:02X}", byte)),
            }
        }
        self.dir.join(format!("{}.json", name))
    }
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let written = fs::File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(value.as_bytes())?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&tmp, &path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(all(target_arch = "wasm32", feature = "wasm"))]
pub use browser::BrowserStorage;

#[cfg(all(target_arch = "wasm32", feature = "wasm"))]
mod browser {
    use super::{KeyValueStorage, StorageError};

    /// The page's `window.localStorage`.
    ///
    /// Looked up on every call; the handle is not `Send` and the browser
    /// caches it anyway.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct BrowserStorage;

    impl BrowserStorage {
        fn local_storage() -> Result<web_sys::Storage, StorageError> {
            let window = web_sys::window()
                .ok_or_else(|| StorageError::Unavailable("no window".to_string()))?;
            window
                .local_storage()
                .map_err(|e| StorageError::Unavailable(format!("{:?}", e)))?
                .ok_or_else(|| StorageError::Unavailable("localStorage disabled".to_string()))
        }
    }

    impl KeyValueStorage for BrowserStorage {
        fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
            Self::local_storage()?
                .get_item(key)
                .map_err(|e| StorageError::Unavailable(format!("{:?}", e)))
        }

        fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
            Self::local_storage()?
                .set_item(key, value)
                .map_err(|e| StorageError::Unavailable(format!("{:?}", e)))
        }

        fn remove_item(&self, key: &str) -> Result<(), StorageError> {
            Self::local_storage()?
                .remove_item(key)
                .map_err(|e| StorageError::Unavailable(format!("{:?}", e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_round_trip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get_item("k").unwrap(), None);
        storage.set_item("k", "v").unwrap();
        assert_eq!(storage.get_item("k").unwrap(), Some("v".to_string()));
        storage.remove_item("k").unwrap();
        storage.remove_item("k").unwrap();
        assert_eq!(storage.get_item("k").unwrap(), None);
    }

    #[test]
    fn quota_rejects_and_keeps_old_value() {
        let storage = MemoryStorage::with_quota(10);
        storage.set_item("k", "12345").unwrap();
        let err = storage.set_item("k", "1234567890").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { needed: 11, available: 10 }));
        assert_eq!(storage.get_item("k").unwrap(), Some("12345".to_string()));
        assert_eq!(storage.used_bytes(), 6);
    }

    #[test]
    fn quota_counts_other_keys() {
        let storage = MemoryStorage::with_quota(10);
        storage.set_item("a", "1234").unwrap();
        assert!(storage.set_item("b", "12345").is_err());
        assert!(storage.set_item("b", "1234").is_ok());
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("nested")).unwrap();
        assert_eq!(storage.get_item("quadern-v1").unwrap(), None);
        storage.set_item("quadern-v1", "{}").unwrap();
        storage.set_item("quadern-v1", "{\"a\":1}").unwrap();
        assert_eq!(storage.get_item("quadern-v1").unwrap(), Some("{\"a\":1}".to_string()));
        storage.remove_item("quadern-v1").unwrap();
        storage.remove_item("quadern-v1").unwrap();
        assert_eq!(storage.get_item("quadern-v1").unwrap(), None);
    }

    #[test]
    fn failed_file_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        let target = storage.path_for("quadern-v1");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("occupied"), "x").unwrap();

        assert!(matches!(storage.set_item("quadern-v1", "{}"), Err(StorageError::Io(_))));
        assert!(!target.with_extension("json.tmp").exists());
        assert!(target.join("occupied").exists());
    }

    #[test]
    fn file_names_are_escaped() {
        let storage = FileStorage { dir: PathBuf::from("/data") };
        assert_eq!(storage.path_for("notes-v1"), PathBuf::from("/data/notes-v1.json"));
        assert_eq!(storage.path_for("a/b:c"), PathBuf::from("/data/a%2Fb%3Ac.json"));
        assert_eq!(storage.path_for("..x"), PathBuf::from("/data/%2E.x.json"));
    }
}
