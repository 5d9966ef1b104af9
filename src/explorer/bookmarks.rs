//! Bookmarked collection names, kept in a small local key-value store so they
//! survive between sessions.

use serde_json::{Map, Value as SerdeValue};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{error, warn};

/// Key the bookmark list is stored under.
pub const COLLECTIONS_STORAGE_KEY: &str = "firebase-manager-collections";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Corrupt local storage: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No local data directory is available on this platform")]
    NoDataDir,
}

/// String-to-string persistent storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Volatile store, for tests and one-off sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A JSON object file mapping keys to string values.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `<config dir>/firebase-console/local-storage.json`.
    pub fn default_location() -> Result<Self, StoreError> {
        let dir = dirs::config_dir().ok_or(StoreError::NoDataDir)?;
        Ok(Self::new(dir.join("firebase-console").join("local-storage.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn read_all(&self) -> Result<Map<String, SerdeValue>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(Map::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(self.io_err(e)),
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self
            .read_all()?
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut all = self.read_all()?;
        all.insert(key.to_string(), SerdeValue::String(value.to_string()));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&all)?).map_err(|e| self.io_err(e))
    }
}

/// Ordered list of distinct collection names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionBookmarks {
    names: Vec<String>,
}

impl CollectionBookmarks {
    /// Reads the stored list. Unreadable or malformed data yields an empty list.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let raw = match store.get(COLLECTIONS_STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Self::default(),
            Err(e) => {
                error!(error = %e, "failed to read saved collections");
                return Self::default();
            }
        };

        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(names) => {
                let mut bookmarks = Self::default();
                for name in names {
                    bookmarks.add(&name);
                }
                bookmarks
            }
            Err(e) => {
                error!(error = %e, "error parsing saved collections");
                Self::default()
            }
        }
    }

    /// Writes the list as a JSON array of strings.
    pub fn save(&self, store: &dyn KeyValueStore) -> Result<(), StoreError> {
        store.set(COLLECTIONS_STORAGE_KEY, &serde_json::to_string(&self.names)?)
    }

    /// Saves, logging instead of failing.
    pub(crate) fn persist(&self, store: &dyn KeyValueStore) {
        if let Err(e) = self.save(store) {
            warn!(error = %e, "failed to save collections");
        }
    }

    /// Appends `name` unless it is blank or already present. Returns whether
    /// the list changed.
    pub fn add(&mut self, name: &str) -> bool {
        if name.trim().is_empty() || self.contains(name) {
            return false;
        }
        self.names.push(name.to_string());
        true
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.names.len();
        self.names.retain(|n| n != name);
        self.names.len() != before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn first(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_distinct_and_ordered() {
        let mut bookmarks = CollectionBookmarks::default();
        assert!(bookmarks.add("users"));
        assert!(bookmarks.add("orders"));
        assert!(!bookmarks.add("users"));
        assert!(!bookmarks.add("  "));
        assert_eq!(bookmarks.names(), ["users", "orders"]);

        assert!(bookmarks.remove("users"));
        assert!(!bookmarks.remove("users"));
        assert_eq!(bookmarks.first(), Some("orders"));
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::default();
        let mut bookmarks = CollectionBookmarks::default();
        bookmarks.add("users");
        bookmarks.add("orders");
        bookmarks.save(&store).unwrap();

        assert_eq!(
            store.get(COLLECTIONS_STORAGE_KEY).unwrap().as_deref(),
            Some(r#"["users","orders"]"#)
        );
        assert_eq!(CollectionBookmarks::load(&store), bookmarks);
    }

    #[test]
    fn test_malformed_data_loads_empty() {
        let store = MemoryStore::default();
        store.set(COLLECTIONS_STORAGE_KEY, "{\"not\": \"a list\"}").unwrap();
        assert!(CollectionBookmarks::load(&store).is_empty());

        store.set(COLLECTIONS_STORAGE_KEY, r#"["a","a","b"]"#).unwrap();
        assert_eq!(CollectionBookmarks::load(&store).names(), ["a", "b"]);
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("local-storage.json");

        let store = FileStore::new(&path);
        assert_eq!(store.get(COLLECTIONS_STORAGE_KEY).unwrap(), None);
        store.set("other-key", "kept").unwrap();

        let mut bookmarks = CollectionBookmarks::default();
        bookmarks.add("users");
        bookmarks.save(&store).unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(CollectionBookmarks::load(&reopened).names(), ["users"]);
        assert_eq!(reopened.get("other-key").unwrap().as_deref(), Some("kept"));
    }
}
