//! Key-value persistence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::write_atomic;
use crate::error::{Result, VoxError};

/// String key-value persistence used for conversations, history and the
/// widget cache. Values are JSON documents.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    fn list_keys(&self) -> Result<Vec<String>>;
}

/// Read and deserialize a JSON value; a corrupt value reads as absent
pub fn get_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!("Ignoring unreadable value under '{}': {}", key, e);
            Ok(None)
        }
    }
}

pub fn set_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value).map_err(|e| VoxError::Storage(e.to_string()))?;
    store.set(key, &raw)
}

/// Volatile store
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.values().remove(key);
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.values().keys().cloned().collect())
    }
}

/// Store persisted as a single JSON object on disk.
///
/// The whole map is kept in memory and rewritten on every mutation with an
/// atomic replace, which is plenty for a few hundred history entries.
pub struct FileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    pub const FILE_NAME: &'static str = "store.json";

    /// Open (or create) the store file inside `data_dir`
    pub fn open(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(Self::FILE_NAME);
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                VoxError::Storage(format!("Failed to read {}: {}", path.display(), e))
            })?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    VoxError::Storage(format!("Failed to parse {}: {}", path.display(), e))
                })?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!("Opened store {} ({} keys)", path.display(), values.len());
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn values(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let content =
            serde_json::to_vec_pretty(values).map_err(|e| VoxError::Storage(e.to_string()))?;
        write_atomic(&self.path, &content).map_err(|e| VoxError::Storage(format!("{:#}", e)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values();
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut values = self.values();
        if values.remove(key).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.values().keys().cloned().collect())
    }
}
