use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store file {path} could not be accessed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store file {path} does not hold a JSON object: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("store values could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Whole-value key/value storage. `get` on a missing key is `Ok(None)`.
#[async_trait(?Send)]
pub trait KeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    async fn flush(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, Value>>,
}

#[async_trait(?Send)]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.values.lock().insert(key.to_owned(), value);
        Ok(())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// One JSON object on disk, rewritten through a temp file and rename on
/// every `set`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let values = match fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str::<BTreeMap<String, Value>>(&raw).map_err(|source| {
                StoreError::Corrupt {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(error) if error.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        debug!(path = %path.display(), keys = values.len(), "opened store file");

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_out(&self) -> Result<(), StoreError> {
        let document: Map<String, Value> = self
            .values
            .lock()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let encoded = serde_json::to_vec_pretty(&Value::Object(document))?;

        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, encoded)
            .await
            .map_err(|source| StoreError::Io {
                path: staging.clone(),
                source,
            })?;
        fs::rename(&staging, &self.path)
            .await
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

#[async_trait(?Send)]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.values.lock().insert(key.to_owned(), value);
        self.write_out().await
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.write_out().await
    }
}

/// Opens the file store, falling back to memory so the shell keeps running
/// without persistence.
pub async fn open_store(path: &Path) -> Box<dyn KeyValueStore> {
    match JsonFileStore::open(path).await {
        Ok(store) => Box::new(store),
        Err(error) => {
            warn!(%error, "falling back to in-memory store");
            Box::new(MemoryStore::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{open_store, JsonFileStore, KeyValueStore, MemoryStore, StoreError};

    #[tokio::test]
    async fn memory_store_returns_none_for_missing_keys() {
        let store = MemoryStore::default();
        assert_eq!(store.get("tabs").await.expect("get"), None);
        store.set("tabs", json!([])).await.expect("set");
        assert_eq!(store.get("tabs").await.expect("get"), Some(json!([])));
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("lantern-data.json");

        let store = JsonFileStore::open(&path).await.expect("open new store");
        store
            .set("searchEngine", json!("3"))
            .await
            .expect("set should write through");
        store
            .set("activeTabId", json!(null))
            .await
            .expect("null is a value");
        drop(store);

        let reopened = JsonFileStore::open(&path).await.expect("reopen store");
        assert_eq!(
            reopened.get("searchEngine").await.expect("get"),
            Some(json!("3"))
        );
        assert_eq!(
            reopened.get("activeTabId").await.expect("get"),
            Some(json!(null))
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "[1, 2").expect("seed corrupt file");

        let result = JsonFileStore::open(&path).await;
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn unreadable_location_falls_back_to_memory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").expect("seed blocker");

        let store = open_store(&blocker.join("lantern-data.json")).await;
        store.set("tabs", json!([1])).await.expect("memory set");
        assert_eq!(store.get("tabs").await.expect("get"), Some(json!([1])));
    }
}
