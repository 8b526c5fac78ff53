// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::traits::{KeyValuePair, StorageEngine};
use crate::errors::{Result, StorageError};

/// Process-local engine. Nothing survives a restart; every namespace
/// sharing one `Arc<MemoryStorage>` sees the same map.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    storage: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.storage.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.storage.lock().await.is_empty()
    }
}

// Shallow JSON object merge: top-level entries of `patch` replace the
// ones in `current`.
fn merge_values(key: &str, current: Option<&str>, patch: &str) -> Result<String> {
    let patch = match serde_json::from_str::<Value>(patch)? {
        Value::Object(map) => map,
        _ => {
            return Err(StorageError::Backend(format!(
                "merge value for '{}' is not a JSON object",
                key
            )))
        }
    };

    let mut base = match current {
        None => Map::new(),
        Some(raw) => match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => map,
            _ => {
                return Err(StorageError::Backend(format!(
                    "stored value for '{}' is not a JSON object",
                    key
                )))
            }
        },
    };

    for (k, v) in patch {
        base.insert(k, v);
    }
    Ok(Value::Object(base).to_string())
}

#[async_trait]
impl StorageEngine for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.storage.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.storage.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn merge(&self, key: &str, value: String) -> Result<()> {
        let mut storage = self.storage.lock().await;
        let merged = merge_values(key, storage.get(key).map(String::as_str), &value)?;
        storage.insert(key.to_string(), merged);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.storage.lock().await.remove(key);
        Ok(())
    }

    async fn get_all_keys(&self) -> Result<Vec<String>> {
        Ok(self.storage.lock().await.keys().cloned().collect())
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<(String, Option<String>)>> {
        let storage = self.storage.lock().await;
        Ok(keys
            .iter()
            .map(|k| (k.clone(), storage.get(k).cloned()))
            .collect())
    }

    async fn multi_set(&self, pairs: &[KeyValuePair]) -> Result<()> {
        let mut storage = self.storage.lock().await;
        for (key, value) in pairs {
            storage.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn multi_merge(&self, pairs: &[KeyValuePair]) -> Result<()> {
        let mut storage = self.storage.lock().await;

        // stage everything first so a bad item leaves the map untouched
        let mut staged: HashMap<String, String> = HashMap::new();
        for (key, patch) in pairs {
            let current = staged
                .get(key)
                .or_else(|| storage.get(key))
                .map(String::as_str);
            let merged = merge_values(key, current, patch)?;
            staged.insert(key.clone(), merged);
        }

        storage.extend(staged);
        Ok(())
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<()> {
        let mut storage = self.storage.lock().await;
        for key in keys {
            storage.remove(key);
        }
        Ok(())
    }
}
