// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use crate::errors::Result;

/// (key, value) as exchanged with callers and with the engine.
pub type KeyValuePair = (String, String);

/// Contract every shared backing store has to fulfil.
///
/// Engines know nothing about namespaces: keys and values are raw strings
/// and each call is a single unit of work. Batched calls are expected to
/// be atomic per call, but that is up to the implementation.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
    /// Merge `value` into whatever is stored under `key`. What "merge"
    /// means is defined by the engine.
    async fn merge(&self, key: &str, value: String) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    // every key in the store, whoever wrote it
    async fn get_all_keys(&self) -> Result<Vec<String>>;
    /// Returns one pair per requested key, in request order.
    async fn multi_get(&self, keys: &[String]) -> Result<Vec<(String, Option<String>)>>;
    async fn multi_set(&self, pairs: &[KeyValuePair]) -> Result<()>;
    async fn multi_merge(&self, pairs: &[KeyValuePair]) -> Result<()>;
    async fn multi_remove(&self, keys: &[String]) -> Result<()>;

    /// Hint for engines that batch reads. Default does nothing.
    fn flush_get_requests(&self) {}
}
