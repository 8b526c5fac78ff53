// SPDX-License-Identifier: Apache-2.0

// NamespaceStorage gives one consumer its own slice of a shared
// StorageEngine. Every key handed to the engine is prefixed with
// "<namespace>." and every key handed back to the caller has that prefix
// stripped. Successful writes are re-published on a per-instance
// EventBus using the logical key.

use std::fmt::{self, Debug};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::errors::Result;
use crate::events::{EventBus, EventType, Listener, StorageEvent, Subscription};
use crate::storage::traits::{KeyValuePair, StorageEngine};

pub const DELIMITER: char = '.';

/// Immutable namespace identifier and the key rewriting that goes with it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    name: String,
    prefix: String,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let prefix = format!("{}{}", name, DELIMITER);
        Self { name, prefix }
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn physical_key(&self, logical: &str) -> String {
        format!("{}{}", self.prefix, logical)
    }

    /// True only for keys starting with the full `"<namespace>."`, so
    /// `foo` never claims keys written by `foobar`.
    pub fn contains(&self, physical: &str) -> bool {
        physical.starts_with(&self.prefix)
    }

    pub fn logical_key<'a>(&self, physical: &'a str) -> Option<&'a str> {
        physical.strip_prefix(self.prefix.as_str())
    }

    /// Like `logical_key`, but keys outside the namespace come back as-is.
    pub fn strip<'a>(&self, physical: &'a str) -> &'a str {
        self.logical_key(physical).unwrap_or(physical)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Namespaced view over a shared [`StorageEngine`].
///
/// ## Isolation
/// Any number of instances may share one engine through an `Arc`. Keys are
/// partitioned purely by prefix; the engine's own consistency guarantees
/// are all there is, nothing is locked at this layer.
///
/// ## Events
/// Each instance owns its event bus. Listeners registered here only hear
/// about writes made through this very instance, even if another instance
/// uses the same namespace string. Events fire strictly after the engine
/// acknowledged the write and never on failure.
///
/// ## Cost
/// `get_all_keys` and `clear` enumerate the whole engine and filter, so
/// they scale with the total number of keys, not with this namespace.
pub struct NamespaceStorage<S: StorageEngine + ?Sized> {
    namespace: Namespace,
    storage: Arc<S>,
    events: EventBus,
}

impl<S: StorageEngine + ?Sized> Debug for NamespaceStorage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespaceStorage")
            .field("namespace", &self.namespace)
            .field("events", &self.events)
            .finish()
    }
}

impl<S: StorageEngine + ?Sized> NamespaceStorage<S> {
    pub fn new(namespace: impl Into<String>, storage: Arc<S>) -> Self {
        Self {
            namespace: Namespace::new(namespace),
            storage,
            events: EventBus::new(),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    fn physical_pairs(&self, pairs: &[KeyValuePair]) -> Vec<KeyValuePair> {
        pairs
            .iter()
            .map(|(k, v)| (self.namespace.physical_key(k), v.clone()))
            .collect()
    }

    fn physical_keys(&self, keys: &[String]) -> Vec<String> {
        keys.iter().map(|k| self.namespace.physical_key(k)).collect()
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.storage
            .get(&self.namespace.physical_key(key))
            .await
            .map_err(|err| {
                error!("[{}] failed to get {}: {}", self.namespace, key, err);
                err
            })
    }

    pub async fn set(&self, key: &str, value: String) -> Result<()> {
        self.storage
            .set(&self.namespace.physical_key(key), value.clone())
            .await
            .map_err(|err| {
                error!("[{}] failed to store value for {}: {}", self.namespace, key, err);
                err
            })?;
        debug!("[{}] set {} length:{}", self.namespace, key, value.len());

        self.events.dispatch(&StorageEvent::Set {
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    pub async fn merge(&self, key: &str, value: String) -> Result<()> {
        self.storage
            .merge(&self.namespace.physical_key(key), value.clone())
            .await
            .map_err(|err| {
                error!("[{}] failed to merge value for {}: {}", self.namespace, key, err);
                err
            })?;
        debug!("[{}] merged {} length:{}", self.namespace, key, value.len());

        self.events.dispatch(&StorageEvent::Merge {
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.storage
            .remove(&self.namespace.physical_key(key))
            .await
            .map_err(|err| {
                error!("[{}] failed to remove {}: {}", self.namespace, key, err);
                err
            })?;
        debug!("[{}] removed {}", self.namespace, key);

        self.events.dispatch(&StorageEvent::Remove {
            key: key.to_string(),
        });
        Ok(())
    }

    pub async fn get_all_keys(&self) -> Result<Vec<String>> {
        let keys = self.storage.get_all_keys().await.map_err(|err| {
            error!("[{}] failed to list keys: {}", self.namespace, err);
            err
        })?;
        Ok(keys
            .iter()
            .filter_map(|k| self.namespace.logical_key(k))
            .map(str::to_string)
            .collect())
    }

    pub async fn multi_get(&self, keys: &[String]) -> Result<Vec<(String, Option<String>)>> {
        let pairs = self
            .storage
            .multi_get(&self.physical_keys(keys))
            .await
            .map_err(|err| {
                error!("[{}] failed to get {} keys: {}", self.namespace, keys.len(), err);
                err
            })?;
        Ok(pairs
            .into_iter()
            .map(|(k, v)| (self.namespace.strip(&k).to_string(), v))
            .collect())
    }

    pub async fn multi_set(&self, pairs: &[KeyValuePair]) -> Result<()> {
        self.storage
            .multi_set(&self.physical_pairs(pairs))
            .await
            .map_err(|err| {
                error!("[{}] failed to store {} values: {}", self.namespace, pairs.len(), err);
                err
            })?;
        debug!("[{}] set {} keys", self.namespace, pairs.len());

        for (key, value) in pairs {
            self.events.dispatch(&StorageEvent::Set {
                key: key.clone(),
                value: value.clone(),
            });
        }
        Ok(())
    }

    pub async fn multi_merge(&self, pairs: &[KeyValuePair]) -> Result<()> {
        self.storage
            .multi_merge(&self.physical_pairs(pairs))
            .await
            .map_err(|err| {
                error!("[{}] failed to merge {} values: {}", self.namespace, pairs.len(), err);
                err
            })?;
        debug!("[{}] merged {} keys", self.namespace, pairs.len());

        for (key, value) in pairs {
            self.events.dispatch(&StorageEvent::Merge {
                key: key.clone(),
                value: value.clone(),
            });
        }
        Ok(())
    }

    pub async fn multi_remove(&self, keys: &[String]) -> Result<()> {
        self.storage
            .multi_remove(&self.physical_keys(keys))
            .await
            .map_err(|err| {
                error!("[{}] failed to remove {} keys: {}", self.namespace, keys.len(), err);
                err
            })?;
        debug!("[{}] removed {} keys", self.namespace, keys.len());

        for key in keys {
            self.events.dispatch(&StorageEvent::Remove { key: key.clone() });
        }
        Ok(())
    }

    /// Removes every key of this namespace and nothing else, then emits a
    /// single `clear` event.
    ///
    /// Failures while listing or removing are returned as `Err` and no
    /// event is emitted; keys already removed by the engine before the
    /// failure stay removed.
    pub async fn clear(&self) -> Result<()> {
        let keys = self.get_all_keys().await?;
        self.storage
            .multi_remove(&self.physical_keys(&keys))
            .await
            .map_err(|err| {
                error!("[{}] failed to clear: {}", self.namespace, err);
                err
            })?;
        debug!("[{}] cleared {} keys", self.namespace, keys.len());

        self.events.dispatch(&StorageEvent::Clear);
        Ok(())
    }

    pub fn flush_get_requests(&self) {
        self.storage.flush_get_requests()
    }

    /// Single-key view, handy when a component only ever touches one key.
    pub fn bind_key(&self, key: impl Into<String>) -> KeyHandle<'_, S> {
        KeyHandle {
            storage: self,
            key: key.into(),
        }
    }

    pub fn add_listener(&self, event_type: EventType, listener: impl Into<Listener>) -> Subscription {
        self.events.add_listener(event_type, listener)
    }

    pub fn remove_listener(&self, event_type: EventType, listener: &Listener) {
        self.events.remove_listener(event_type, listener)
    }

    pub fn subscribe(
        &self,
        event_type: EventType,
    ) -> (Subscription, mpsc::UnboundedReceiver<StorageEvent>) {
        self.events.subscribe(event_type)
    }

    pub fn listener_count(&self, event_type: EventType) -> usize {
        self.events.listener_count(event_type)
    }
}

/// [`NamespaceStorage`] operations pre-bound to one logical key.
pub struct KeyHandle<'a, S: StorageEngine + ?Sized> {
    storage: &'a NamespaceStorage<S>,
    key: String,
}

impl<S: StorageEngine + ?Sized> Debug for KeyHandle<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyHandle({}{})", self.storage.namespace.prefix(), self.key)
    }
}

impl<S: StorageEngine + ?Sized> KeyHandle<'_, S> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn get(&self) -> Result<Option<String>> {
        self.storage.get(&self.key).await
    }

    pub async fn set(&self, value: String) -> Result<()> {
        self.storage.set(&self.key, value).await
    }

    pub async fn merge(&self, value: String) -> Result<()> {
        self.storage.merge(&self.key, value).await
    }

    pub async fn remove(&self) -> Result<()> {
        self.storage.remove(&self.key).await
    }
}
