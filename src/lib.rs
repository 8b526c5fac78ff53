// SPDX-License-Identifier: Apache-2.0

//! Namespaced views over a shared async key-value store.
//!
//! Several independent stores can live in one [`StorageEngine`]: each
//! [`NamespaceStorage`] prefixes its keys with `"<namespace>."` and hides
//! that prefix from its callers. Writes made through an instance are
//! announced on that instance's own [`EventBus`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use nsstore::{EventType, MemoryStorage, NamespaceStorage, StorageEvent};
//!
//! # async fn demo() -> nsstore::Result<()> {
//! let engine = Arc::new(MemoryStorage::new());
//! let cache = NamespaceStorage::new("cache", Arc::clone(&engine));
//!
//! let sub = cache.add_listener(EventType::Set, |e: &StorageEvent| {
//!     println!("{:?}", e);
//! });
//! cache.set("token", "abc123".to_string()).await?;
//! assert_eq!(cache.get_all_keys().await?, vec!["token".to_string()]);
//! sub.remove();
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod events;
pub mod logging;
pub mod namespace;
pub mod storage;

pub use errors::{LoggingError, Result, StorageError};
pub use events::{EventBus, EventType, Listener, StorageEvent, Subscription};
pub use logging::LogConfig;
pub use namespace::{KeyHandle, Namespace, NamespaceStorage};
pub use storage::memory_storage::MemoryStorage;
pub use storage::traits::{KeyValuePair, StorageEngine};
