//! Key-value persistence seam.
//!
//! Everything the engine persists goes through [`KeyValueStore`]: bounded
//! lookups by exact key, no scans. The engine ships an in-memory store; the
//! client provides file-backed ones for the cross-process and process-local
//! tiers.

use crate::{error::Result, Error};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Logical keys shared by the interactive surface and the widget.
pub mod keys {
    pub const PREFERENCES_SORT: &str = "preferences.sort";
    pub const PREFERENCES_STATUS_FILTER: &str = "preferences.statusFilter";
    pub const PREFERENCES_PRIORITY_FILTER: &str = "preferences.priorityFilter";

    pub const REGISTRY_COLLECTIONS: &str = "registry.collections";
    /// Remote id of the active collection
    pub const REGISTRY_ACTIVE_ID: &str = "registry.activeId";
    pub const REGISTRY_ACTIVE_NAME: &str = "registry.activeName";

    /// Remote id of the collection pinned for the widget
    pub const WIDGET_PINNED_COLLECTION_ID: &str = "widget.pinnedCollectionId";
    /// Whether an API key is configured
    pub const AUTH_CONFIGURED: &str = "auth.configured";

    pub const CACHE_PREFIX: &str = "cache.items.";
    pub const CACHE_LATEST: &str = "cache.items.latest";

    /// Collection-scoped cache key.
    pub fn cache_items(remote_id: &str) -> String {
        format!("{CACHE_PREFIX}{remote_id}")
    }
}

/// Byte-oriented key-value store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Read and decode a JSON value.
pub fn get_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Error::InvalidStoredValue {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Encode and write a JSON value.
pub fn set_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let bytes = serde_json::to_vec(value).map_err(|e| Error::InvalidStoredValue {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    store.set(key, &bytes)
}

/// Write `Some` values, remove the key for `None`.
pub fn set_or_remove_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: Option<&T>,
) -> Result<()> {
    match value {
        Some(value) => set_json(store, key, value),
        None => store.remove(key),
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with entries.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        Self {
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .map(|e| e.contains_key(key))
            .unwrap_or(false)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))?;
        entries.remove(key);
        Ok(())
    }
}
