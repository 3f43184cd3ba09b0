//! Collection registry.
//!
//! Tracks the configured collections, which one is active on the interactive
//! surface, and which one (if any) is pinned for the widget. The pin is
//! independent of the active collection.

use crate::{
    error::Result,
    kv::{get_json, keys, set_json, set_or_remove_json, KeyValueStore},
    CollectionId, Error, RemoteId, Timestamp,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One configured remote collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    /// Stable for the lifetime of the installation
    pub local_id: CollectionId,
    pub display_name: String,
    pub remote_id: RemoteId,
    pub is_active: bool,
    pub created_at: Timestamp,
}

/// Outcome of removing a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub removed: Collection,
    /// Collection promoted to active because the removed one was active
    pub promoted: Option<CollectionId>,
    /// Whether the removed collection was pinned
    pub unpinned: bool,
}

/// Outcome of updating a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub collection: Collection,
    /// Previous remote id, when it changed
    pub replaced_remote_id: Option<RemoteId>,
}

/// The set of configured collections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    collections: Vec<Collection>,
    pinned: Option<CollectionId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collections(&self) -> &[Collection] {
        &self.collections
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    pub fn get(&self, id: CollectionId) -> Option<&Collection> {
        self.collections.iter().find(|c| c.local_id == id)
    }

    pub fn find_by_remote(&self, remote_id: &str) -> Option<&Collection> {
        self.collections.iter().find(|c| c.remote_id == remote_id)
    }

    pub fn active(&self) -> Option<&Collection> {
        self.collections.iter().find(|c| c.is_active)
    }

    pub fn pinned(&self) -> Option<&Collection> {
        self.pinned.and_then(|id| self.get(id))
    }

    /// Key present, at least one collection, and one of them active.
    pub fn is_authenticated(&self, has_api_key: bool) -> bool {
        has_api_key && !self.is_empty() && self.active().is_some()
    }

    /// Add a collection. The first one added becomes active.
    pub fn add(
        &mut self,
        display_name: impl Into<String>,
        remote_id: impl Into<RemoteId>,
        now: Timestamp,
    ) -> Result<Collection> {
        let remote_id = normalize_remote_id(remote_id.into())?;
        if self.find_by_remote(&remote_id).is_some() {
            return Err(Error::DuplicateCollection(remote_id));
        }

        let collection = Collection {
            local_id: Uuid::new_v4(),
            display_name: display_name.into(),
            remote_id,
            is_active: self.active().is_none(),
            created_at: now,
        };
        self.collections.push(collection.clone());
        Ok(collection)
    }

    /// Remove a collection.
    ///
    /// Removing the active collection promotes the first remaining one. A pin
    /// on the removed collection is cleared.
    pub fn remove(&mut self, id: CollectionId) -> Result<Removal> {
        let index = self
            .position(id)
            .ok_or(Error::CollectionNotFound(id))?;
        let removed = self.collections.remove(index);

        let promoted = if removed.is_active {
            self.collections.first_mut().map(|first| {
                first.is_active = true;
                first.local_id
            })
        } else {
            None
        };

        let unpinned = self.pinned == Some(id);
        if unpinned {
            self.pinned = None;
        }

        Ok(Removal {
            removed,
            promoted,
            unpinned,
        })
    }

    /// Rename a collection and/or point it at another remote id.
    pub fn update(
        &mut self,
        id: CollectionId,
        display_name: impl Into<String>,
        remote_id: impl Into<RemoteId>,
    ) -> Result<Update> {
        let remote_id = normalize_remote_id(remote_id.into())?;
        if self
            .find_by_remote(&remote_id)
            .is_some_and(|other| other.local_id != id)
        {
            return Err(Error::DuplicateCollection(remote_id));
        }

        let index = self
            .position(id)
            .ok_or(Error::CollectionNotFound(id))?;
        let collection = &mut self.collections[index];

        let replaced_remote_id = if collection.remote_id != remote_id {
            Some(std::mem::replace(&mut collection.remote_id, remote_id))
        } else {
            None
        };
        collection.display_name = display_name.into();

        Ok(Update {
            collection: collection.clone(),
            replaced_remote_id,
        })
    }

    /// Make a collection the active one.
    ///
    /// Returns `false` if it already was active, in which case nothing changes.
    pub fn set_active(&mut self, id: CollectionId) -> Result<bool> {
        let target = self.get(id).ok_or(Error::CollectionNotFound(id))?;
        if target.is_active {
            return Ok(false);
        }
        for collection in &mut self.collections {
            collection.is_active = collection.local_id == id;
        }
        Ok(true)
    }

    /// Pin a collection for the widget, or clear the pin.
    pub fn set_pinned(&mut self, id: Option<CollectionId>) -> Result<()> {
        if let Some(id) = id {
            self.get(id).ok_or(Error::CollectionNotFound(id))?;
        }
        self.pinned = id;
        Ok(())
    }

    fn position(&self, id: CollectionId) -> Option<usize> {
        self.collections.iter().position(|c| c.local_id == id)
    }

    /// Load the registry.
    ///
    /// Repairs the single-active invariant: extra active flags are dropped and
    /// a non-empty registry with none active gets its first collection active.
    pub fn load(store: &dyn KeyValueStore) -> Result<Self> {
        let mut collections: Vec<Collection> =
            get_json(store, keys::REGISTRY_COLLECTIONS)?.unwrap_or_default();

        let mut seen_active = false;
        for collection in &mut collections {
            if collection.is_active {
                collection.is_active = !seen_active;
                seen_active = true;
            }
        }
        if !seen_active {
            if let Some(first) = collections.first_mut() {
                first.is_active = true;
            }
        }

        let pinned_remote: Option<RemoteId> =
            get_json(store, keys::WIDGET_PINNED_COLLECTION_ID)?;
        let pinned = pinned_remote.and_then(|remote| {
            collections
                .iter()
                .find(|c| c.remote_id == remote)
                .map(|c| c.local_id)
        });

        Ok(Self {
            collections,
            pinned,
        })
    }

    /// Persist the full list plus the denormalized active and pin keys.
    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        set_json(store, keys::REGISTRY_COLLECTIONS, &self.collections)?;
        self.save_denormalized(store)
    }

    /// Write only the keys the widget reads.
    pub fn save_denormalized(&self, store: &dyn KeyValueStore) -> Result<()> {
        let active = self.active();
        set_or_remove_json(
            store,
            keys::REGISTRY_ACTIVE_ID,
            active.map(|c| &c.remote_id),
        )?;
        set_or_remove_json(
            store,
            keys::REGISTRY_ACTIVE_NAME,
            active.map(|c| &c.display_name),
        )?;
        set_or_remove_json(
            store,
            keys::WIDGET_PINNED_COLLECTION_ID,
            self.pinned().map(|c| &c.remote_id),
        )
    }
}

fn normalize_remote_id(remote_id: String) -> Result<RemoteId> {
    let trimmed = remote_id.trim();
    if trimmed.is_empty() {
        return Err(Error::EmptyRemoteId);
    }
    // Its scoped cache key would be the unscoped most-recent key.
    if keys::cache_items(trimmed) == keys::CACHE_LATEST {
        return Err(Error::ReservedRemoteId(trimmed.to_string()));
    }
    Ok(trimmed.to_string())
}
