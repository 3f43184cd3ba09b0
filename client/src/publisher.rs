//! Cache publisher.
//!
//! Every recomputed view is written to both storage tiers, under its
//! collection-scoped key and the unscoped most-recent key, then the widget is
//! told to reload and in-process subscribers get the new view.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use taskdeck_engine::{kv::keys, CachedView, DerivedView, KeyValueStore, RemoteId};

use crate::error::Result;

/// Capacity of the view update channel.
const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// A freshly published view.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewUpdate {
    pub collection_id: RemoteId,
    pub view: Arc<DerivedView>,
}

/// Writes derived views where the widget can find them.
pub struct CachePublisher {
    shared: Arc<dyn KeyValueStore>,
    fallback: Arc<dyn KeyValueStore>,
    updates: broadcast::Sender<ViewUpdate>,
    /// Bumped whenever the widget should resolve again
    invalidations: watch::Sender<u64>,
}

impl CachePublisher {
    pub fn new(shared: Arc<dyn KeyValueStore>, fallback: Arc<dyn KeyValueStore>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let (invalidations, _) = watch::channel(0);
        Self {
            shared,
            fallback,
            updates,
            invalidations,
        }
    }

    /// Cross-process store.
    pub fn shared(&self) -> &Arc<dyn KeyValueStore> {
        &self.shared
    }

    /// Process-local fallback store.
    pub fn fallback(&self) -> &Arc<dyn KeyValueStore> {
        &self.fallback
    }

    /// Persist a view for a collection and announce it.
    ///
    /// Every write is attempted even if an earlier one fails; the first
    /// failure is returned.
    pub fn publish(&self, collection_id: &str, view: DerivedView) -> Result<()> {
        let bytes = CachedView::new(collection_id, &view).to_bytes()?;
        let scoped = keys::cache_items(collection_id);

        let mut first_error = None;
        for (tier, store) in [("shared", &self.shared), ("fallback", &self.fallback)] {
            for key in [scoped.as_str(), keys::CACHE_LATEST] {
                if let Err(e) = store.set(key, &bytes) {
                    tracing::warn!(tier, key, error = %e, "Failed to write cached view");
                    first_error.get_or_insert(e);
                }
            }
        }

        tracing::debug!(
            collection = %collection_id,
            records = view.len(),
            bytes = bytes.len(),
            "Published view"
        );

        self.invalidate_widget();
        let _ = self.updates.send(ViewUpdate {
            collection_id: collection_id.to_string(),
            view: Arc::new(view),
        });

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Delete a collection's cached views from both tiers.
    ///
    /// The most-recent entry goes too when it belongs to that collection.
    pub fn remove(&self, collection_id: &str) -> Result<()> {
        let scoped = keys::cache_items(collection_id);
        for store in [&self.shared, &self.fallback] {
            store.remove(&scoped)?;
            if latest_belongs_to(store.as_ref(), collection_id) {
                store.remove(keys::CACHE_LATEST)?;
            }
        }

        tracing::info!(collection = %collection_id, "Removed cached views");
        self.invalidate_widget();
        Ok(())
    }

    /// Ask the widget to resolve again.
    pub fn invalidate_widget(&self) {
        self.invalidations.send_modify(|generation| *generation += 1);
    }

    /// Receive every published view.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewUpdate> {
        self.updates.subscribe()
    }

    /// Observe widget invalidations.
    pub fn watch_invalidations(&self) -> watch::Receiver<u64> {
        self.invalidations.subscribe()
    }
}

fn latest_belongs_to(store: &dyn KeyValueStore, collection_id: &str) -> bool {
    match store.get(keys::CACHE_LATEST) {
        Ok(Some(bytes)) => CachedView::from_bytes(&bytes)
            .map(|cached| cached.collection_id == collection_id)
            .unwrap_or(false),
        _ => false,
    }
}
