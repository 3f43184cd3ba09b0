//! The sync context.
//!
//! One [`SyncContext`] per process owns the registry, the preferences, and the
//! raw cache. All state changes go through a single async mutex, so a view
//! recompute never observes a half-applied sync or edit. Network calls run
//! outside the lock; their results are applied inside it.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use taskdeck_engine::{
    derive,
    kv::{keys, set_json},
    Collection, CollectionId, DerivedView, KeyValueStore, Preferences, RawCache, Record,
    RecordPatch, Registry, RemoteId, Settlement,
};

use crate::error::{Result, SyncError};
use crate::publisher::{CachePublisher, ViewUpdate};
use crate::remote::RemoteAdapter;

/// In-flight re-sync of several collections.
///
/// Each collection syncs independently. Dropping this value detaches the
/// tasks; they still run to completion.
#[derive(Debug, Default)]
pub struct Resync {
    handles: Vec<(RemoteId, JoinHandle<Result<usize>>)>,
}

impl Resync {
    pub fn collections(&self) -> Vec<&str> {
        self.handles.iter().map(|(id, _)| id.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every collection; yields the record count or error of each.
    pub async fn wait(self) -> Vec<(RemoteId, Result<usize>)> {
        let (ids, handles): (Vec<_>, Vec<_>) = self.handles.into_iter().unzip();
        let results = join_all(handles).await;
        ids.into_iter()
            .zip(results)
            .map(|(id, joined)| {
                let result = joined.unwrap_or_else(|e| Err(SyncError::Cancelled(e.to_string())));
                (id, result)
            })
            .collect()
    }
}

struct State {
    registry: Registry,
    preferences: Preferences,
    raw: RawCache,
    has_api_key: bool,
    last_error: Option<SyncError>,
}

struct Inner {
    adapter: RwLock<Arc<dyn RemoteAdapter>>,
    publisher: CachePublisher,
    state: Mutex<State>,
}

/// Shared handle to the interactive surface's sync state.
#[derive(Clone)]
pub struct SyncContext {
    inner: Arc<Inner>,
}

impl SyncContext {
    /// Load persisted settings and build the context.
    ///
    /// Settings live in the publisher's cross-process store, where the widget
    /// reads the denormalized keys.
    pub fn new(
        adapter: Arc<dyn RemoteAdapter>,
        publisher: CachePublisher,
        has_api_key: bool,
    ) -> Result<Self> {
        let settings = publisher.shared().clone();
        let registry = Registry::load(settings.as_ref())?;
        let preferences = Preferences::load(settings.as_ref()).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Stored preferences unreadable, using defaults");
            Preferences::default()
        });

        set_json(settings.as_ref(), keys::AUTH_CONFIGURED, &has_api_key)?;
        registry.save_denormalized(settings.as_ref())?;

        tracing::info!(
            collections = registry.len(),
            authenticated = registry.is_authenticated(has_api_key),
            "Sync context ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                adapter: RwLock::new(adapter),
                publisher,
                state: Mutex::new(State {
                    registry,
                    preferences,
                    raw: RawCache::new(),
                    has_api_key,
                    last_error: None,
                }),
            }),
        })
    }

    fn settings(&self) -> &dyn KeyValueStore {
        self.inner.publisher.shared().as_ref()
    }

    fn adapter(&self) -> Arc<dyn RemoteAdapter> {
        match self.inner.adapter.read() {
            Ok(adapter) => adapter.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    /// Swap in a newly configured adapter and re-sync everything.
    pub async fn configure(
        &self,
        adapter: Arc<dyn RemoteAdapter>,
        has_api_key: bool,
    ) -> Result<Resync> {
        {
            let mut slot = match self.inner.adapter.write() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            *slot = adapter;
        }

        {
            let mut state = self.inner.state.lock().await;
            set_json(self.settings(), keys::AUTH_CONFIGURED, &has_api_key)?;
            state.has_api_key = has_api_key;
            if matches!(state.last_error, Some(SyncError::Auth(_))) {
                state.last_error = None;
            }
        }
        self.inner.publisher.invalidate_widget();

        tracing::info!(has_api_key, "Remote adapter configured");
        Ok(self.resync_all().await)
    }

    /// Key present, at least one collection, one of them active.
    pub async fn is_authenticated(&self) -> bool {
        let state = self.inner.state.lock().await;
        state.registry.is_authenticated(state.has_api_key)
    }

    // ========================================================================
    // Registry
    // ========================================================================

    pub async fn registry(&self) -> Registry {
        self.inner.state.lock().await.registry.clone()
    }

    /// Add a collection. The first one becomes active.
    pub async fn add_collection(
        &self,
        display_name: &str,
        remote_id: &str,
    ) -> Result<(Collection, Resync)> {
        let collection = {
            let mut state = self.inner.state.lock().await;
            self.commit_registry(&mut state, |registry| {
                registry.add(display_name, remote_id, Utc::now())
            })?
        };

        tracing::info!(
            collection = %collection.remote_id,
            name = %collection.display_name,
            active = collection.is_active,
            "Collection added"
        );
        Ok((collection, self.resync_all().await))
    }

    /// Remove a collection and everything cached for it.
    pub async fn remove_collection(&self, id: CollectionId) -> Result<Resync> {
        {
            let mut state = self.inner.state.lock().await;
            let removal = self.commit_registry(&mut state, |registry| registry.remove(id))?;
            let remote_id = &removal.removed.remote_id;

            state.raw.remove(remote_id);
            self.inner.publisher.remove(remote_id)?;

            tracing::info!(
                collection = %remote_id,
                promoted = ?removal.promoted,
                unpinned = removal.unpinned,
                remaining = state.registry.len(),
                "Collection removed"
            );
        }
        Ok(self.resync_all().await)
    }

    /// Rename a collection or point it at another remote collection.
    pub async fn update_collection(
        &self,
        id: CollectionId,
        display_name: &str,
        remote_id: &str,
    ) -> Result<Resync> {
        {
            let mut state = self.inner.state.lock().await;
            let update = self.commit_registry(&mut state, |registry| {
                registry.update(id, display_name, remote_id)
            })?;

            if let Some(old) = &update.replaced_remote_id {
                state.raw.remove(old);
                self.inner.publisher.remove(old)?;
                tracing::info!(
                    from = %old,
                    to = %update.collection.remote_id,
                    "Collection repointed"
                );
            }
        }
        Ok(self.resync_all().await)
    }

    /// Make a collection active. Already active: nothing happens.
    pub async fn set_active(&self, id: CollectionId) -> Result<Resync> {
        {
            let mut state = self.inner.state.lock().await;
            if state.registry.get(id).is_some_and(|c| c.is_active) {
                return Ok(Resync::default());
            }
            self.commit_registry(&mut state, |registry| registry.set_active(id))?;
        }
        tracing::info!(collection = %id, "Active collection changed");
        Ok(self.resync_all().await)
    }

    /// Pin a collection for the widget, or clear the pin.
    ///
    /// Every collection is already published, so no re-sync is needed.
    pub async fn set_pinned(&self, id: Option<CollectionId>) -> Result<()> {
        {
            let mut state = self.inner.state.lock().await;
            self.commit_registry(&mut state, |registry| registry.set_pinned(id))?;
        }
        self.inner.publisher.invalidate_widget();
        tracing::info!(collection = ?id, "Widget pin changed");
        Ok(())
    }

    /// Apply a change to a copy of the registry and persist it. The live
    /// registry is replaced only once the save succeeded.
    fn commit_registry<T>(
        &self,
        state: &mut State,
        change: impl FnOnce(&mut Registry) -> taskdeck_engine::error::Result<T>,
    ) -> Result<T> {
        let mut registry = state.registry.clone();
        let outcome = change(&mut registry)?;
        registry.save(self.settings())?;
        state.registry = registry;
        Ok(outcome)
    }

    // ========================================================================
    // Preferences
    // ========================================================================

    pub async fn preferences(&self) -> Preferences {
        self.inner.state.lock().await.preferences.clone()
    }

    /// Replace the preferences and re-sync every collection.
    pub async fn set_preferences(&self, preferences: Preferences) -> Result<Resync> {
        {
            let mut state = self.inner.state.lock().await;
            preferences.save(self.settings())?;
            state.preferences = preferences;
        }
        Ok(self.resync_all().await)
    }

    // ========================================================================
    // Sync
    // ========================================================================

    /// Fetch, derive, and publish every configured collection.
    ///
    /// One independent task per collection; this does not wait for them.
    pub async fn resync_all(&self) -> Resync {
        let collections: Vec<RemoteId> = {
            let state = self.inner.state.lock().await;
            if !state.has_api_key {
                tracing::debug!("No API key, skipping re-sync");
                return Resync::default();
            }
            state
                .registry
                .collections()
                .iter()
                .map(|c| c.remote_id.clone())
                .collect()
        };

        let handles = collections
            .into_iter()
            .map(|remote_id| {
                let ctx = self.clone();
                let id = remote_id.clone();
                (remote_id, tokio::spawn(async move { ctx.sync_collection(&id).await }))
            })
            .collect();
        Resync { handles }
    }

    /// Fetch one collection and publish its derived view.
    ///
    /// On failure the raw cache and published views stay as they were.
    /// Returns the number of records fetched.
    pub async fn sync_collection(&self, remote_id: &str) -> Result<usize> {
        let fetched = match self.adapter().fetch_records(remote_id).await {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!(collection = %remote_id, error = %e, "Sync failed");
                self.record_error(e.clone()).await;
                return Err(e);
            }
        };

        for diagnostic in &fetched.diagnostics {
            tracing::warn!(collection = %remote_id, %diagnostic, "Decoding diagnostic");
        }

        let mut state = self.inner.state.lock().await;
        if state.registry.find_by_remote(remote_id).is_none() {
            tracing::debug!(collection = %remote_id, "Collection removed during sync, discarding");
            return Ok(0);
        }

        let count = fetched.records.len();
        state.raw.replace(remote_id, fetched.records);
        self.publish_locked(&state, remote_id)?;

        tracing::info!(collection = %remote_id, records = count, "Collection synced");
        Ok(count)
    }

    fn publish_locked(&self, state: &State, remote_id: &str) -> Result<()> {
        let records = state.raw.records(remote_id).unwrap_or_default();
        let view = derive(records, &state.preferences);
        self.inner.publisher.publish(remote_id, view)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Edit a record optimistically, then write the edit remotely.
    ///
    /// The new value is published before the remote answers. A remote failure
    /// is returned and shown, but the local value stays until the next sync.
    pub async fn mutate(&self, remote_id: &str, record_id: &str, patch: RecordPatch) -> Result<()> {
        self.mutate_with(remote_id, record_id, |_| patch).await
    }

    /// Flip a record between done and not done.
    pub async fn toggle_status(&self, remote_id: &str, record_id: &str) -> Result<()> {
        self.mutate_with(remote_id, record_id, |record| {
            RecordPatch::Status(record.status.toggled())
        })
        .await
    }

    async fn mutate_with<F>(&self, remote_id: &str, record_id: &str, make_patch: F) -> Result<()>
    where
        F: FnOnce(&Record) -> RecordPatch,
    {
        let (patch_id, patch) = {
            let mut state = self.inner.state.lock().await;
            let record = state
                .raw
                .records(remote_id)
                .and_then(|records| records.iter().find(|r| r.id == record_id))
                .ok_or_else(|| SyncError::NotFound(format!("Task {record_id}")))?;
            let patch = make_patch(record);

            let patch_id =
                state
                    .raw
                    .apply_optimistic(remote_id, record_id, patch.clone(), Utc::now())?;
            self.publish_locked(&state, remote_id)?;
            (patch_id, patch)
        };

        tracing::debug!(collection = %remote_id, record = %record_id, ?patch, "Applied local edit");
        let outcome = self.adapter().mutate(remote_id, record_id, &patch).await;

        let mut state = self.inner.state.lock().await;
        let settlement = match &outcome {
            Ok(()) => Settlement::Confirmed,
            Err(_) => Settlement::Failed,
        };
        state.raw.settle(remote_id, patch_id, settlement);
        if state.raw.contains(remote_id) {
            self.publish_locked(&state, remote_id)?;
        }

        if let Err(e) = outcome {
            tracing::warn!(collection = %remote_id, record = %record_id, error = %e, "Remote edit failed");
            state.last_error = Some(e.clone());
            return Err(e);
        }
        Ok(())
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// Current view of a collection, `None` if it has not synced yet.
    pub async fn view(&self, remote_id: &str) -> Option<DerivedView> {
        let state = self.inner.state.lock().await;
        state
            .raw
            .records(remote_id)
            .map(|records| derive(records, &state.preferences))
    }

    /// The active collection and its current view.
    pub async fn active_view(&self) -> Option<(Collection, Option<DerivedView>)> {
        let state = self.inner.state.lock().await;
        let active = state.registry.active()?.clone();
        let view = state
            .raw
            .records(&active.remote_id)
            .map(|records| derive(records, &state.preferences));
        Some((active, view))
    }

    /// Whether a collection's raw records include a record.
    pub async fn contains_record(&self, remote_id: &str, record_id: &str) -> bool {
        let state = self.inner.state.lock().await;
        state
            .raw
            .records(remote_id)
            .is_some_and(|records| records.iter().any(|r| r.id == record_id))
    }

    /// Receive every published view.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewUpdate> {
        self.inner.publisher.subscribe()
    }

    pub fn publisher(&self) -> &CachePublisher {
        &self.inner.publisher
    }

    // ========================================================================
    // Errors
    // ========================================================================

    async fn record_error(&self, error: SyncError) {
        self.inner.state.lock().await.last_error = Some(error);
    }

    /// The error banner currently shown, if any.
    pub async fn last_error(&self) -> Option<SyncError> {
        self.inner.state.lock().await.last_error.clone()
    }

    pub async fn dismiss_error(&self) {
        self.inner.state.lock().await.last_error = None;
    }
}
