//! Integration tests for the sync context.
//!
//! A fake remote adapter stands in for the network. Mutations can be held
//! open with a gate to simulate a slow server.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use dashmap::DashMap;
use tokio::sync::{oneshot, Mutex};

use taskdeck_client::{
    route, CachePublisher, DeepLink, FetchedRecords, FileStore, RemoteAdapter, Result, Route,
    SyncContext, SyncError, WidgetReader,
};
use taskdeck_engine::{
    kv::{get_json, keys},
    CachedView, CollectionSchema, KeyValueStore, MemoryStore, Preferences, Priority,
    PropertyKind, Record, RecordPatch, ResolutionSource, Status, Tier, WidgetState,
};

// ============================================================================
// Fake Remote
// ============================================================================

#[derive(Default)]
struct FakeAdapter {
    collections: DashMap<String, Vec<Record>>,
    fetch_failures: DashMap<String, SyncError>,
    gate: Mutex<Option<oneshot::Receiver<Result<()>>>>,
    mutations: Mutex<Vec<(String, String, RecordPatch)>>,
    fetches: AtomicUsize,
}

impl FakeAdapter {
    fn with_collection(self, id: &str, records: Vec<Record>) -> Self {
        self.collections.insert(id.to_string(), records);
        self
    }

    fn fail_fetch(&self, id: &str, error: SyncError) {
        self.fetch_failures.insert(id.to_string(), error);
    }

    /// Hold the next mutation until the returned sender fires.
    async fn hold_next_mutation(&self) -> oneshot::Sender<Result<()>> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().await = Some(rx);
        tx
    }
}

#[async_trait]
impl RemoteAdapter for FakeAdapter {
    async fn fetch_schema(&self, _collection: &str) -> Result<CollectionSchema> {
        Ok(CollectionSchema::new()
            .with_property("Name", PropertyKind::Title)
            .with_property("Status", PropertyKind::Status))
    }

    async fn fetch_records(&self, collection: &str) -> Result<FetchedRecords> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fetch_failures.get(collection) {
            return Err(error.clone());
        }
        let records = self
            .collections
            .get(collection)
            .map(|r| r.clone())
            .ok_or_else(|| SyncError::RemoteApi {
                status: 404,
                message: format!("Could not find database with ID: {collection}"),
            })?;
        Ok(FetchedRecords {
            records,
            diagnostics: Vec::new(),
        })
    }

    async fn mutate(&self, collection: &str, record_id: &str, patch: &RecordPatch) -> Result<()> {
        let gate = self.gate.lock().await.take();
        if let Some(gate) = gate {
            gate.await
                .unwrap_or_else(|_| Err(SyncError::Network("gate dropped".into())))?;
        }

        self.mutations.lock().await.push((
            collection.to_string(),
            record_id.to_string(),
            patch.clone(),
        ));
        if let Some(mut records) = self.collections.get_mut(collection) {
            if let Some(record) = records.iter_mut().find(|r| r.id == record_id) {
                patch.apply_to(record);
            }
        }
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn at(secs: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn work_records() -> Vec<Record> {
    vec![
        Record::new("r1", "Pay rent", at(1)),
        Record::new("r2", "Book flights", at(2))
            .with_status(Status::Done)
            .with_priority(Priority::Urgent),
    ]
}

fn home_records() -> Vec<Record> {
    vec![Record::new("h1", "Water plants", at(3)).with_priority(Priority::Low)]
}

fn fake() -> Arc<FakeAdapter> {
    Arc::new(
        FakeAdapter::default()
            .with_collection("db-work", work_records())
            .with_collection("db-home", home_records()),
    )
}

struct Harness {
    ctx: SyncContext,
    adapter: Arc<FakeAdapter>,
    shared: Arc<MemoryStore>,
    fallback: Arc<MemoryStore>,
}

impl Harness {
    fn new(adapter: Arc<FakeAdapter>, has_api_key: bool) -> Self {
        let shared = Arc::new(MemoryStore::new());
        let fallback = Arc::new(MemoryStore::new());
        let publisher = CachePublisher::new(shared.clone(), fallback.clone());
        let ctx = SyncContext::new(adapter.clone(), publisher, has_api_key).unwrap();
        Self {
            ctx,
            adapter,
            shared,
            fallback,
        }
    }

    /// Both collections configured and synced; work is active.
    async fn with_two_collections() -> Self {
        let h = Self::new(fake(), true);
        h.ctx.add_collection("Work", "db-work").await.unwrap().1.wait().await;
        h.ctx.add_collection("Home", "db-home").await.unwrap().1.wait().await;
        h
    }

    fn cached(&self, store: &MemoryStore, key: &str) -> Option<CachedView> {
        store
            .get(key)
            .unwrap()
            .map(|bytes| CachedView::from_bytes(&bytes).unwrap())
    }

    fn widget(&self) -> WidgetReader {
        WidgetReader::new(self.shared.clone(), self.fallback.clone())
    }
}

fn status_of(view: &CachedView, id: &str) -> Status {
    view.records.iter().find(|r| r.id == id).unwrap().status
}

// ============================================================================
// Sync
// ============================================================================

#[tokio::test]
async fn sync_publishes_both_tiers() {
    let h = Harness::with_two_collections().await;

    for store in [&h.shared, &h.fallback] {
        let work = h.cached(store, "cache.items.db-work").unwrap();
        assert_eq!(work.records.len(), 2);
        let home = h.cached(store, "cache.items.db-home").unwrap();
        assert_eq!(home.records[0].id, "h1");
        assert!(h.cached(store, keys::CACHE_LATEST).is_some());
    }
    assert!(h.ctx.is_authenticated().await);
}

#[tokio::test]
async fn registry_changes_resync_every_collection() {
    let h = Harness::with_two_collections().await;
    let before = h.adapter.fetches.load(Ordering::SeqCst);

    let home = h.ctx.registry().await.find_by_remote("db-home").cloned().unwrap();
    let resync = h.ctx.set_active(home.local_id).await.unwrap();
    let mut synced = resync.collections().into_iter().map(String::from).collect::<Vec<_>>();
    synced.sort();
    assert_eq!(synced, vec!["db-home", "db-work"]);
    resync.wait().await;

    assert_eq!(h.adapter.fetches.load(Ordering::SeqCst), before + 2);

    // Already active: nothing to do.
    let resync = h.ctx.set_active(home.local_id).await.unwrap();
    assert!(resync.is_empty());
}

#[tokio::test]
async fn preferences_apply_to_pinned_inactive_collection() {
    let h = Harness::with_two_collections().await;
    let home = h.ctx.registry().await.find_by_remote("db-home").cloned().unwrap();
    h.ctx.set_pinned(Some(home.local_id)).await.unwrap();

    let prefs = Preferences::default().with_priority_filter([Priority::High, Priority::Urgent]);
    h.ctx.set_preferences(prefs).await.unwrap().wait().await;

    let home_view = h.cached(&h.shared, "cache.items.db-home").unwrap();
    assert!(home_view.records.is_empty());
    let work_view = h.cached(&h.shared, "cache.items.db-work").unwrap();
    assert_eq!(
        work_view.records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
        vec!["r2", "r1"]
    );

    let entry = h.widget().timeline(Utc::now());
    assert_eq!(entry.resolution.source, ResolutionSource::PinnedShared);
    assert_eq!(entry.resolution.state, WidgetState::HasData);
    assert!(entry.resolution.records.is_empty());
}

#[tokio::test]
async fn parse_error_leaves_cache_untouched() {
    let h = Harness::with_two_collections().await;
    let before = h.shared.get("cache.items.db-work").unwrap();
    let view_before = h.ctx.view("db-work").await;

    h.adapter
        .fail_fetch("db-work", SyncError::Parse("results is not an array".into()));
    let err = h.ctx.sync_collection("db-work").await.unwrap_err();

    assert!(matches!(err, SyncError::Parse(_)));
    assert_eq!(h.shared.get("cache.items.db-work").unwrap(), before);
    assert_eq!(h.ctx.view("db-work").await, view_before);
    assert_eq!(h.ctx.last_error().await, Some(err));

    h.ctx.dismiss_error().await;
    assert_eq!(h.ctx.last_error().await, None);
}

#[tokio::test]
async fn remote_error_message_is_kept_for_the_banner() {
    let h = Harness::new(fake(), true);
    let (_, resync) = h.ctx.add_collection("Gone", "db-missing").await.unwrap();
    let results = resync.wait().await;

    assert!(matches!(results[0].1, Err(SyncError::RemoteApi { status: 404, .. })));
    let banner = h.ctx.last_error().await.unwrap().user_message();
    assert_eq!(banner, "Could not find database with ID: db-missing");

    // Authenticated but nothing cached: explicit empty state, never demo.
    let entry = h.widget().timeline(Utc::now());
    assert_eq!(entry.resolution.source, ResolutionSource::Empty);
    assert_eq!(entry.resolution.state, WidgetState::AuthenticatedNoData);
}

// ============================================================================
// Optimistic Edits
// ============================================================================

#[tokio::test]
async fn toggle_shows_before_remote_answers_and_is_not_reverted() {
    let h = Harness::with_two_collections().await;
    let mut updates = h.ctx.subscribe();
    let gate = h.adapter.hold_next_mutation().await;

    let ctx = h.ctx.clone();
    let edit = tokio::spawn(async move { ctx.toggle_status("db-work", "r1").await });

    // The optimistic publish arrives while the remote call is still held.
    let update = updates.recv().await.unwrap();
    assert_eq!(update.collection_id, "db-work");
    let record = update.view.get("r1").unwrap();
    assert_eq!(record.status, Status::Done);
    assert!(record.is_optimistic());

    let published = h.cached(&h.shared, "cache.items.db-work").unwrap();
    assert_eq!(status_of(&published, "r1"), Status::Done);

    gate.send(Err(SyncError::Network("connection reset".into())))
        .unwrap();
    let result = edit.await.unwrap();
    assert_eq!(result, Err(SyncError::Network("connection reset".into())));

    let view = h.ctx.view("db-work").await.unwrap();
    let record = view.get("r1").unwrap();
    assert_eq!(record.status, Status::Done);
    assert!(record.is_optimistic());
    assert!(matches!(h.ctx.last_error().await, Some(SyncError::Network(_))));

    // Only the next full sync restores what the remote holds.
    h.ctx.sync_collection("db-work").await.unwrap();
    let view = h.ctx.view("db-work").await.unwrap();
    assert_eq!(view.get("r1").unwrap().status, Status::NotStarted);
    assert!(!view.get("r1").unwrap().is_optimistic());
}

#[tokio::test]
async fn confirmed_edit_clears_the_pending_flag() {
    let h = Harness::with_two_collections().await;

    h.ctx
        .mutate("db-work", "r2", RecordPatch::Priority(Some(Priority::Low)))
        .await
        .unwrap();

    let view = h.ctx.view("db-work").await.unwrap();
    let record = view.get("r2").unwrap();
    assert_eq!(record.priority, Some(Priority::Low));
    assert!(!record.is_optimistic());

    let mutations = h.adapter.mutations.lock().await;
    assert_eq!(
        *mutations,
        vec![(
            "db-work".to_string(),
            "r2".to_string(),
            RecordPatch::Priority(Some(Priority::Low))
        )]
    );
}

#[tokio::test]
async fn sync_during_pending_edit_keeps_local_value() {
    let h = Harness::with_two_collections().await;
    let gate = h.adapter.hold_next_mutation().await;
    let mut updates = h.ctx.subscribe();

    let ctx = h.ctx.clone();
    let edit = tokio::spawn(async move { ctx.toggle_status("db-work", "r2").await });
    updates.recv().await.unwrap();

    h.ctx.sync_collection("db-work").await.unwrap();
    let view = h.ctx.view("db-work").await.unwrap();
    assert_eq!(view.get("r2").unwrap().status, Status::NotStarted);

    gate.send(Ok(())).unwrap();
    edit.await.unwrap().unwrap();
    let view = h.ctx.view("db-work").await.unwrap();
    assert!(!view.get("r2").unwrap().is_optimistic());
}

#[tokio::test]
async fn editing_unknown_record_fails_without_remote_call() {
    let h = Harness::with_two_collections().await;
    let err = h.ctx.toggle_status("db-work", "nope").await.unwrap_err();

    assert!(matches!(err, SyncError::NotFound(_)));
    assert!(h.adapter.mutations.lock().await.is_empty());
}

// ============================================================================
// Registry
// ============================================================================

#[tokio::test]
async fn removing_active_collection_promotes_next_and_deletes_its_cache() {
    let h = Harness::with_two_collections().await;
    let registry = h.ctx.registry().await;
    let work = registry.find_by_remote("db-work").cloned().unwrap();
    assert!(work.is_active);

    h.ctx.remove_collection(work.local_id).await.unwrap().wait().await;

    let registry = h.ctx.registry().await;
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.active().unwrap().remote_id, "db-home");
    for store in [&h.shared, &h.fallback] {
        assert!(!store.contains("cache.items.db-work"));
        assert!(store.contains("cache.items.db-home"));
    }
    assert_eq!(
        h.shared.get(keys::REGISTRY_ACTIVE_ID).unwrap(),
        Some(b"\"db-home\"".to_vec())
    );
    assert!(h.ctx.view("db-work").await.is_none());
}

#[tokio::test]
async fn removing_last_collection_clears_authentication() {
    let h = Harness::new(fake(), true);
    let (work, resync) = h.ctx.add_collection("Work", "db-work").await.unwrap();
    resync.wait().await;
    assert!(h.ctx.is_authenticated().await);

    h.ctx.remove_collection(work.local_id).await.unwrap().wait().await;

    assert!(!h.ctx.is_authenticated().await);
    assert!(h.shared.get(keys::REGISTRY_ACTIVE_ID).unwrap().is_none());
    let entry = h.widget().timeline(Utc::now());
    assert_eq!(entry.resolution.source, ResolutionSource::Demo);
}

#[tokio::test]
async fn repointing_a_collection_drops_the_old_cache_key() {
    let h = Harness::new(fake(), true);
    let (work, resync) = h.ctx.add_collection("Work", "db-work").await.unwrap();
    resync.wait().await;

    h.ctx
        .update_collection(work.local_id, "Home", "db-home")
        .await
        .unwrap()
        .wait()
        .await;

    assert!(!h.shared.contains("cache.items.db-work"));
    assert!(h.shared.contains("cache.items.db-home"));
    assert_eq!(
        h.ctx.registry().await.active().unwrap().display_name,
        "Home"
    );
}

#[tokio::test]
async fn duplicate_collection_is_rejected() {
    let h = Harness::with_two_collections().await;
    let err = h.ctx.add_collection("Again", "db-work").await.unwrap_err();
    assert!(matches!(err, SyncError::Engine(_)));
    assert_eq!(h.ctx.registry().await.len(), 2);
}

// ============================================================================
// Widget Resolution
// ============================================================================

#[tokio::test]
async fn pinned_collection_without_cache_falls_back_to_latest() {
    let h = Harness::new(fake(), true);
    h.adapter.fail_fetch(
        "db-home",
        SyncError::Network("timed out".into()),
    );
    h.ctx.add_collection("Work", "db-work").await.unwrap().1.wait().await;
    let (home, resync) = h.ctx.add_collection("Home", "db-home").await.unwrap();
    resync.wait().await;
    h.ctx.set_pinned(Some(home.local_id)).await.unwrap();

    let entry = h.widget().timeline(Utc::now());

    assert_eq!(entry.context.pinned_collection_id.as_deref(), Some("db-home"));
    assert_eq!(
        entry.resolution.source,
        ResolutionSource::Latest { tier: Tier::Shared }
    );
    assert_eq!(entry.resolution.collection_id.as_deref(), Some("db-work"));
}

#[tokio::test]
async fn without_api_key_nothing_syncs_until_configured() {
    let adapter = fake();
    let h = Harness::new(adapter.clone(), false);
    let (_, resync) = h.ctx.add_collection("Work", "db-work").await.unwrap();

    assert!(resync.is_empty());
    assert!(!h.ctx.is_authenticated().await);
    assert_eq!(
        h.widget().timeline(Utc::now()).resolution.source,
        ResolutionSource::Demo
    );

    let resync = h.ctx.configure(adapter, true).await.unwrap();
    assert_eq!(resync.collections(), vec!["db-work"]);
    resync.wait().await;

    assert!(h.ctx.is_authenticated().await);
    let entry = h.widget().timeline(Utc::now());
    assert_eq!(
        entry.resolution.source,
        ResolutionSource::Active { tier: Tier::Shared }
    );
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn settings_survive_restart_on_disk() {
    let shared_dir = tempfile::tempdir().unwrap();
    let local_dir = tempfile::tempdir().unwrap();
    let open = |adapter: Arc<FakeAdapter>| {
        let shared = Arc::new(FileStore::open(shared_dir.path()).unwrap());
        let fallback = Arc::new(FileStore::open(local_dir.path()).unwrap());
        SyncContext::new(adapter, CachePublisher::new(shared, fallback), true).unwrap()
    };

    let ctx = open(fake());
    ctx.add_collection("Work", "db-work").await.unwrap().1.wait().await;
    let (home, resync) = ctx.add_collection("Home", "db-home").await.unwrap();
    resync.wait().await;
    ctx.set_pinned(Some(home.local_id)).await.unwrap();
    let prefs = Preferences::default().with_status_filter([Status::NotStarted]);
    ctx.set_preferences(prefs.clone()).await.unwrap().wait().await;
    let registry = ctx.registry().await;
    drop(ctx);

    let reopened = open(fake());
    assert_eq!(reopened.registry().await, registry);
    assert_eq!(reopened.preferences().await, prefs);
    assert_eq!(
        reopened.registry().await.pinned().map(|c| c.local_id),
        Some(home.local_id)
    );

    let work = FileStore::open(local_dir.path())
        .unwrap()
        .get("cache.items.db-work")
        .unwrap()
        .map(|bytes| CachedView::from_bytes(&bytes).unwrap())
        .unwrap();
    assert_eq!(
        work.records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
        vec!["r1"]
    );
}

/// Memory store whose writes can be switched off.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    read_only: AtomicBool,
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> taskdeck_engine::error::Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> taskdeck_engine::error::Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(taskdeck_engine::Error::Storage("disk full".into()));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> taskdeck_engine::error::Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(taskdeck_engine::Error::Storage("disk full".into()));
        }
        self.inner.remove(key)
    }
}

#[tokio::test]
async fn failed_registry_save_leaves_state_unchanged() {
    let shared = Arc::new(FlakyStore::default());
    let publisher = CachePublisher::new(shared.clone(), Arc::new(MemoryStore::new()));
    let ctx = SyncContext::new(fake(), publisher, true).unwrap();
    let (work, resync) = ctx.add_collection("Work", "db-work").await.unwrap();
    resync.wait().await;
    let (home, resync) = ctx.add_collection("Home", "db-home").await.unwrap();
    resync.wait().await;
    let before = ctx.registry().await;

    shared.read_only.store(true, Ordering::SeqCst);

    let err = ctx.remove_collection(work.local_id).await.unwrap_err();
    assert!(matches!(err, SyncError::Storage(_)));
    assert!(ctx.set_active(home.local_id).await.is_err());
    assert!(ctx.set_pinned(Some(home.local_id)).await.is_err());
    assert!(ctx.add_collection("Errands", "db-errands").await.is_err());
    assert!(ctx
        .update_collection(home.local_id, "House", "db-house")
        .await
        .is_err());

    assert_eq!(ctx.registry().await, before);
    assert!(ctx.view("db-work").await.is_some());
    let stored: Option<String> = get_json(&*shared, keys::REGISTRY_ACTIVE_ID).unwrap();
    assert_eq!(stored.as_deref(), Some("db-work"));

    // Writes work again: the same removal goes through.
    shared.read_only.store(false, Ordering::SeqCst);
    ctx.remove_collection(work.local_id).await.unwrap().wait().await;
    assert_eq!(ctx.registry().await.active().unwrap().remote_id, "db-home");
}

// ============================================================================
// Deep links
// ============================================================================

fn link(url: &str) -> DeepLink {
    url.parse().unwrap()
}

#[tokio::test]
async fn open_link_activates_its_collection_first() {
    let h = Harness::with_two_collections().await;

    let routed = route(&h.ctx, &link("taskdeck://open?collection=db-home"))
        .await
        .unwrap();

    let (collection, view) = match routed {
        Route::List { collection, view } => (collection, view),
        other => panic!("expected the list screen, got {other:?}"),
    };
    assert_eq!(collection.remote_id, "db-home");
    assert!(collection.is_active);
    assert_eq!(view.unwrap().ids(), vec!["h1"]);

    let registry = h.ctx.registry().await;
    assert_eq!(registry.active().unwrap().remote_id, "db-home");
    assert!(!registry.find_by_remote("db-work").unwrap().is_active);
    let stored: Option<String> = get_json(&*h.shared, keys::REGISTRY_ACTIVE_ID).unwrap();
    assert_eq!(stored.as_deref(), Some("db-home"));
}

#[tokio::test]
async fn link_to_unknown_collection_is_not_found() {
    let h = Harness::with_two_collections().await;

    let err = route(&h.ctx, &link("taskdeck://open?collection=db-gone"))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
    assert_eq!(
        h.ctx.registry().await.active().unwrap().remote_id,
        "db-work"
    );
}

#[tokio::test]
async fn edit_link_to_missing_record_is_not_found() {
    let h = Harness::with_two_collections().await;

    let err = route(&h.ctx, &link("taskdeck://edit?record=r9&collection=db-work"))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
}

#[tokio::test]
async fn edit_link_without_collection_uses_the_active_one() {
    let h = Harness::with_two_collections().await;

    let routed = route(&h.ctx, &link("taskdeck://edit?record=r1")).await.unwrap();
    let (collection, record) = match routed {
        Route::Editor { collection, record } => (collection, record),
        other => panic!("expected the editor, got {other:?}"),
    };
    assert_eq!(collection.remote_id, "db-work");
    assert_eq!(record, "r1");
}

#[tokio::test]
async fn edit_link_switches_collection_before_opening_the_editor() {
    let h = Harness::with_two_collections().await;

    let routed = route(&h.ctx, &link("taskdeck://edit?record=h1&collection=db-home"))
        .await
        .unwrap();
    assert!(matches!(
        routed,
        Route::Editor { ref collection, ref record }
            if collection.remote_id == "db-home" && record == "h1"
    ));
    assert_eq!(
        h.ctx.registry().await.active().unwrap().remote_id,
        "db-home"
    );
}

#[tokio::test]
async fn link_without_collections_lands_on_setup() {
    let h = Harness::new(fake(), true);

    let routed = route(&h.ctx, &link("taskdeck://open")).await.unwrap();
    assert_eq!(routed, Route::Setup);
}
