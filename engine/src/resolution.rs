//! Widget-side resolution.
//!
//! The widget runs in a separate, resource-limited process. It never talks to
//! the remote API and never derives views; it looks up what the interactive
//! surface published, in a fixed priority order, and falls back to an explicit
//! empty state or demo content. Every lookup is a single key read.

use crate::{
    cache::CachedView,
    kv::{get_json, keys, KeyValueStore},
    Priority, Record, RemoteId, Status, Timestamp,
};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the widget knows about the interactive surface's configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetContext {
    pub pinned_collection_id: Option<RemoteId>,
    pub active_collection_id: Option<RemoteId>,
    pub active_collection_name: Option<String>,
    pub authenticated: bool,
}

impl WidgetContext {
    /// Read the denormalized keys from the cross-process store.
    ///
    /// Unreadable values count as absent.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let pinned_collection_id = get_json(store, keys::WIDGET_PINNED_COLLECTION_ID)
            .ok()
            .flatten();
        let active_collection_id: Option<RemoteId> =
            get_json(store, keys::REGISTRY_ACTIVE_ID).ok().flatten();
        let active_collection_name = get_json(store, keys::REGISTRY_ACTIVE_NAME).ok().flatten();
        let has_key: bool = get_json(store, keys::AUTH_CONFIGURED)
            .ok()
            .flatten()
            .unwrap_or(false);

        Self {
            pinned_collection_id,
            authenticated: has_key && active_collection_id.is_some(),
            active_collection_id,
            active_collection_name,
        }
    }
}

/// Storage tier a cached view was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tier {
    Shared,
    Fallback,
}

/// Which resolution step produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "camelCase")]
pub enum ResolutionSource {
    /// Step 1: pinned collection, cross-process store
    PinnedShared,
    /// Step 2: pinned collection, fallback store
    PinnedFallback,
    /// Step 3: active collection (no pin set)
    Active { tier: Tier },
    /// Step 4: most recently published view of any collection
    Latest { tier: Tier },
    /// Step 5: authenticated, nothing cached yet
    Empty,
    /// Step 6: not authenticated
    Demo,
}

/// Coarse widget state driving the refresh schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WidgetState {
    HasData,
    AuthenticatedNoData,
    Unauthenticated,
}

/// Result of one resolution pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub source: ResolutionSource,
    pub state: WidgetState,
    /// Collection the records belong to, when they came from the cache
    pub collection_id: Option<RemoteId>,
    pub records: Vec<Record>,
}

impl Resolution {
    fn cached(source: ResolutionSource, cached: CachedView) -> Self {
        Self {
            source,
            state: WidgetState::HasData,
            collection_id: Some(cached.collection_id),
            records: cached.records,
        }
    }
}

/// Resolve what the widget should show.
///
/// Steps, first hit wins:
/// 1. pinned collection in the cross-process store
/// 2. pinned collection in the fallback store
/// 3. with no pin, the active collection (cross-process, then fallback)
/// 4. the unscoped most-recent entry (cross-process, then fallback)
/// 5. authenticated: explicit empty state
/// 6. otherwise: demo content
///
/// A present-but-empty view is a hit. Unreadable entries are misses.
pub fn resolve(
    ctx: &WidgetContext,
    shared: &dyn KeyValueStore,
    fallback: &dyn KeyValueStore,
) -> Resolution {
    if let Some(pinned) = &ctx.pinned_collection_id {
        let key = keys::cache_items(pinned);
        if let Some(cached) = lookup(shared, &key) {
            return Resolution::cached(ResolutionSource::PinnedShared, cached);
        }
        if let Some(cached) = lookup(fallback, &key) {
            return Resolution::cached(ResolutionSource::PinnedFallback, cached);
        }
    } else if let Some(active) = &ctx.active_collection_id {
        if let Some((tier, cached)) = lookup_tiers(shared, fallback, &keys::cache_items(active)) {
            return Resolution::cached(ResolutionSource::Active { tier }, cached);
        }
    }

    if let Some((tier, cached)) = lookup_tiers(shared, fallback, keys::CACHE_LATEST) {
        return Resolution::cached(ResolutionSource::Latest { tier }, cached);
    }

    if ctx.authenticated {
        Resolution {
            source: ResolutionSource::Empty,
            state: WidgetState::AuthenticatedNoData,
            collection_id: None,
            records: Vec::new(),
        }
    } else {
        Resolution {
            source: ResolutionSource::Demo,
            state: WidgetState::Unauthenticated,
            collection_id: None,
            records: demo_records(),
        }
    }
}

fn lookup(store: &dyn KeyValueStore, key: &str) -> Option<CachedView> {
    let bytes = store.get(key).ok().flatten()?;
    CachedView::from_bytes(&bytes).ok()
}

fn lookup_tiers(
    shared: &dyn KeyValueStore,
    fallback: &dyn KeyValueStore,
    key: &str,
) -> Option<(Tier, CachedView)> {
    lookup(shared, key)
        .map(|cached| (Tier::Shared, cached))
        .or_else(|| lookup(fallback, key).map(|cached| (Tier::Fallback, cached)))
}

/// Static content shown before the user connects a workspace.
pub fn demo_records() -> Vec<Record> {
    let created = Utc
        .with_ymd_and_hms(2024, 1, 1, 9, 0, 0)
        .single()
        .unwrap_or_default();
    vec![
        Record::new("demo-1", "Connect your workspace", created)
            .with_status(Status::InProgress)
            .with_priority(Priority::High),
        Record::new("demo-2", "Pick a task list to pin here", created)
            .with_priority(Priority::Medium),
        Record::new("demo-3", "Tap a task to open it", created).with_status(Status::Done),
    ]
}

/// Re-check intervals per widget state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub has_data: Duration,
    pub no_data: Duration,
    pub unauthenticated: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            has_data: Duration::from_secs(5 * 60),
            no_data: Duration::from_secs(2 * 60),
            unauthenticated: Duration::from_secs(15 * 60),
        }
    }
}

impl RefreshPolicy {
    pub fn interval(&self, state: WidgetState) -> Duration {
        match state {
            WidgetState::HasData => self.has_data,
            WidgetState::AuthenticatedNoData => self.no_data,
            WidgetState::Unauthenticated => self.unauthenticated,
        }
    }

    /// When the widget should resolve again.
    pub fn next_refresh_at(&self, state: WidgetState, now: Timestamp) -> Timestamp {
        let secs = i64::try_from(self.interval(state).as_secs()).unwrap_or(i64::MAX);
        now + chrono::Duration::seconds(secs)
    }
}
