//! Widget reader.
//!
//! What the widget process runs on each scheduled refresh: load the
//! denormalized context, resolve against the two cache tiers, and schedule
//! the next check. It only reads keys; it never touches the network.

use std::sync::Arc;

use serde::Serialize;
use taskdeck_engine::{
    resolve, KeyValueStore, RefreshPolicy, Resolution, Timestamp, WidgetContext,
};

use crate::deeplink::DeepLink;

/// One rendered widget state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub context: WidgetContext,
    pub resolution: Resolution,
    pub next_refresh_at: Timestamp,
    /// Where tapping the widget body goes
    pub open_url: String,
    /// Editor link per shown record, same order as the records
    pub edit_urls: Vec<String>,
}

/// Read-only view of the published caches.
pub struct WidgetReader {
    shared: Arc<dyn KeyValueStore>,
    fallback: Arc<dyn KeyValueStore>,
    policy: RefreshPolicy,
}

impl WidgetReader {
    pub fn new(shared: Arc<dyn KeyValueStore>, fallback: Arc<dyn KeyValueStore>) -> Self {
        Self {
            shared,
            fallback,
            policy: RefreshPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Resolve what to show now and when to look again.
    pub fn timeline(&self, now: Timestamp) -> TimelineEntry {
        let context = WidgetContext::load(self.shared.as_ref());
        let resolution = resolve(&context, self.shared.as_ref(), self.fallback.as_ref());
        let next_refresh_at = self.policy.next_refresh_at(resolution.state, now);

        // Demo records have no remote counterpart to edit.
        let collection = resolution.collection_id.as_deref();
        let edit_urls = match collection {
            Some(_) => resolution
                .records
                .iter()
                .map(|r| DeepLink::edit(&r.id, collection).to_string())
                .collect(),
            None => Vec::new(),
        };
        let open_url = DeepLink::open(collection).to_string();

        tracing::debug!(
            source = ?resolution.source,
            state = ?resolution.state,
            records = resolution.records.len(),
            %next_refresh_at,
            "Widget resolved"
        );

        TimelineEntry {
            context,
            resolution,
            next_refresh_at,
            open_url,
            edit_urls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use taskdeck_engine::{
        kv::keys, CachedView, DerivedView, MemoryStore, Record, ResolutionSource, WidgetState,
    };

    #[test]
    fn unauthenticated_shows_demo_for_fifteen_minutes() {
        let reader = WidgetReader::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()));
        let now = Utc.timestamp_opt(1_000, 0).unwrap();

        let entry = reader.timeline(now);
        assert_eq!(entry.resolution.source, ResolutionSource::Demo);
        assert_eq!(entry.next_refresh_at, Utc.timestamp_opt(1_900, 0).unwrap());
        assert!(entry.edit_urls.is_empty());
        assert_eq!(entry.open_url, "taskdeck://open");
    }

    #[test]
    fn fallback_tier_serves_the_active_collection() {
        let created = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let view = DerivedView {
            records: vec![Record::new("r1", "Water plants", created)],
        };
        let shared = MemoryStore::from_entries([
            (keys::REGISTRY_ACTIVE_ID, "\"db-1\""),
            (keys::AUTH_CONFIGURED, "true"),
        ]);
        let fallback = MemoryStore::new();
        fallback
            .set(
                &keys::cache_items("db-1"),
                &CachedView::new("db-1", &view).to_bytes().unwrap(),
            )
            .unwrap();

        let reader = WidgetReader::new(Arc::new(shared), Arc::new(fallback));
        let entry = reader.timeline(Utc.timestamp_opt(0, 0).unwrap());

        assert_eq!(entry.resolution.state, WidgetState::HasData);
        assert_eq!(
            entry.edit_urls,
            vec!["taskdeck://edit?record=r1&collection=db-1"]
        );
        assert_eq!(entry.next_refresh_at, Utc.timestamp_opt(300, 0).unwrap());
    }
}
