//! Raw cache: the latest full record set of each collection.
//!
//! A sync replaces a collection's records wholesale. Optimistic edits still in
//! flight are then reapplied in the order they were made, so the newest local
//! edit of a field wins over whatever the remote returned.

use crate::{error::Result, Error, Record, RecordId, RecordPatch, RemoteId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier of an in-flight optimistic edit.
pub type PatchId = u64;

/// A local edit waiting for the remote to answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPatch {
    pub id: PatchId,
    pub record_id: RecordId,
    pub patch: RecordPatch,
    pub since: Timestamp,
}

/// How an in-flight edit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Confirmed,
    Failed,
}

/// Per-collection record sets plus in-flight edits.
#[derive(Debug, Clone, Default)]
pub struct RawCache {
    records: HashMap<RemoteId, Vec<Record>>,
    pending: HashMap<RemoteId, Vec<PendingPatch>>,
    next_patch_id: PatchId,
}

impl RawCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records of a collection, in remote order. `None` if never synced.
    pub fn records(&self, collection: &str) -> Option<&[Record]> {
        self.records.get(collection).map(Vec::as_slice)
    }

    pub fn contains(&self, collection: &str) -> bool {
        self.records.contains_key(collection)
    }

    /// In-flight edits of a collection, oldest first.
    pub fn pending(&self, collection: &str) -> &[PendingPatch] {
        self.pending
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Replace a collection's records and reapply in-flight edits.
    pub fn replace(&mut self, collection: &str, mut records: Vec<Record>) {
        for pending in self.pending(collection) {
            if let Some(record) = records.iter_mut().find(|r| r.id == pending.record_id) {
                pending.patch.apply_to(record);
                record.pending_since = Some(
                    record
                        .pending_since
                        .map_or(pending.since, |since| since.min(pending.since)),
                );
            }
        }
        self.records.insert(collection.to_string(), records);
    }

    /// Apply an edit locally before the remote confirms it.
    pub fn apply_optimistic(
        &mut self,
        collection: &str,
        record_id: &str,
        patch: RecordPatch,
        now: Timestamp,
    ) -> Result<PatchId> {
        let record = self
            .records
            .get_mut(collection)
            .and_then(|records| records.iter_mut().find(|r| r.id == record_id))
            .ok_or_else(|| Error::RecordNotFound(record_id.to_string()))?;

        patch.apply_to(record);
        record.pending_since.get_or_insert(now);

        self.next_patch_id += 1;
        let id = self.next_patch_id;
        self.pending
            .entry(collection.to_string())
            .or_default()
            .push(PendingPatch {
                id,
                record_id: record_id.to_string(),
                patch,
                since: now,
            });
        Ok(id)
    }

    /// Stop tracking an in-flight edit.
    ///
    /// Neither outcome rolls the local value back. A confirmed edit clears the
    /// record's optimistic flag once nothing else is in flight for it; a failed
    /// one leaves the flag set until the next sync replaces the record.
    pub fn settle(&mut self, collection: &str, patch_id: PatchId, outcome: Settlement) {
        let Some(pending) = self.pending.get_mut(collection) else {
            return;
        };
        let Some(index) = pending.iter().position(|p| p.id == patch_id) else {
            return;
        };
        let settled = pending.remove(index);
        let still_pending = pending.iter().any(|p| p.record_id == settled.record_id);
        if pending.is_empty() {
            self.pending.remove(collection);
        }

        if outcome == Settlement::Confirmed && !still_pending {
            if let Some(record) = self
                .records
                .get_mut(collection)
                .and_then(|records| records.iter_mut().find(|r| r.id == settled.record_id))
            {
                record.pending_since = None;
            }
        }
    }

    /// Drop a collection and its in-flight edits.
    pub fn remove(&mut self, collection: &str) {
        self.records.remove(collection);
        self.pending.remove(collection);
    }
}
