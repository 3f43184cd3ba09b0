//! The view engine: `(records, preferences) -> ordered, filtered records`.
//!
//! [`derive`] is a pure function. The widget never recomputes a view; it
//! reads what the interactive surface published, so both sides depend on the
//! same input always producing the same output.

use crate::{Preferences, Priority, Record, SortDirection, SortKey};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Filtered, sorted projection of a collection's records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedView {
    pub records: Vec<Record>,
}

impl DerivedView {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.id.as_str()).collect()
    }
}

/// Whether a record passes the preference filters.
///
/// Records without a priority are never hidden by the priority filter.
pub fn matches(record: &Record, prefs: &Preferences) -> bool {
    prefs.status_filter.contains(&record.status)
        && record
            .priority
            .map_or(true, |p| prefs.priority_filter.contains(&p))
}

/// Compare two records on one key.
pub fn compare(a: &Record, b: &Record, key: SortKey, direction: SortDirection) -> Ordering {
    let ordering = match key {
        SortKey::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        SortKey::Status => a.status.label().cmp(b.status.label()),
        SortKey::Priority => Priority::rank(a.priority).cmp(&Priority::rank(b.priority)),
        SortKey::DueDate => match (&a.due, &b.due) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
        SortKey::UpdatedAt => a.updated_at.cmp(&b.updated_at),
    };

    match direction {
        SortDirection::Ascending => ordering,
        SortDirection::Descending => ordering.reverse(),
    }
}

/// Derive the view of `records` under `prefs`.
///
/// Ties on both sort keys keep their input order.
pub fn derive(records: &[Record], prefs: &Preferences) -> DerivedView {
    let sort = prefs.sort;
    let mut records: Vec<Record> = records
        .iter()
        .filter(|r| matches(r, prefs))
        .cloned()
        .collect();

    records.sort_by(|a, b| {
        compare(a, b, sort.primary, sort.primary_direction)
            .then_with(|| compare(a, b, sort.secondary, sort.secondary_direction))
    });

    DerivedView { records }
}
