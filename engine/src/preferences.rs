//! Sort and filter preferences.

use crate::{
    error::Result,
    kv::{get_json, keys, set_json, KeyValueStore},
    Priority, Status,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Field a view can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    Title,
    Status,
    Priority,
    DueDate,
    CreatedAt,
    UpdatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Primary and secondary sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortSpec {
    pub primary: SortKey,
    pub primary_direction: SortDirection,
    pub secondary: SortKey,
    pub secondary_direction: SortDirection,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            primary: SortKey::DueDate,
            primary_direction: SortDirection::Ascending,
            secondary: SortKey::Priority,
            secondary_direction: SortDirection::Descending,
        }
    }
}

/// User preferences driving the derived view.
///
/// Filter sets list what is shown. Both default to every variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub sort: SortSpec,
    pub status_filter: BTreeSet<Status>,
    pub priority_filter: BTreeSet<Priority>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            sort: SortSpec::default(),
            status_filter: Status::ALL.into_iter().collect(),
            priority_filter: Priority::ALL.into_iter().collect(),
        }
    }
}

impl Preferences {
    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_status_filter(mut self, statuses: impl IntoIterator<Item = Status>) -> Self {
        self.status_filter = statuses.into_iter().collect();
        self
    }

    pub fn with_priority_filter(mut self, priorities: impl IntoIterator<Item = Priority>) -> Self {
        self.priority_filter = priorities.into_iter().collect();
        self
    }

    /// Hide or show one status.
    pub fn toggle_status(&mut self, status: Status) {
        if !self.status_filter.remove(&status) {
            self.status_filter.insert(status);
        }
    }

    /// Hide or show one priority.
    pub fn toggle_priority(&mut self, priority: Priority) {
        if !self.priority_filter.remove(&priority) {
            self.priority_filter.insert(priority);
        }
    }

    /// Load preferences. Missing keys fall back to defaults individually.
    pub fn load(store: &dyn KeyValueStore) -> Result<Self> {
        let defaults = Preferences::default();
        Ok(Self {
            sort: get_json(store, keys::PREFERENCES_SORT)?.unwrap_or(defaults.sort),
            status_filter: get_json(store, keys::PREFERENCES_STATUS_FILTER)?
                .unwrap_or(defaults.status_filter),
            priority_filter: get_json(store, keys::PREFERENCES_PRIORITY_FILTER)?
                .unwrap_or(defaults.priority_filter),
        })
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        set_json(store, keys::PREFERENCES_SORT, &self.sort)?;
        set_json(store, keys::PREFERENCES_STATUS_FILTER, &self.status_filter)?;
        set_json(store, keys::PREFERENCES_PRIORITY_FILTER, &self.priority_filter)
    }
}
