//! Record types for task items.

use crate::{RecordId, Timestamp};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Title used when the remote record carries no usable title.
pub const UNTITLED: &str = "Untitled";

/// Workflow status of a task.
///
/// Serialized as its canonical label so cached views stay readable by hosts
/// that never link the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "Not started")]
    NotStarted,
    #[serde(rename = "In progress")]
    InProgress,
    #[serde(rename = "Blocked")]
    Blocked,
    #[serde(rename = "In review")]
    InReview,
    #[serde(rename = "Done")]
    Done,
    #[serde(rename = "Cancelled")]
    Cancelled,
}

impl Status {
    /// Every status, in declaration order.
    pub const ALL: [Status; 6] = [
        Status::NotStarted,
        Status::InProgress,
        Status::Blocked,
        Status::InReview,
        Status::Done,
        Status::Cancelled,
    ];

    /// Canonical display label.
    pub fn label(self) -> &'static str {
        match self {
            Status::NotStarted => "Not started",
            Status::InProgress => "In progress",
            Status::Blocked => "Blocked",
            Status::InReview => "In review",
            Status::Done => "Done",
            Status::Cancelled => "Cancelled",
        }
    }

    /// Match a remote option name against the canonical labels and known aliases.
    ///
    /// Returns `None` for anything unrecognized; callers decide the default.
    pub fn parse(name: &str) -> Option<Status> {
        let normalized = normalize(name);
        let status = match normalized.as_str() {
            "not started" | "to do" | "todo" | "backlog" | "new" | "open" => Status::NotStarted,
            "in progress" | "doing" | "started" | "active" => Status::InProgress,
            "blocked" | "on hold" | "stuck" => Status::Blocked,
            "in review" | "review" | "reviewing" => Status::InReview,
            "done" | "complete" | "completed" | "finished" | "closed" => Status::Done,
            "cancelled" | "canceled" | "won't do" | "wont do" | "archived" => Status::Cancelled,
            _ => return None,
        };
        Some(status)
    }

    /// Whether the task counts as finished for toggle purposes.
    pub fn is_complete(self) -> bool {
        matches!(self, Status::Done | Status::Cancelled)
    }

    /// The status a checkbox-style toggle moves to.
    pub fn toggled(self) -> Status {
        if self.is_complete() {
            Status::NotStarted
        } else {
            Status::Done
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Every priority, lowest first.
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Urgent,
    ];

    /// Canonical display label.
    pub fn label(self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Urgent => "Urgent",
        }
    }

    /// Ordinal used for sorting. Absent priority ranks 0.
    pub fn rank(priority: Option<Priority>) -> u8 {
        match priority {
            None => 0,
            Some(Priority::Low) => 1,
            Some(Priority::Medium) => 2,
            Some(Priority::High) => 3,
            Some(Priority::Urgent) => 4,
        }
    }

    /// Match a remote option name against the canonical labels and known aliases.
    pub fn parse(name: &str) -> Option<Priority> {
        let normalized = normalize(name);
        let priority = match normalized.as_str() {
            "low" | "p3" | "minor" => Priority::Low,
            "medium" | "normal" | "p2" => Priority::Medium,
            "high" | "important" | "p1" => Priority::High,
            "urgent" | "critical" | "highest" | "p0" => Priority::Urgent,
            _ => return None,
        };
        Some(priority)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn normalize(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// A due date: either a calendar day or a precise instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DueDate {
    At(DateTime<Utc>),
    Day(NaiveDate),
}

impl DueDate {
    /// Parse an ISO-8601 date (`2024-05-01`) or RFC 3339 date-time.
    pub fn parse(raw: &str) -> Option<DueDate> {
        let raw = raw.trim();
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return Some(DueDate::At(at.with_timezone(&Utc)));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .map(DueDate::Day)
    }

    /// The instant this due date sorts at. Calendar days sort at midnight UTC.
    pub fn instant(&self) -> DateTime<Utc> {
        match self {
            DueDate::At(at) => *at,
            DueDate::Day(day) => day.and_time(NaiveTime::MIN).and_utc(),
        }
    }

    /// Wire representation: `YYYY-MM-DD` for days, RFC 3339 otherwise.
    pub fn to_wire(&self) -> String {
        match self {
            DueDate::At(at) => at.to_rfc3339(),
            DueDate::Day(day) => day.format("%Y-%m-%d").to_string(),
        }
    }
}

impl Ord for DueDate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.instant().cmp(&other.instant()).then_with(|| {
            // Same instant: the calendar day sorts before the precise time.
            match (self, other) {
                (DueDate::Day(_), DueDate::At(_)) => Ordering::Less,
                (DueDate::At(_), DueDate::Day(_)) => Ordering::Greater,
                _ => Ordering::Equal,
            }
        })
    }
}

impl PartialOrd for DueDate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A task item in a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Remote-stable identifier, unique within its collection
    pub id: RecordId,
    pub title: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<DueDate>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Set while the record carries a local edit the remote has not confirmed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_since: Option<Timestamp>,
}

impl Record {
    /// Create a record with default status and no optional fields.
    pub fn new(id: impl Into<RecordId>, title: impl Into<String>, created_at: Timestamp) -> Self {
        let title = title.into();
        Self {
            id: id.into(),
            title: if title.trim().is_empty() {
                UNTITLED.to_string()
            } else {
                title
            },
            status: Status::NotStarted,
            priority: None,
            due: None,
            created_at,
            updated_at: created_at,
            pending_since: None,
        }
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_due(mut self, due: DueDate) -> Self {
        self.due = Some(due);
        self
    }

    /// Whether a local edit is waiting on remote confirmation.
    pub fn is_optimistic(&self) -> bool {
        self.pending_since.is_some()
    }
}

/// A single-field edit to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum RecordPatch {
    Status(Status),
    Priority(Option<Priority>),
    DueDate(Option<DueDate>),
    Title(String),
}

impl RecordPatch {
    /// Write the patched field into `record`.
    pub fn apply_to(&self, record: &mut Record) {
        match self {
            RecordPatch::Status(status) => record.status = *status,
            RecordPatch::Priority(priority) => record.priority = *priority,
            RecordPatch::DueDate(due) => record.due = *due,
            RecordPatch::Title(title) => {
                record.title = if title.trim().is_empty() {
                    UNTITLED.to_string()
                } else {
                    title.clone()
                }
            }
        }
    }

    /// Whether two patches touch the same field.
    pub fn same_field(&self, other: &RecordPatch) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}
