//! # Taskdeck Engine
//!
//! The deterministic core behind Taskdeck's task lists and widget.
//!
//! This crate holds everything that must behave identically on the
//! interactive surface and inside the resource-constrained widget: the record
//! model, decoding of remote records, preferences, the view engine, the
//! cached-view format, and the widget's resolution algorithm.
//!
//! ## Design Principles
//!
//! - **No IO**: The engine knows nothing about files, network, or platform;
//!   persistence goes through the [`KeyValueStore`] trait
//! - **Deterministic**: [`derive`] on the same input always yields the same bytes
//! - **Lenient decoding**: one malformed remote record never costs the others
//! - **Portable**: The widget host can link the engine through [`ffi`]
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] is one task: id, title, [`Status`], optional [`Priority`],
//! optional [`DueDate`], and timestamps. Records carrying an unconfirmed local
//! edit have `pending_since` set.
//!
//! ### Collections
//!
//! The [`Registry`] holds the configured remote collections, which one is
//! active, and which one is pinned for the widget.
//!
//! ### Derived views
//!
//! [`derive`] filters and sorts records under [`Preferences`]. The result is
//! published as a [`CachedView`] under `cache.items.<remoteId>` and
//! `cache.items.latest` in two storage tiers.
//!
//! ### Resolution
//!
//! [`resolve`] is the widget's read path: pinned collection, active collection,
//! most-recent entry, then an explicit empty state or demo content.
//!
//! ## Quick Start
//!
//! ```rust
//! use taskdeck_engine::{derive, Preferences, Priority, Record, Status};
//! use chrono::{TimeZone, Utc};
//!
//! let created = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
//! let records = vec![
//!     Record::new("r1", "Write report", created).with_status(Status::Done),
//!     Record::new("r2", "Call vendor", created).with_priority(Priority::Urgent),
//! ];
//!
//! let prefs = Preferences::default().with_status_filter([Status::NotStarted]);
//! let view = derive(&records, &prefs);
//! assert_eq!(view.ids(), vec!["r2"]);
//! ```

pub mod cache;
pub mod codec;
pub mod error;
pub mod ffi;
pub mod fields;
pub mod kv;
pub mod preferences;
pub mod property;
pub mod raw_cache;
pub mod record;
pub mod registry;
pub mod resolution;
pub mod schema;
pub mod view;

// Re-export main types at crate root
pub use cache::{CachedView, CACHE_FORMAT_VERSION};
pub use codec::{encode_patch, Diagnostic, PropertyExtractor, QueryPage};
pub use error::Error;
pub use fields::{FieldCandidates, FieldResolver, ResolvedField, ResolvedFields, SemanticField};
pub use kv::{KeyValueStore, MemoryStore};
pub use preferences::{Preferences, SortDirection, SortKey, SortSpec};
pub use property::{decode_properties, PropertyKind, PropertyMap, PropertyValue};
pub use raw_cache::{PatchId, PendingPatch, RawCache, Settlement};
pub use record::{DueDate, Priority, Record, RecordPatch, Status, UNTITLED};
pub use registry::{Collection, Registry, Removal, Update};
pub use resolution::{
    demo_records, resolve, RefreshPolicy, Resolution, ResolutionSource, Tier, WidgetContext,
    WidgetState,
};
pub use schema::CollectionSchema;
pub use view::{derive, DerivedView};

/// Type aliases for clarity
pub type RecordId = String;
pub type RemoteId = String;
pub type CollectionId = uuid::Uuid;
pub type Timestamp = chrono::DateTime<chrono::Utc>;
