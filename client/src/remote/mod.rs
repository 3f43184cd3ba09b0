//! Remote adapter.
//!
//! The only component that talks to the remote API. It has no cache side
//! effects and never retries on its own; callers decide when to try again.

mod http;

pub use http::HttpAdapter;

use crate::error::Result;
use async_trait::async_trait;
use taskdeck_engine::{CollectionSchema, Diagnostic, Record, RecordPatch};

/// Records of one collection as returned by a full fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedRecords {
    /// Remote baseline order (creation time, newest first)
    pub records: Vec<Record>,
    /// Values defaulted or pages skipped while decoding
    pub diagnostics: Vec<Diagnostic>,
}

/// Access to a remote collection store.
#[async_trait]
pub trait RemoteAdapter: Send + Sync {
    /// Describe a collection's properties.
    async fn fetch_schema(&self, collection: &str) -> Result<CollectionSchema>;

    /// Fetch every record of a collection.
    async fn fetch_records(&self, collection: &str) -> Result<FetchedRecords>;

    /// Write one field of one record.
    async fn mutate(&self, collection: &str, record_id: &str, patch: &RecordPatch) -> Result<()>;
}
