//! Cached view artifacts.
//!
//! A [`CachedView`] is what the interactive surface writes for the widget to
//! read: one derived view, tagged with the collection it came from. The
//! encoding carries no timestamps, so the same view always produces the same
//! bytes.

use crate::{error::Result, DerivedView, Error, Record, RemoteId};
use serde::{Deserialize, Serialize};

/// Version of the cached view format for future compatibility.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// A derived view as persisted in the cache tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedView {
    pub format_version: u32,
    /// Remote id of the collection the view was derived from
    pub collection_id: RemoteId,
    pub records: Vec<Record>,
}

impl CachedView {
    pub fn new(collection_id: impl Into<RemoteId>, view: &DerivedView) -> Self {
        Self {
            format_version: CACHE_FORMAT_VERSION,
            collection_id: collection_id.into(),
            records: view.records.clone(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::InvalidCachedView(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let cached: Self =
            serde_json::from_slice(bytes).map_err(|e| Error::InvalidCachedView(e.to_string()))?;

        if cached.format_version > CACHE_FORMAT_VERSION {
            return Err(Error::InvalidCachedView(format!(
                "unsupported cache format version: {} (max supported: {})",
                cached.format_version, CACHE_FORMAT_VERSION
            )));
        }

        Ok(cached)
    }

    pub fn view(&self) -> DerivedView {
        DerivedView {
            records: self.records.clone(),
        }
    }
}
