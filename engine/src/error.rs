//! Error types for the Taskdeck engine.

use crate::{CollectionId, RecordId};
use thiserror::Error;

/// All possible errors from the Taskdeck engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Registry errors
    #[error("collection not found: {0}")]
    CollectionNotFound(CollectionId),

    #[error("collection already configured: {0}")]
    DuplicateCollection(String),

    #[error("remote collection id must not be empty")]
    EmptyRemoteId,

    #[error("remote collection id '{0}' is reserved")]
    ReservedRemoteId(String),

    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    // Decoding errors
    #[error("malformed response: {0}")]
    Parse(String),

    #[error("no property resolves to {0}")]
    UnresolvedField(String),

    #[error("invalid cached view: {0}")]
    InvalidCachedView(String),

    #[error("invalid stored value for '{key}': {reason}")]
    InvalidStoredValue { key: String, reason: String },

    // Store errors
    #[error("storage unavailable: {0}")]
    Storage(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
