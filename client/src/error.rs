//! Unified error handling for the client.

use serde::Serialize;

/// Everything a sync, mutation, or registry operation can fail with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Missing or rejected API key. Cleared by the next successful configure.
    #[error("Not authorized: {0}")]
    Auth(String),

    /// Transport failure. Never retried automatically.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote API error ({status}): {message}")]
    RemoteApi { status: u16, message: String },

    /// Response arrived but could not be decoded.
    #[error("Malformed response: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Engine error: {0}")]
    Engine(taskdeck_engine::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid deep link: {0}")]
    DeepLink(#[from] crate::deeplink::DeepLinkError),

    /// A background sync task stopped before finishing.
    #[error("Sync task cancelled: {0}")]
    Cancelled(String),
}

impl SyncError {
    /// Text for the dismissible error banner.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Auth(_) => {
                "Your workspace connection was rejected. Check the API key and try again."
                    .to_string()
            }
            SyncError::Network(_) => {
                "Couldn't reach the server. Check your connection and retry.".to_string()
            }
            SyncError::RemoteApi { message, .. } if !message.is_empty() => message.clone(),
            SyncError::RemoteApi { status, .. } => format!("The server returned an error ({status})."),
            SyncError::Parse(_) => "The server sent something unexpected. Your list was kept as is."
                .to_string(),
            SyncError::Storage(_) => "Couldn't save to this device.".to_string(),
            SyncError::Engine(e) => e.to_string(),
            SyncError::NotFound(what) => format!("{what} no longer exists."),
            SyncError::DeepLink(e) => format!("Can't open that link: {e}."),
            SyncError::Cancelled(_) => "Sync was interrupted. Pull to refresh.".to_string(),
        }
    }

    /// Whether a later retry could succeed without user action.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Network(_))
            || matches!(self, SyncError::RemoteApi { status, .. } if *status == 429 || *status >= 500)
    }
}

impl From<taskdeck_engine::Error> for SyncError {
    fn from(e: taskdeck_engine::Error) -> Self {
        match e {
            taskdeck_engine::Error::Parse(msg) => SyncError::Parse(msg),
            taskdeck_engine::Error::Storage(msg) => SyncError::Storage(msg),
            taskdeck_engine::Error::CollectionNotFound(id) => {
                SyncError::NotFound(format!("Collection {id}"))
            }
            taskdeck_engine::Error::RecordNotFound(id) => SyncError::NotFound(format!("Task {id}")),
            other => SyncError::Engine(other),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SyncError::Parse(e.to_string())
        } else {
            SyncError::Network(e.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        SyncError::Storage(e.to_string())
    }
}

/// Error as shown to the interactive surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBanner {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&SyncError> for ErrorBanner {
    fn from(e: &SyncError) -> Self {
        let details = match e {
            SyncError::RemoteApi { .. } | SyncError::Engine(_) | SyncError::NotFound(_) => None,
            other => Some(other.to_string()),
        };
        Self {
            message: e.user_message(),
            details,
        }
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, SyncError>;
