//! Taskdeck Client - the IO side of Taskdeck.
//!
//! Talks to the remote API, persists settings and derived views in the two
//! storage tiers, and exposes the widget's read path. All deterministic logic
//! lives in `taskdeck-engine`.

pub mod config;
pub mod context;
pub mod deeplink;
pub mod error;
pub mod publisher;
pub mod remote;
pub mod storage;
pub mod telemetry;
pub mod widget;

use std::sync::Arc;

pub use config::{Config, ConfigError};
pub use context::{Resync, SyncContext};
pub use deeplink::{route, DeepLink, DeepLinkError, Route};
pub use error::{ErrorBanner, Result, SyncError};
pub use publisher::{CachePublisher, ViewUpdate};
pub use remote::{FetchedRecords, HttpAdapter, RemoteAdapter};
pub use storage::FileStore;
pub use widget::{TimelineEntry, WidgetReader};

/// The two storage tiers.
#[derive(Clone)]
pub struct Stores {
    pub shared: Arc<FileStore>,
    pub fallback: Arc<FileStore>,
}

impl Stores {
    /// Open both store directories from the configuration.
    pub fn open(config: &Config) -> Result<Self> {
        Ok(Self {
            shared: Arc::new(FileStore::open(&config.shared_dir)?),
            fallback: Arc::new(FileStore::open(&config.local_dir)?),
        })
    }

    pub fn publisher(&self) -> CachePublisher {
        CachePublisher::new(self.shared.clone(), self.fallback.clone())
    }

    pub fn widget_reader(&self) -> WidgetReader {
        WidgetReader::new(self.shared.clone(), self.fallback.clone())
    }
}

/// Build the sync context for a configuration.
pub fn connect(config: &Config, stores: &Stores) -> Result<SyncContext> {
    let adapter = Arc::new(HttpAdapter::new(config)?);
    SyncContext::new(adapter, stores.publisher(), config.has_api_key())
}
