//! Deep links from the widget into the interactive surface.
//!
//! `taskdeck://open?collection=<remoteId>` shows a collection's list and
//! `taskdeck://edit?record=<recordId>&collection=<remoteId>` opens the editor.
//! Both switch the active collection before anything is rendered.

use std::fmt;
use std::str::FromStr;

use reqwest::Url;
use taskdeck_engine::{Collection, DerivedView, RecordId, RemoteId};

use crate::context::SyncContext;
use crate::error::{Result, SyncError};

pub const SCHEME: &str = "taskdeck";

/// A parsed deep link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeepLink {
    Open {
        collection: Option<RemoteId>,
    },
    Edit {
        record: RecordId,
        collection: Option<RemoteId>,
    },
}

/// Why a URL is not a deep link.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeepLinkError {
    #[error("malformed URL: {0}")]
    Invalid(String),

    #[error("not a taskdeck:// URL: {0}")]
    Scheme(String),

    #[error("unknown deep link action: {0}")]
    Action(String),

    #[error("edit link without a record id")]
    MissingRecord,
}

impl DeepLink {
    pub fn open(collection: Option<&str>) -> Self {
        DeepLink::Open {
            collection: collection.map(str::to_string),
        }
    }

    pub fn edit(record: &str, collection: Option<&str>) -> Self {
        DeepLink::Edit {
            record: record.to_string(),
            collection: collection.map(str::to_string),
        }
    }

    pub fn collection(&self) -> Option<&str> {
        match self {
            DeepLink::Open { collection } | DeepLink::Edit { collection, .. } => {
                collection.as_deref()
            }
        }
    }

    fn action(&self) -> &'static str {
        match self {
            DeepLink::Open { .. } => "open",
            DeepLink::Edit { .. } => "edit",
        }
    }

    /// Build the link as a URL.
    pub fn to_url(&self) -> std::result::Result<Url, DeepLinkError> {
        let base = format!("{SCHEME}://{}", self.action());
        let mut url = Url::parse(&base).map_err(|e| DeepLinkError::Invalid(e.to_string()))?;

        let mut params = Vec::new();
        if let DeepLink::Edit { record, .. } = self {
            params.push(("record", record.as_str()));
        }
        if let Some(collection) = self.collection() {
            params.push(("collection", collection));
        }
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }
}

impl fmt::Display for DeepLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let url = self.to_url().map_err(|_| fmt::Error)?;
        f.write_str(url.as_str())
    }
}

impl FromStr for DeepLink {
    type Err = DeepLinkError;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        let url = Url::parse(raw.trim()).map_err(|e| DeepLinkError::Invalid(e.to_string()))?;
        if url.scheme() != SCHEME {
            return Err(DeepLinkError::Scheme(raw.to_string()));
        }

        let mut record = None;
        let mut collection = None;
        for (name, value) in url.query_pairs() {
            if value.is_empty() {
                continue;
            }
            match name.as_ref() {
                "record" => record = Some(value.into_owned()),
                "collection" => collection = Some(value.into_owned()),
                _ => {}
            }
        }

        match url.host_str().unwrap_or_default() {
            "open" => Ok(DeepLink::Open { collection }),
            "edit" => Ok(DeepLink::Edit {
                record: record.ok_or(DeepLinkError::MissingRecord)?,
                collection,
            }),
            other => Err(DeepLinkError::Action(other.to_string())),
        }
    }
}

/// Where the interactive surface lands after following a link.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// No collection configured yet.
    Setup,
    List {
        collection: Collection,
        view: Option<DerivedView>,
    },
    Editor {
        collection: Collection,
        record: RecordId,
    },
}

/// Follow a deep link: activate its collection, then pick the screen.
///
/// An unknown collection id is an error; a link without one uses the current
/// active collection.
pub async fn route(ctx: &SyncContext, link: &DeepLink) -> Result<Route> {
    if let Some(remote_id) = link.collection() {
        let registry = ctx.registry().await;
        let target = registry
            .find_by_remote(remote_id)
            .ok_or_else(|| SyncError::NotFound(format!("Collection {remote_id}")))?;
        let resync = ctx.set_active(target.local_id).await?;
        tracing::info!(
            collection = %remote_id,
            resyncing = resync.collections().len(),
            "Deep link activated collection"
        );
    }

    let Some((collection, view)) = ctx.active_view().await else {
        return Ok(Route::Setup);
    };

    match link {
        DeepLink::Open { .. } => Ok(Route::List { collection, view }),
        DeepLink::Edit { record, .. } => {
            if view.is_some() && !ctx.contains_record(&collection.remote_id, record).await {
                return Err(SyncError::NotFound(format!("Task {record}")));
            }
            Ok(Route::Editor {
                collection,
                record: record.clone(),
            })
        }
    }
}
