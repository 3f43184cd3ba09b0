//! HTTP implementation of [`RemoteAdapter`].

use super::{FetchedRecords, RemoteAdapter};
use crate::config::Config;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use taskdeck_engine::{
    encode_patch, CollectionSchema, PropertyExtractor, RecordPatch, RemoteId, ResolvedFields,
};

/// Records requested per query page.
pub const PAGE_SIZE: u32 = 100;

/// Remote adapter speaking the workspace REST API.
pub struct HttpAdapter {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    api_version: String,
    extractor: PropertyExtractor,
    /// Field resolution per collection, filled on first mutation
    fields: DashMap<RemoteId, ResolvedFields>,
}

impl HttpAdapter {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_version: config.api_version.clone(),
            extractor: PropertyExtractor::default(),
            fields: DashMap::new(),
        })
    }

    /// Use a custom field resolver.
    pub fn with_extractor(mut self, extractor: PropertyExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SyncError::Auth("no API key configured".into()))?;
        Ok(request
            .bearer_auth(key)
            .header("Notion-Version", &self.api_version))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let resp = self.authorized(request)?.send().await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| SyncError::Parse(format!("invalid JSON: {e}")))
    }

    async fn resolved_fields(&self, collection: &str) -> Result<ResolvedFields> {
        if let Some(fields) = self.fields.get(collection) {
            return Ok(fields.clone());
        }
        let schema = self.fetch_schema(collection).await?;
        let fields = self.extractor.resolve(&schema);
        self.fields.insert(collection.to_string(), fields.clone());
        Ok(fields)
    }
}

#[async_trait]
impl RemoteAdapter for HttpAdapter {
    async fn fetch_schema(&self, collection: &str) -> Result<CollectionSchema> {
        let url = collection_url(&self.base_url, collection);
        let body = self.send(self.client.get(url)).await?;
        let schema = CollectionSchema::from_json(&body)?;

        // Keep resolution current for later mutations.
        self.fields
            .insert(collection.to_string(), self.extractor.resolve(&schema));
        Ok(schema)
    }

    async fn fetch_records(&self, collection: &str) -> Result<FetchedRecords> {
        let url = query_url(&self.base_url, collection);
        let mut fetched = FetchedRecords::default();
        let mut cursor: Option<String> = None;

        loop {
            let body = self
                .send(self.client.post(&url).json(&query_body(cursor.as_deref())))
                .await?;
            let page = self.extractor.decode_query(&body)?;

            fetched.records.extend(page.records);
            fetched.diagnostics.extend(page.diagnostics);

            match page.next_cursor {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => break,
            }
        }

        tracing::debug!(
            collection = %collection,
            records = fetched.records.len(),
            diagnostics = fetched.diagnostics.len(),
            "Fetched records"
        );
        Ok(fetched)
    }

    async fn mutate(&self, collection: &str, record_id: &str, patch: &RecordPatch) -> Result<()> {
        let fields = self.resolved_fields(collection).await?;
        let body = encode_patch(&fields, patch)?;
        let url = page_url(&self.base_url, record_id);
        self.send(self.client.patch(url).json(&body)).await?;
        Ok(())
    }
}

fn collection_url(base: &str, collection: &str) -> String {
    format!("{base}/databases/{collection}")
}

fn query_url(base: &str, collection: &str) -> String {
    format!("{base}/databases/{collection}/query")
}

fn page_url(base: &str, record_id: &str) -> String {
    format!("{base}/pages/{record_id}")
}

/// Query body: newest first, one page at a time.
fn query_body(cursor: Option<&str>) -> Value {
    let mut body = json!({
        "page_size": PAGE_SIZE,
        "sorts": [{"timestamp": "created_time", "direction": "descending"}],
    });
    if let Some(cursor) = cursor {
        body["start_cursor"] = json!(cursor);
    }
    body
}

/// Map a non-success response to the error taxonomy.
fn api_error(status: StatusCode, body: &str) -> SyncError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SyncError::Auth(if message.is_empty() {
            status.to_string()
        } else {
            message
        }),
        _ => SyncError::RemoteApi {
            status: status.as_u16(),
            message,
        },
    }
}
