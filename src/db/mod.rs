use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub mod memory;
pub mod models;

pub const REQUESTS: &str = "donation_requests";
pub const ORGANIZATIONS: &str = "organizations";
pub const STORIES: &str = "impact_stories";

/// Failure classes of the hosted document store. `IndexMissing` and
/// `PermissionDenied` are configuration problems, not user errors;
/// only `Unavailable` is safe to retry.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("query requires a secondary index: {0}")]
    IndexMissing(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("document not found")]
    NotFound,

    #[error("store error: {0}")]
    Unknown(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Equality filter on a top-level document field.
#[derive(Debug, Clone, Serialize)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter {
            field: field.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
        sort: &[SortKey],
        limit: Option<usize>,
    ) -> Result<Vec<Value>, StoreError>;

    /// Returns `NotFound` when the id does not exist in the collection.
    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Value, StoreError>;

    async fn create(&self, collection: &str, id: &str, doc: &Value) -> Result<(), StoreError>;

    async fn update(&self, collection: &str, id: &str, doc: &Value) -> Result<(), StoreError>;
}

/// Select the store backend from the environment. Development runs against
/// the in-memory store unless DOCSTORE_URL is set; production requires it.
pub fn init_store() -> anyhow::Result<Arc<dyn DocumentStore>> {
    let env_mode = env::var("RUST_ENV").unwrap_or_else(|_| "development".to_string());

    match env::var("DOCSTORE_URL") {
        Ok(url) => {
            let api_key = env::var("DOCSTORE_API_KEY")
                .map_err(|_| anyhow::anyhow!("DOCSTORE_API_KEY must be set with DOCSTORE_URL"))?;
            Ok(Arc::new(HttpDocumentStore::new(url, api_key)?))
        }
        Err(_) if env_mode != "production" => {
            tracing::warn!("DOCSTORE_URL not set; using in-memory store");
            Ok(Arc::new(memory::MemoryStore::new()))
        }
        Err(_) => Err(anyhow::anyhow!("DOCSTORE_URL must be set in production")),
    }
}

/// Client for the hosted document database's REST API.
pub struct HttpDocumentStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct QueryBody<'a> {
    filters: &'a [Filter],
    sort: &'a [SortKey],
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<usize>,
}

impl HttpDocumentStore {
    pub fn new(base_url: String, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(HttpDocumentStore {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    /// Map an upstream error response onto the store taxonomy. The hosted
    /// store reports a missing secondary index as a 400 with FAILED_PRECONDITION.
    async fn classify(resp: reqwest::Response) -> StoreError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        match status.as_u16() {
            400 | 412 if body.contains("FAILED_PRECONDITION") || body.contains("index") => {
                StoreError::IndexMissing(body)
            }
            401 | 403 => StoreError::PermissionDenied(body),
            404 => StoreError::NotFound,
            408 | 429 | 500..=599 => StoreError::Unavailable(format!("{}: {}", status, body)),
            _ => StoreError::Unknown(format!("{}: {}", status, body)),
        }
    }

    fn transport(e: reqwest::Error) -> StoreError {
        // Connection and timeout failures are transient by definition.
        StoreError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
        sort: &[SortKey],
        limit: Option<usize>,
    ) -> Result<Vec<Value>, StoreError> {
        let body = QueryBody { filters, sort, limit };
        let resp = self
            .client
            .post(self.url(&format!("{}:query", collection)))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::transport)?;

        if !resp.status().is_success() {
            return Err(Self::classify(resp).await);
        }

        resp.json::<Vec<Value>>()
            .await
            .map_err(|e| StoreError::Unknown(format!("malformed query response: {}", e)))
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Value, StoreError> {
        let resp = self
            .client
            .get(self.url(&format!("{}/{}", collection, id)))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(Self::transport)?;

        if !resp.status().is_success() {
            return Err(Self::classify(resp).await);
        }

        resp.json::<Value>()
            .await
            .map_err(|e| StoreError::Unknown(format!("malformed document: {}", e)))
    }

    async fn create(&self, collection: &str, id: &str, doc: &Value) -> Result<(), StoreError> {
        let resp = self
            .client
            .post(self.url(&format!("{}/{}", collection, id)))
            .bearer_auth(&self.api_key)
            .json(doc)
            .send()
            .await
            .map_err(Self::transport)?;

        if !resp.status().is_success() {
            return Err(Self::classify(resp).await);
        }
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, doc: &Value) -> Result<(), StoreError> {
        let resp = self
            .client
            .patch(self.url(&format!("{}/{}", collection, id)))
            .bearer_auth(&self.api_key)
            .json(doc)
            .send()
            .await
            .map_err(Self::transport)?;

        if !resp.status().is_success() {
            return Err(Self::classify(resp).await);
        }
        Ok(())
    }
}
