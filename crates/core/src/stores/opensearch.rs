use crate::backends::{http_client, join_endpoint};
use crate::error::StoreError;
use crate::models::{ContentType, DocumentMetadata, PreparedDocument, ScoredChunk, SearchMode};
use crate::traits::{BulkOutcome, DocumentStore};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const BACKEND: &str = "opensearch";
const EXCLUDED_SOURCE_FIELDS: [&str; 2] = ["embedding", "base64_image"];

#[derive(Debug, Clone)]
pub struct OpenSearchConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

impl Default for OpenSearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9200".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Name and version reported by the cluster root endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    pub cluster_name: String,
    pub version: String,
}

pub struct OpenSearchStore {
    client: Client,
    endpoint: String,
}

impl OpenSearchStore {
    pub fn new(config: OpenSearchConfig) -> Result<Self, StoreError> {
        Url::parse(config.endpoint.trim())?;
        Ok(Self {
            client: http_client(config.timeout)?,
            endpoint: config.endpoint,
        })
    }

    fn url(&self, path: &str) -> Result<Url, StoreError> {
        Ok(join_endpoint(&self.endpoint, path)?)
    }

    pub async fn ping(&self) -> Result<ClusterInfo, StoreError> {
        let response = self.client.get(self.url("")?).send().await?;
        let body = checked_json(response).await?;
        Ok(ClusterInfo {
            cluster_name: string_at(&body, "/cluster_name"),
            version: string_at(&body, "/version/number"),
        })
    }

    async fn search(&self, index: &str, body: Value, mode: SearchMode) -> Result<Vec<ScoredChunk>, StoreError> {
        let response = self
            .client
            .post(self.url(&format!("{index}/_search"))?)
            .json(&body)
            .send()
            .await?;
        let response_json = checked_json(response).await?;
        let hits = parse_hits(&response_json, mode);
        debug!(index, mode = %mode, hits = hits.len(), "search returned");
        Ok(hits)
    }
}

#[async_trait]
impl DocumentStore for OpenSearchStore {
    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        let response = self.client.head(self.url(index)?).send().await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(StoreError::BackendResponse {
                backend: BACKEND.to_string(),
                details: status.to_string(),
            }),
        }
    }

    async fn delete_index(&self, index: &str) -> Result<(), StoreError> {
        let response = self.client.delete(self.url(index)?).send().await?;
        checked_json(response).await.map(|_| ())
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<(), StoreError> {
        let response = self.client.put(self.url(index)?).json(body).send().await?;
        checked_json(response).await.map(|_| ())
    }

    async fn bulk_index(
        &self,
        index: &str,
        documents: &[PreparedDocument],
    ) -> Result<BulkOutcome, StoreError> {
        if documents.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let mut payload = String::new();
        for document in documents {
            payload.push_str(&serde_json::to_string(&json!({"index": {"_index": index}}))?);
            payload.push('\n');
            payload.push_str(&serde_json::to_string(document)?);
            payload.push('\n');
        }

        let response = self
            .client
            .post(self.url("_bulk")?)
            .header("Content-Type", "application/x-ndjson")
            .body(payload)
            .send()
            .await?;
        let response_json = checked_json(response).await?;

        let outcome = bulk_outcome(&response_json, documents.len());
        if outcome.failed > 0 {
            warn!(index, failed = outcome.failed, "bulk request rejected some documents");
        }
        Ok(outcome)
    }

    async fn refresh_index(&self, index: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.url(&format!("{index}/_refresh"))?)
            .send()
            .await?;
        checked_json(response).await.map(|_| ())
    }

    async fn count_documents(&self, index: &str) -> Result<u64, StoreError> {
        let response = self
            .client
            .get(self.url(&format!("{index}/_count"))?)
            .send()
            .await?;
        let response_json = checked_json(response).await?;
        response_json
            .pointer("/count")
            .and_then(Value::as_u64)
            .ok_or_else(|| StoreError::BackendResponse {
                backend: BACKEND.to_string(),
                details: "count response without a count".to_string(),
            })
    }

    async fn search_keyword(
        &self,
        index: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let body = json!({
            "size": top_k,
            "query": {
                "match": {
                    "content": query
                }
            },
            "_source": {"excludes": EXCLUDED_SOURCE_FIELDS}
        });
        self.search(index, body, SearchMode::Keyword).await
    }

    async fn search_knn(
        &self,
        index: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let body = json!({
            "size": top_k,
            "query": {
                "knn": {
                    "embedding": {
                        "vector": vector,
                        "k": top_k
                    }
                }
            },
            "_source": {"excludes": EXCLUDED_SOURCE_FIELDS}
        });
        self.search(index, body, SearchMode::Semantic).await
    }
}

async fn checked_json(response: Response) -> Result<Value, StoreError> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(StoreError::BackendResponse {
            backend: BACKEND.to_string(),
            details: format!("{status}: {text}"),
        });
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

fn string_at(value: &Value, pointer: &str) -> String {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Counts per-item results of a `_bulk` response. Items are successful when
/// their status is 2xx; a response without items counts everything as written
/// unless `errors` is set.
fn bulk_outcome(response: &Value, submitted: usize) -> BulkOutcome {
    let Some(items) = response.pointer("/items").and_then(Value::as_array) else {
        let errors = response.pointer("/errors").and_then(Value::as_bool).unwrap_or(false);
        return if errors {
            BulkOutcome { succeeded: 0, failed: submitted }
        } else {
            BulkOutcome { succeeded: submitted, failed: 0 }
        };
    };

    let succeeded = items
        .iter()
        .filter(|item| {
            item.as_object()
                .and_then(|actions| actions.values().next())
                .and_then(|action| action.pointer("/status"))
                .and_then(Value::as_u64)
                .map_or(false, |status| (200..300).contains(&status))
        })
        .count()
        .min(submitted);
    BulkOutcome {
        succeeded,
        failed: submitted - succeeded,
    }
}

/// Converts `hits.hits` of a search response into scored chunks tagged with
/// the mode that produced them.
pub fn parse_hits(response: &Value, mode: SearchMode) -> Vec<ScoredChunk> {
    let hits = response
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    hits.into_iter()
        .map(|raw| {
            let source = raw.pointer("/_source").cloned().unwrap_or(Value::Null);
            let content_type = source
                .pointer("/content_type")
                .cloned()
                .and_then(|value| serde_json::from_value::<ContentType>(value).ok())
                .unwrap_or(ContentType::Text);
            let metadata = source
                .pointer("/metadata")
                .cloned()
                .and_then(|value| serde_json::from_value::<DocumentMetadata>(value).ok())
                .unwrap_or_default();

            ScoredChunk {
                id: string_at(&raw, "/_id"),
                score: raw.pointer("/_score").and_then(Value::as_f64).unwrap_or(0.0),
                content: string_at(&source, "/content"),
                content_type,
                metadata,
                table_html: source
                    .pointer("/table_html")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                mode,
            }
        })
        .collect()
}
