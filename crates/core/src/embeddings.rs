use crate::backends::{http_client, join_endpoint, OllamaConfig};
use crate::error::EmbeddingError;
use crate::traits::Embedder;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Text embedded once per index creation to learn the vector width.
pub const DIMENSION_PROBE_TEXT: &str = "Sample text for dimension detection";

pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// Embeddings from an Ollama-compatible `/api/embeddings` endpoint.
pub struct OllamaEmbedder {
    client: Client,
    endpoint: Url,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    prompt: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(config: &OllamaConfig, model: impl Into<String>) -> Result<Self, EmbeddingError> {
        Ok(Self {
            client: http_client(config.timeout)?,
            endpoint: join_endpoint(&config.base_url, "api/embeddings")?,
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        debug!(model = %self.model, chars = text.len(), "requesting embedding");
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&EmbeddingRequest {
                prompt: text,
                model: &self.model,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: EmbeddingResponse = response.json().await?;
        if payload.embedding.is_empty() {
            return Err(EmbeddingError::Empty);
        }
        Ok(payload.embedding)
    }
}
