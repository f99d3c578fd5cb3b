use super::{http_client, join_endpoint, response_bytes, split_lines, GenerationOptions};
use crate::error::GenerationError;
use crate::traits::{TextGenerator, TextStream, VisionModel};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use futures::stream::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

const BACKEND: &str = "ollama";

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Text (and, for multimodal models, image) generation through `/api/generate`.
pub struct OllamaGenerator {
    client: Client,
    endpoint: Url,
    model: String,
    options: GenerationOptions,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    stream: bool,
    temperature: f32,
    options: SamplingOptions,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SamplingOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaGenerator {
    pub fn new(
        config: &OllamaConfig,
        model: impl Into<String>,
        options: GenerationOptions,
    ) -> Result<Self, GenerationError> {
        Ok(Self {
            client: http_client(config.timeout)?,
            endpoint: join_endpoint(&config.base_url, "api/generate")?,
            model: model.into(),
            options,
        })
    }

    fn request<'a>(&'a self, prompt: &'a str, stream: bool, images: Vec<String>) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt,
            max_tokens: self.options.max_tokens,
            stream,
            temperature: self.options.temperature,
            options: SamplingOptions {
                temperature: self.options.temperature,
                num_predict: self.options.max_tokens,
            },
            images,
        }
    }

    async fn send(&self, body: &GenerateRequest<'_>) -> Result<reqwest::Response, GenerationError> {
        debug!(model = %self.model, url = %self.endpoint, stream = body.stream, "ollama generate");
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                backend: BACKEND,
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn complete(&self, body: GenerateRequest<'_>) -> Result<String, GenerationError> {
        let response = self.send(&body).await?;
        let payload: GenerateResponse = response.json().await?;
        into_text(payload)?.ok_or(GenerationError::MissingText { backend: BACKEND })
    }
}

fn into_text(payload: GenerateResponse) -> Result<Option<String>, GenerationError> {
    if let Some(message) = payload.error {
        return Err(GenerationError::Backend {
            backend: BACKEND,
            message,
        });
    }
    Ok(payload.response)
}

fn parse_stream_line(line: &str) -> Result<Option<String>, GenerationError> {
    let payload: GenerateResponse = serde_json::from_str(line)?;
    Ok(into_text(payload)?.filter(|text| !text.is_empty()))
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.complete(self.request(prompt, false, Vec::new())).await
    }

    async fn generate_stream(&self, prompt: &str) -> Result<TextStream, GenerationError> {
        let response = self.send(&self.request(prompt, true, Vec::new())).await?;
        let tokens = split_lines(response_bytes(response)).filter_map(|line| async move {
            match line.and_then(|line| parse_stream_line(&line)) {
                Ok(Some(text)) => Some(Ok(text)),
                Ok(None) => None,
                Err(error) => Some(Err(error)),
            }
        });
        Ok(tokens.boxed())
    }
}

#[async_trait]
impl VisionModel for OllamaGenerator {
    async fn describe_image(&self, jpeg: &[u8], prompt: &str) -> Result<String, GenerationError> {
        self.complete(self.request(prompt, false, vec![STANDARD.encode(jpeg)]))
            .await
    }
}
