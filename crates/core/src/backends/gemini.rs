use super::{http_client, join_endpoint, response_bytes, split_lines, GenerationOptions};
use crate::error::GenerationError;
use crate::traits::{TextGenerator, TextStream, VisionModel};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use futures::stream::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const BACKEND: &str = "gemini";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Gemini `generateContent` client, used for image descriptions and answers.
pub struct GeminiGenerator {
    client: Client,
    config: GeminiConfig,
    options: GenerationOptions,
}

impl GeminiGenerator {
    pub fn new(config: GeminiConfig, options: GenerationOptions) -> Result<Self, GenerationError> {
        Ok(Self {
            client: http_client(config.timeout)?,
            config,
            options,
        })
    }

    fn body(&self, parts: Vec<Value>) -> Value {
        json!({
            "contents": [
                {
                    "role": "user",
                    "parts": parts,
                }
            ],
            "generationConfig": {
                "temperature": self.options.temperature,
                "maxOutputTokens": self.options.max_tokens,
            },
        })
    }

    async fn send(&self, method: &str, body: &Value) -> Result<reqwest::Response, GenerationError> {
        let mut url = join_endpoint(
            &self.config.base_url,
            &format!("models/{}:{method}", self.config.model),
        )?;
        if method == "streamGenerateContent" {
            url.set_query(Some("alt=sse"));
        }
        debug!(model = %self.config.model, %url, "gemini request");

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
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

    async fn complete(&self, parts: Vec<Value>) -> Result<String, GenerationError> {
        let response = self.send("generateContent", &self.body(parts)).await?;
        let payload: Value = response.json().await?;
        candidate_text(&payload)?.ok_or(GenerationError::MissingText { backend: BACKEND })
    }
}

/// Concatenates the text parts of the first candidate.
fn candidate_text(payload: &Value) -> Result<Option<String>, GenerationError> {
    if let Some(message) = payload.pointer("/error/message").and_then(Value::as_str) {
        return Err(GenerationError::Backend {
            backend: BACKEND,
            message: message.to_string(),
        });
    }

    let parts = match payload
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
    {
        Some(parts) => parts,
        None => return Ok(None),
    };

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    Ok(Some(text))
}

fn parse_sse_line(line: &str) -> Result<Option<String>, GenerationError> {
    let data = match line.strip_prefix("data:") {
        Some(data) => data.trim(),
        None => return Ok(None),
    };
    let payload: Value = serde_json::from_str(data)?;
    Ok(candidate_text(&payload)?.filter(|text| !text.is_empty()))
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.complete(vec![json!({ "text": prompt })]).await
    }

    async fn generate_stream(&self, prompt: &str) -> Result<TextStream, GenerationError> {
        let body = self.body(vec![json!({ "text": prompt })]);
        let response = self.send("streamGenerateContent", &body).await?;
        let tokens = split_lines(response_bytes(response)).filter_map(|line| async move {
            match line.and_then(|line| parse_sse_line(&line)) {
                Ok(Some(text)) => Some(Ok(text)),
                Ok(None) => None,
                Err(error) => Some(Err(error)),
            }
        });
        Ok(tokens.boxed())
    }
}

#[async_trait]
impl VisionModel for GeminiGenerator {
    async fn describe_image(&self, jpeg: &[u8], prompt: &str) -> Result<String, GenerationError> {
        self.complete(vec![
            json!({
                "inline_data": {
                    "mime_type": "image/jpeg",
                    "data": STANDARD.encode(jpeg),
                }
            }),
            json!({ "text": prompt }),
        ])
        .await
    }
}
