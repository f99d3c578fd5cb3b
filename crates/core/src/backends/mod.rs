pub mod gemini;
pub mod ollama;

pub use gemini::{GeminiConfig, GeminiGenerator};
pub use ollama::{OllamaConfig, OllamaGenerator};

use crate::error::GenerationError;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Sampling settings sent with every generation request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 1_000,
        }
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}

/// Joins `path` onto `base`, treating `base` as a directory even without a
/// trailing slash.
pub(crate) fn join_endpoint(base: &str, path: &str) -> Result<Url, url::ParseError> {
    let mut base = base.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base)?.join(path.trim_start_matches('/'))
}

/// Removes `<think>...</think>` sections emitted by reasoning models.
pub fn strip_reasoning(text: &str) -> String {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        output.push_str(&rest[..start]);
        match rest[start..].find(CLOSE) {
            Some(end) => rest = &rest[start + end + CLOSE.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    output.push_str(rest);
    output.trim().to_string()
}

pub(crate) fn response_bytes(
    response: reqwest::Response,
) -> impl Stream<Item = Result<Vec<u8>, GenerationError>> + Send + 'static {
    response
        .bytes_stream()
        .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(GenerationError::from))
}

struct LineState {
    bytes: BoxStream<'static, Result<Vec<u8>, GenerationError>>,
    buffer: Vec<u8>,
    exhausted: bool,
}

/// Re-frames a byte stream into non-empty, trimmed lines. A line split across
/// network chunks is emitted once it is complete.
pub(crate) fn split_lines<S>(bytes: S) -> BoxStream<'static, Result<String, GenerationError>>
where
    S: Stream<Item = Result<Vec<u8>, GenerationError>> + Send + 'static,
{
    let state = LineState {
        bytes: bytes.boxed(),
        buffer: Vec::new(),
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(newline) = state.buffer.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&line).trim().to_string();
                if line.is_empty() {
                    continue;
                }
                return Some((Ok(line), state));
            }

            if state.exhausted {
                let rest = std::mem::take(&mut state.buffer);
                let line = String::from_utf8_lossy(&rest).trim().to_string();
                if line.is_empty() {
                    return None;
                }
                return Some((Ok(line), state));
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(error)) => {
                    state.exhausted = true;
                    state.buffer.clear();
                    return Some((Err(error), state));
                }
                None => state.exhausted = true,
            }
        }
    })
    .boxed()
}
