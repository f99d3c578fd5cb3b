//! In-process stand-ins for the network backends, shared by unit tests.

use crate::error::{EmbeddingError, GenerationError, StoreError};
use crate::models::{PreparedDocument, ScoredChunk, SearchMode};
use crate::traits::{BulkOutcome, DocumentStore, Embedder, TextGenerator, VisionModel};
use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Hashes character trigrams into a unit vector; fails for listed texts.
pub struct FakeEmbedder {
    dimension: usize,
    failing: HashSet<String>,
    pub calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            failing: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(mut self, text: &str) -> Self {
        self.failing.insert(text.to_string());
        self
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimension.max(1)];
        let chars: Vec<char> = text.to_lowercase().chars().collect();

        for window in chars.windows(3) {
            let mut hash = 1469598103934665603u64;
            for ch in window {
                hash ^= *ch as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }
        if chars.len() < 3 {
            vector[0] = 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        for value in &mut vector {
            *value /= magnitude;
        }
        vector
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(text) {
            return Err(EmbeddingError::Status {
                status: 503,
                body: "embedding backend unavailable".to_string(),
            });
        }
        Ok(self.vector(text))
    }
}

/// Returns vectors of a fixed width regardless of what the probe reported.
pub struct FixedWidthEmbedder {
    pub probe_width: usize,
    pub document_width: usize,
}

#[async_trait]
impl Embedder for FixedWidthEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text == crate::embeddings::DIMENSION_PROBE_TEXT {
            return Ok(vec![0.5; self.probe_width]);
        }
        Ok(vec![0.5; self.document_width])
    }
}

#[derive(Default)]
struct MemoryIndex {
    body: Value,
    documents: Vec<PreparedDocument>,
}

/// A search store holding documents in memory, with lexical term-count
/// scoring and cosine k-NN.
#[derive(Default)]
pub struct MemoryStore {
    indices: Mutex<HashMap<String, MemoryIndex>>,
    rejected_contents: HashSet<String>,
    failing_bulk_calls: HashSet<usize>,
    bulk_calls: AtomicUsize,
    refreshes: AtomicUsize,
    pub keyword_unavailable: AtomicBool,
    pub knn_unavailable: AtomicBool,
    pub create_unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-item rejection, reported inside a successful bulk response.
    pub fn rejecting(mut self, content: &str) -> Self {
        self.rejected_contents.insert(content.to_string());
        self
    }

    /// Transport failure for the n-th bulk call (zero-based).
    pub fn failing_bulk_call(mut self, call: usize) -> Self {
        self.failing_bulk_calls.insert(call);
        self
    }

    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn documents(&self, index: &str) -> Vec<PreparedDocument> {
        self.indices
            .lock()
            .map(|indices| {
                indices
                    .get(index)
                    .map(|entry| entry.documents.clone())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    pub fn index_body(&self, index: &str) -> Option<Value> {
        self.indices
            .lock()
            .ok()
            .and_then(|indices| indices.get(index).map(|entry| entry.body.clone()))
    }

    fn poisoned() -> StoreError {
        Self::unavailable("memory store lock poisoned")
    }

    fn unavailable(details: &str) -> StoreError {
        StoreError::BackendResponse {
            backend: "memory".to_string(),
            details: details.to_string(),
        }
    }

    fn missing(index: &str) -> StoreError {
        StoreError::BackendResponse {
            backend: "memory".to_string(),
            details: format!("no such index: {index}"),
        }
    }

    fn scored(index: &str, position: usize, document: &PreparedDocument, score: f64, mode: SearchMode) -> ScoredChunk {
        ScoredChunk {
            id: format!("{index}-{position}"),
            score,
            content: document.content.clone(),
            content_type: document.content_type,
            metadata: document.metadata.clone(),
            table_html: document.table_html.clone(),
            mode,
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        let indices = self.indices.lock().map_err(|_| Self::poisoned())?;
        Ok(indices.contains_key(index))
    }

    async fn delete_index(&self, index: &str) -> Result<(), StoreError> {
        let mut indices = self.indices.lock().map_err(|_| Self::poisoned())?;
        indices.remove(index).map(|_| ()).ok_or_else(|| Self::missing(index))
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<(), StoreError> {
        if self.create_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::BackendResponse {
                backend: "memory".to_string(),
                details: "400 Bad Request: mapper_parsing_exception".to_string(),
            });
        }
        let mut indices = self.indices.lock().map_err(|_| Self::poisoned())?;
        if indices.contains_key(index) {
            return Err(Self::unavailable(&format!("index {index} already exists")));
        }
        indices.insert(
            index.to_string(),
            MemoryIndex {
                body: body.clone(),
                documents: Vec::new(),
            },
        );
        Ok(())
    }

    async fn bulk_index(
        &self,
        index: &str,
        documents: &[PreparedDocument],
    ) -> Result<BulkOutcome, StoreError> {
        let call = self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_bulk_calls.contains(&call) {
            return Err(Self::unavailable("connection reset by peer"));
        }

        let mut indices = self.indices.lock().map_err(|_| Self::poisoned())?;
        let entry = indices.get_mut(index).ok_or_else(|| Self::missing(index))?;
        let mut outcome = BulkOutcome::default();
        for document in documents {
            if self.rejected_contents.contains(&document.content) {
                outcome.failed += 1;
            } else {
                entry.documents.push(document.clone());
                outcome.succeeded += 1;
            }
        }
        Ok(outcome)
    }

    async fn refresh_index(&self, index: &str) -> Result<(), StoreError> {
        let indices = self.indices.lock().map_err(|_| Self::poisoned())?;
        indices.get(index).ok_or_else(|| Self::missing(index))?;
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn count_documents(&self, index: &str) -> Result<u64, StoreError> {
        let indices = self.indices.lock().map_err(|_| Self::poisoned())?;
        let entry = indices.get(index).ok_or_else(|| Self::missing(index))?;
        Ok(entry.documents.len() as u64)
    }

    async fn search_keyword(
        &self,
        index: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        if self.keyword_unavailable.load(Ordering::SeqCst) {
            return Err(Self::unavailable("keyword search unavailable"));
        }
        let indices = self.indices.lock().map_err(|_| Self::poisoned())?;
        let entry = indices.get(index).ok_or_else(|| Self::missing(index))?;
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|term| term.to_lowercase())
            .collect();

        let mut hits: Vec<ScoredChunk> = entry
            .documents
            .iter()
            .enumerate()
            .filter_map(|(position, document)| {
                let content = document.content.to_lowercase();
                let matches = terms.iter().filter(|term| content.contains(term.as_str())).count();
                (matches > 0).then(|| {
                    Self::scored(index, position, document, matches as f64, SearchMode::Keyword)
                })
            })
            .collect();
        hits.sort_by(|left, right| right.score.total_cmp(&left.score));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn search_knn(
        &self,
        index: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        if self.knn_unavailable.load(Ordering::SeqCst) {
            return Err(Self::unavailable("knn plugin unavailable"));
        }
        let indices = self.indices.lock().map_err(|_| Self::poisoned())?;
        let entry = indices.get(index).ok_or_else(|| Self::missing(index))?;

        let mut hits: Vec<ScoredChunk> = entry
            .documents
            .iter()
            .enumerate()
            .map(|(position, document)| {
                let similarity = cosine(vector, &document.embedding);
                Self::scored(index, position, document, similarity, SearchMode::Semantic)
            })
            .collect();
        hits.sort_by(|left, right| right.score.total_cmp(&left.score));
        hits.truncate(top_k);
        Ok(hits)
    }
}

fn cosine(left: &[f32], right: &[f32]) -> f64 {
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm = left.iter().map(|a| a * a).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|b| b * b).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    f64::from(dot / (left_norm * right_norm))
}

/// Answers every prompt with a fixed reply unless the prompt contains a
/// failure marker; records the prompts it saw.
pub struct ScriptedGenerator {
    reply: String,
    failure_marker: Option<String>,
    pub prompts: Mutex<Vec<String>>,
    pub images: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            failure_marker: None,
            prompts: Mutex::new(Vec::new()),
            images: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_when(mut self, marker: &str) -> Self {
        self.failure_marker = Some(marker.to_string());
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|prompts| prompts.clone()).unwrap_or_default()
    }

    fn answer(&self, prompt: &str) -> Result<String, GenerationError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        match &self.failure_marker {
            Some(marker) if prompt.contains(marker.as_str()) => Err(GenerationError::Status {
                backend: "scripted",
                status: 500,
                body: "model crashed".to_string(),
            }),
            _ => Ok(self.reply.clone()),
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.answer(prompt)
    }
}

#[async_trait]
impl VisionModel for ScriptedGenerator {
    async fn describe_image(&self, jpeg: &[u8], prompt: &str) -> Result<String, GenerationError> {
        if let Ok(mut images) = self.images.lock() {
            images.push(jpeg.to_vec());
        }
        self.answer(prompt)
    }
}

/// One request seen by a [`StubServer`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

#[derive(Clone)]
struct StubState {
    routes: Arc<HashMap<(String, String), (u16, String)>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// Local HTTP server answering `(method, path)` pairs with canned JSON;
/// anything else gets a 404. Shuts down when dropped.
pub struct StubServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    _shutdown: oneshot::Sender<()>,
}

impl StubServer {
    pub async fn start(routes: &[(&str, &str, u16, &str)]) -> Self {
        let routes = routes
            .iter()
            .map(|(method, path, status, body)| {
                ((method.to_string(), path.to_string()), (*status, body.to_string()))
            })
            .collect();
        let state = StubState {
            routes: Arc::new(routes),
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        let requests = Arc::clone(&state.requests);
        let app = Router::new().fallback(respond).with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("stub server should bind");
        let addr = listener.local_addr().expect("stub server address");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
            _shutdown: shutdown_tx,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

async fn respond(State(state): State<StubState>, method: Method, uri: Uri, body: String) -> Response {
    let key = (method.as_str().to_string(), uri.path().to_string());
    if let Ok(mut requests) = state.requests.lock() {
        requests.push(RecordedRequest {
            method: key.0.clone(),
            path: key.1.clone(),
            query: uri.query().map(str::to_string),
            body,
        });
    }

    let (status, body) = state
        .routes
        .get(&key)
        .cloned()
        .unwrap_or((404, r#"{"error":"no route"}"#.to_string()));
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}
