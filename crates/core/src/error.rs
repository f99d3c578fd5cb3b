use std::path::PathBuf;
use thiserror::Error;

/// Per-element failures raised while turning parsed elements into chunks.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("image on page {page:?} of {file} has no base64 payload")]
    MissingImagePayload { file: String, page: Option<u32> },

    #[error("image on page {page:?} of {file} has an invalid base64 payload: {source}")]
    InvalidImagePayload {
        file: String,
        page: Option<u32>,
        #[source]
        source: base64::DecodeError,
    },
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("embedding backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("embedding backend returned an empty vector")]
    Empty,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{backend} returned {status}: {body}")]
    Status {
        backend: &'static str,
        status: u16,
        body: String,
    },

    #[error("{backend} reported an error: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },

    #[error("{backend} response carried no text")]
    MissingText { backend: &'static str },
}

/// A description call that failed; the chunk keeps its previous content.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("table description failed for page {page:?} of {file}: {source}")]
    Table {
        file: String,
        page: Option<u32>,
        #[source]
        source: GenerationError,
    },

    #[error("image description failed for page {page:?} of {file}: {source}")]
    Image {
        file: String,
        page: Option<u32>,
        #[source]
        source: GenerationError,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures that make an ingestion run meaningless; callers abort on these.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index {name}: {source}")]
    Store {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("embedding dimension probe failed: {0}")]
    Probe(#[from] EmbeddingError),
}

/// Reasons an ingestion run stops before any document is written.
#[derive(Debug, Error)]
pub enum IngestRunError {
    #[error(transparent)]
    Artifacts(#[from] ArtifactError),

    #[error("no chunks to ingest in {dir}")]
    NoChunks { dir: PathBuf },

    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invalid search request: {0}")]
    InvalidRequest(String),

    #[error("keyword search failed: {0}")]
    Keyword(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid json in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
#[error("unknown {kind} `{value}` (expected one of: {expected})")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}
