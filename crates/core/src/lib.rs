pub mod artifacts;
pub mod backends;
pub mod chunking;
pub mod elements;
pub mod embeddings;
pub mod enricher;
pub mod error;
pub mod index;
pub mod ingest;
pub mod models;
pub mod normalizer;
pub mod rag;
pub mod retriever;
pub mod stores;
pub mod traits;

#[cfg(test)]
mod testing;

pub use artifacts::{load_chunks, load_elements, save_chunks, ChunkSet};
pub use backends::{strip_reasoning, GeminiConfig, GeminiGenerator, GenerationOptions, OllamaConfig, OllamaGenerator};
pub use chunking::{compose_sections, normalize_whitespace, ChunkingConfig};
pub use elements::{ElementKind, ElementMetadata, ParsedElement};
pub use embeddings::{OllamaEmbedder, DEFAULT_EMBEDDING_MODEL, DIMENSION_PROBE_TEXT};
pub use enricher::{DescriptorEnricher, EnrichmentReport};
pub use error::{
    ArtifactError, EmbeddingError, EnrichError, GenerationError, IndexError, NormalizeError,
    ParseEnumError, RetrievalError, StoreError,
};
pub use index::{IndexManager, IndexSchema};
pub use ingest::{BulkIngestionEngine, IngestionReport, IngestionRun};
pub use models::{
    Chunk, ContentType, DocumentMetadata, FusionWeights, ImageChunk, IngestionOptions,
    PreparedDocument, Provenance, ScoredChunk, SearchMode, TableChunk, TextChunk, NO_CAPTION,
};
pub use normalizer::{normalize_elements, NormalizeOptions, NormalizeReport};
pub use rag::{build_prompt, ModelType, RagResponse, RagService};
pub use retriever::{fuse, HybridRetriever, RetrievalOutcome};
pub use stores::{ClusterInfo, OpenSearchConfig, OpenSearchStore};
pub use traits::{BulkOutcome, DocumentStore, Embedder, TextGenerator, TextStream, VisionModel};
