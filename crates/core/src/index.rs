use crate::error::{IndexError, StoreError};
use crate::traits::{DocumentStore, Embedder};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Name and vector width of one search index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    pub name: String,
    pub dimension: usize,
}

impl IndexSchema {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
        }
    }

    /// Index settings and mappings: a cosine k-NN vector field next to the
    /// searchable content and the stored-only image and table payloads.
    pub fn body(&self) -> Value {
        json!({
            "settings": {
                "index": {
                    "knn": true,
                    "knn.space_type": "cosinesimil"
                }
            },
            "mappings": {
                "properties": {
                    "content": {"type": "text"},
                    "content_type": {"type": "keyword"},
                    "embedding": {
                        "type": "knn_vector",
                        "dimension": self.dimension,
                        "method": {
                            "name": "hnsw",
                            "space_type": "cosinesimil",
                            "engine": "lucene"
                        }
                    },
                    "base64_image": {"type": "binary", "doc_values": false, "index": false},
                    "table_html": {"type": "text", "index": false},
                    "metadata": {
                        "properties": {
                            "filename": {"type": "keyword"},
                            "caption": {"type": "text"},
                            "image_text": {"type": "text"},
                            "page_number": {"type": "integer"}
                        }
                    }
                }
            }
        })
    }
}

pub struct IndexManager<S: ?Sized, E: ?Sized> {
    store: Arc<S>,
    embedder: Arc<E>,
}

impl<S, E> IndexManager<S, E>
where
    S: DocumentStore + ?Sized,
    E: Embedder + ?Sized,
{
    pub fn new(store: Arc<S>, embedder: Arc<E>) -> Self {
        Self { store, embedder }
    }

    /// Drops any index called `name` and creates it again, empty, sized to the
    /// embedder's current vector width. Prior documents are always lost.
    pub async fn ensure_index(&self, name: &str) -> Result<IndexSchema, IndexError> {
        let store_error = |source: StoreError| IndexError::Store {
            name: name.to_string(),
            source,
        };

        if self.store.index_exists(name).await.map_err(store_error)? {
            info!(index = name, "deleting existing index before recreation");
            self.store.delete_index(name).await.map_err(store_error)?;
        }

        let dimension = self.embedder.probe_dimension().await?;
        info!(index = name, dimension, "using embedding dimension");

        let schema = IndexSchema::new(name, dimension);
        self.store
            .create_index(name, &schema.body())
            .await
            .map_err(store_error)?;
        info!(index = name, "created index with vector search enabled");

        Ok(schema)
    }
}
