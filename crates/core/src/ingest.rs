use crate::artifacts::ChunkSet;
use crate::error::IngestRunError;
use crate::index::{IndexManager, IndexSchema};
use crate::models::{Chunk, IngestionOptions, PreparedDocument};
use crate::traits::{DocumentStore, Embedder};
use std::ops::AddAssign;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Aggregate counters for one ingestion call. Individual failed documents are
/// not retained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionReport {
    pub succeeded: usize,
    /// Rejected by the store, lost with a failed batch, or wrong dimension.
    pub failed: usize,
    pub skipped_empty: usize,
    pub embedding_failures: usize,
    pub dimension_mismatches: usize,
    pub batches: usize,
}

impl AddAssign for IngestionReport {
    fn add_assign(&mut self, other: Self) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped_empty += other.skipped_empty;
        self.embedding_failures += other.embedding_failures;
        self.dimension_mismatches += other.dimension_mismatches;
        self.batches += other.batches;
    }
}

/// Result of a full directory ingestion: the recreated index and its counters.
#[derive(Debug, Clone)]
pub struct IngestionRun {
    pub schema: IndexSchema,
    pub report: IngestionReport,
}

pub struct BulkIngestionEngine<S: ?Sized, E: ?Sized> {
    store: Arc<S>,
    embedder: Arc<E>,
    options: IngestionOptions,
}

impl<S, E> BulkIngestionEngine<S, E>
where
    S: DocumentStore + ?Sized,
    E: Embedder + ?Sized,
{
    pub fn new(store: Arc<S>, embedder: Arc<E>, options: IngestionOptions) -> Self {
        Self {
            store,
            embedder,
            options,
        }
    }

    /// Embeds and writes `chunks` into the index described by `schema`. Never
    /// fails: every problem is absorbed into the returned counters.
    pub async fn ingest(&self, schema: &IndexSchema, chunks: &[Chunk]) -> IngestionReport {
        let batch_size = self.options.batch_size.max(1);
        let mut report = IngestionReport::default();
        let mut batch: Vec<PreparedDocument> = Vec::with_capacity(batch_size.min(chunks.len()));

        for (position, chunk) in chunks.iter().enumerate() {
            if !chunk.has_content() {
                debug!(position, "skipping chunk without content");
                report.skipped_empty += 1;
                continue;
            }

            let embedding = match self.embedder.embed(chunk.content()).await {
                Ok(embedding) => embedding,
                Err(error) => {
                    warn!(position, %error, "embedding failed; skipping chunk");
                    report.embedding_failures += 1;
                    continue;
                }
            };

            if embedding.len() != schema.dimension {
                warn!(
                    position,
                    expected = schema.dimension,
                    actual = embedding.len(),
                    "embedding dimension mismatch; rejecting chunk"
                );
                report.dimension_mismatches += 1;
                report.failed += 1;
                continue;
            }

            batch.push(PreparedDocument::from_chunk(chunk, embedding));
            if batch.len() >= batch_size {
                self.flush(schema, &mut batch, &mut report).await;
            }
        }

        if !batch.is_empty() {
            self.flush(schema, &mut batch, &mut report).await;
        }

        info!(
            index = %schema.name,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped_empty = report.skipped_empty,
            embedding_failures = report.embedding_failures,
            "ingestion complete"
        );
        report
    }

    /// Ingests images, then tables, then text, each group independently.
    pub async fn ingest_chunk_set(&self, schema: &IndexSchema, set: &ChunkSet) -> IngestionReport {
        let mut total = IngestionReport::default();
        for (label, chunks) in [("image", &set.images), ("table", &set.tables), ("text", &set.text)] {
            if chunks.is_empty() {
                continue;
            }
            info!(group = label, chunks = chunks.len(), "ingesting chunk group");
            total += self.ingest(schema, chunks).await;
        }
        total
    }

    /// Loads the chunk artifacts in `dir`, recreates `index` and ingests them.
    /// Unreadable or empty artifacts abort the run before the index is touched.
    pub async fn ingest_directory(&self, index: &str, dir: &Path) -> Result<IngestionRun, IngestRunError> {
        let set = ChunkSet::load(dir)?;
        if set.is_empty() {
            return Err(IngestRunError::NoChunks {
                dir: dir.to_path_buf(),
            });
        }
        info!(
            text = set.text.len(),
            tables = set.tables.len(),
            images = set.images.len(),
            "loaded chunk artifacts"
        );

        let schema = IndexManager::new(Arc::clone(&self.store), Arc::clone(&self.embedder))
            .ensure_index(index)
            .await?;
        let report = self.ingest_chunk_set(&schema, &set).await;

        if let Err(error) = self.store.refresh_index(&schema.name).await {
            warn!(index = %schema.name, %error, "index refresh failed; counts may lag");
        }
        Ok(IngestionRun { schema, report })
    }

    async fn flush(
        &self,
        schema: &IndexSchema,
        batch: &mut Vec<PreparedDocument>,
        report: &mut IngestionReport,
    ) {
        report.batches += 1;
        match self.store.bulk_index(&schema.name, batch).await {
            Ok(outcome) => {
                let succeeded = outcome.succeeded.min(batch.len());
                report.succeeded += succeeded;
                report.failed += batch.len() - succeeded;
            }
            Err(error) => {
                warn!(%error, documents = batch.len(), "bulk ingestion error; batch counted as failed");
                report.failed += batch.len();
            }
        }
        debug!(
            succeeded = report.succeeded,
            failed = report.failed,
            "ingested chunks so far"
        );
        batch.clear();
    }
}
