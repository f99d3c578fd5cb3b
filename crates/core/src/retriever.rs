use crate::error::RetrievalError;
use crate::models::{FusionWeights, ScoredChunk, SearchMode};
use crate::traits::{DocumentStore, Embedder};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub query: String,
    pub requested_mode: SearchMode,
    /// `Keyword` when semantic retrieval had to be abandoned.
    pub effective_mode: SearchMode,
    pub hits: Vec<ScoredChunk>,
    pub warnings: Vec<String>,
}

pub struct HybridRetriever<S: ?Sized, E: ?Sized> {
    store: Arc<S>,
    embedder: Arc<E>,
    index: String,
    weights: FusionWeights,
}

impl<S, E> HybridRetriever<S, E>
where
    S: DocumentStore + ?Sized,
    E: Embedder + ?Sized,
{
    pub fn new(store: Arc<S>, embedder: Arc<E>, index: impl Into<String>) -> Self {
        Self {
            store,
            embedder,
            index: index.into(),
            weights: FusionWeights::default(),
        }
    }

    pub fn with_weights(mut self, weights: FusionWeights) -> Self {
        self.weights = weights;
        self
    }

    pub async fn search(
        &self,
        query: &str,
        mode: SearchMode,
        top_k: usize,
    ) -> Result<RetrievalOutcome, RetrievalError> {
        if query.trim().is_empty() {
            return Err(RetrievalError::InvalidRequest("query is empty".to_string()));
        }
        if top_k == 0 {
            return Err(RetrievalError::InvalidRequest("top_k must be positive".to_string()));
        }

        let mut outcome = RetrievalOutcome {
            query: query.to_string(),
            requested_mode: mode,
            effective_mode: mode,
            hits: Vec::new(),
            warnings: Vec::new(),
        };

        outcome.hits = match mode {
            SearchMode::Keyword => self.keyword_hits(query, top_k).await?,
            SearchMode::Semantic => match self.semantic_hits(query, top_k).await {
                Ok(hits) => hits,
                Err(warning) => {
                    outcome.degrade(warning);
                    self.keyword_hits(query, top_k).await?
                }
            },
            SearchMode::Hybrid => {
                let keyword = self.keyword_hits(query, top_k).await?;
                match self.semantic_hits(query, top_k).await {
                    Ok(semantic) => fuse(keyword, semantic, self.weights, top_k),
                    Err(warning) => {
                        outcome.degrade(warning);
                        keyword
                    }
                }
            }
        };

        debug!(
            mode = %outcome.effective_mode,
            hits = outcome.hits.len(),
            "retrieval finished"
        );
        Ok(outcome)
    }

    async fn keyword_hits(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, RetrievalError> {
        Ok(self.store.search_keyword(&self.index, query, top_k).await?)
    }

    async fn semantic_hits(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, String> {
        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|error| format!("query embedding failed: {error}"))?;
        self.store
            .search_knn(&self.index, &vector, top_k)
            .await
            .map_err(|error| format!("vector search failed: {error}"))
    }
}

impl RetrievalOutcome {
    fn degrade(&mut self, warning: String) {
        warn!(%warning, "falling back to keyword search");
        self.effective_mode = SearchMode::Keyword;
        self.warnings.push(format!("{warning}; showing keyword results only"));
    }
}

struct FusedHit {
    chunk: ScoredChunk,
    keyword: f64,
    semantic: f64,
    first_seen: usize,
}

/// Weighted sum of per-list min-max normalized scores over the union of both
/// lists. Ties fall back to the keyword score, then to first appearance.
pub fn fuse(
    keyword: Vec<ScoredChunk>,
    semantic: Vec<ScoredChunk>,
    weights: FusionWeights,
    top_k: usize,
) -> Vec<ScoredChunk> {
    let keyword_norm = min_max(&keyword);
    let semantic_norm = min_max(&semantic);

    let mut fused: Vec<FusedHit> = Vec::with_capacity(keyword.len() + semantic.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (chunk, norm) in keyword.into_iter().zip(keyword_norm) {
        if positions.contains_key(&chunk.id) {
            continue;
        }
        let first_seen = fused.len();
        positions.insert(chunk.id.clone(), first_seen);
        fused.push(FusedHit {
            chunk,
            keyword: norm,
            semantic: 0.0,
            first_seen,
        });
    }

    for (chunk, norm) in semantic.into_iter().zip(semantic_norm) {
        match positions.get(&chunk.id) {
            Some(&position) => {
                let entry = &mut fused[position];
                entry.semantic = entry.semantic.max(norm);
            }
            None => {
                let first_seen = fused.len();
                positions.insert(chunk.id.clone(), first_seen);
                fused.push(FusedHit {
                    chunk,
                    keyword: 0.0,
                    semantic: norm,
                    first_seen,
                });
            }
        }
    }

    let score = |hit: &FusedHit| weights.keyword * hit.keyword + weights.semantic * hit.semantic;
    fused.sort_by(|left, right| {
        score(right)
            .total_cmp(&score(left))
            .then(right.keyword.total_cmp(&left.keyword))
            .then(left.first_seen.cmp(&right.first_seen))
    });

    fused
        .into_iter()
        .take(top_k)
        .map(|hit| {
            let total = score(&hit);
            ScoredChunk {
                score: total,
                mode: SearchMode::Hybrid,
                ..hit.chunk
            }
        })
        .collect()
}

fn min_max(hits: &[ScoredChunk]) -> Vec<f64> {
    let (min, max) = hits.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), hit| {
        (min.min(hit.score), max.max(hit.score))
    });
    let range = max - min;
    hits.iter()
        .map(|hit| if range > 0.0 { (hit.score - min) / range } else { 1.0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexManager;
    use crate::ingest::BulkIngestionEngine;
    use crate::models::{Chunk, ContentType, DocumentMetadata, IngestionOptions, Provenance};
    use crate::testing::{FakeEmbedder, MemoryStore};
    use std::sync::atomic::Ordering;

    fn hit(id: &str, score: f64, mode: SearchMode) -> ScoredChunk {
        ScoredChunk {
            id: id.to_string(),
            score,
            content: format!("content of {id}"),
            content_type: ContentType::Text,
            metadata: DocumentMetadata::default(),
            table_html: None,
            mode,
        }
    }

    fn ids(hits: &[ScoredChunk]) -> Vec<&str> {
        hits.iter().map(|hit| hit.id.as_str()).collect()
    }

    #[test]
    fn fusion_rewards_hits_found_by_both_modes() {
        let keyword = vec![
            hit("a", 12.0, SearchMode::Keyword),
            hit("b", 6.0, SearchMode::Keyword),
            hit("c", 2.0, SearchMode::Keyword),
        ];
        let semantic = vec![
            hit("b", 0.95, SearchMode::Semantic),
            hit("d", 0.90, SearchMode::Semantic),
            hit("a", 0.55, SearchMode::Semantic),
        ];

        let fused = fuse(keyword, semantic, FusionWeights::default(), 10);
        assert_eq!(ids(&fused), vec!["b", "a", "d", "c"]);
        assert!(fused.iter().all(|hit| hit.mode == SearchMode::Hybrid));
        assert!((fused[0].score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn weights_shift_the_ranking_between_modes() {
        let keyword = || {
            vec![
                hit("a", 12.0, SearchMode::Keyword),
                hit("b", 6.0, SearchMode::Keyword),
                hit("c", 2.0, SearchMode::Keyword),
            ]
        };
        let semantic = || {
            vec![
                hit("b", 0.95, SearchMode::Semantic),
                hit("d", 0.90, SearchMode::Semantic),
                hit("a", 0.55, SearchMode::Semantic),
            ]
        };

        let keyword_only = FusionWeights {
            keyword: 1.0,
            semantic: 0.0,
        };
        let semantic_only = FusionWeights {
            keyword: 0.0,
            semantic: 1.0,
        };
        assert_eq!(ids(&fuse(keyword(), semantic(), keyword_only, 2)), vec!["a", "b"]);
        assert_eq!(ids(&fuse(keyword(), semantic(), semantic_only, 2)), vec!["b", "d"]);
    }

    #[test]
    fn ties_break_on_keyword_score_then_first_appearance() {
        let keyword = vec![hit("k1", 3.0, SearchMode::Keyword), hit("k2", 1.0, SearchMode::Keyword)];
        let semantic = vec![hit("s1", 0.8, SearchMode::Semantic), hit("s2", 0.2, SearchMode::Semantic)];

        let fused = fuse(keyword, semantic, FusionWeights::default(), 3);
        assert_eq!(ids(&fused), vec!["k1", "s1", "k2"]);
    }

    #[test]
    fn single_valued_lists_normalize_to_one() {
        assert_eq!(min_max(&[hit("x", 4.2, SearchMode::Keyword)]), vec![1.0]);
        assert!(min_max(&[]).is_empty());
    }

    async fn indexed_store(embedder: Arc<FakeEmbedder>) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let schema = IndexManager::new(store.clone(), embedder.clone())
            .ensure_index("localrag")
            .await
            .expect("index creation");
        let chunks: Vec<Chunk> = [
            "Revenue grew 10% driven by consulting",
            "Operating margin expanded to 15.4%",
            "Headcount reached 733,000 people",
            "Revenue by geographic market",
        ]
        .iter()
        .map(|text| Chunk::text(*text, Provenance::default()))
        .collect();
        BulkIngestionEngine::new(store.clone(), embedder, IngestionOptions::default())
            .ingest(&schema, &chunks)
            .await;
        store
    }

    #[tokio::test]
    async fn hybrid_search_is_deterministic() {
        let embedder = Arc::new(FakeEmbedder::new(64));
        let store = indexed_store(embedder.clone()).await;
        let retriever = HybridRetriever::new(store, embedder, "localrag");

        let first = retriever
            .search("revenue growth", SearchMode::Hybrid, 3)
            .await
            .expect("search");
        let second = retriever
            .search("revenue growth", SearchMode::Hybrid, 3)
            .await
            .expect("search");

        assert_eq!(first.hits, second.hits);
        assert_eq!(first.hits.len(), 3);
        assert_eq!(first.effective_mode, SearchMode::Hybrid);
        assert!(first.warnings.is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_degrades_to_keyword() {
        let embedder = Arc::new(FakeEmbedder::new(64).failing_on("revenue"));
        let store = indexed_store(embedder.clone()).await;
        let retriever = HybridRetriever::new(store, embedder, "localrag");

        for mode in [SearchMode::Semantic, SearchMode::Hybrid] {
            let outcome = retriever.search("revenue", mode, 5).await.expect("search");
            assert_eq!(outcome.effective_mode, SearchMode::Keyword);
            assert_eq!(outcome.warnings.len(), 1);
            assert_eq!(outcome.hits.len(), 2);
            assert!(outcome.hits.iter().all(|hit| hit.mode == SearchMode::Keyword));
        }
    }

    #[tokio::test]
    async fn knn_failure_degrades_but_keyword_failure_is_an_error() {
        let embedder = Arc::new(FakeEmbedder::new(64));
        let store = indexed_store(embedder.clone()).await;
        let retriever = HybridRetriever::new(store.clone(), embedder, "localrag");

        store.knn_unavailable.store(true, Ordering::SeqCst);
        let outcome = retriever
            .search("margin", SearchMode::Hybrid, 5)
            .await
            .expect("degraded search");
        assert_eq!(outcome.effective_mode, SearchMode::Keyword);
        assert_eq!(outcome.hits.len(), 1);

        store.keyword_unavailable.store(true, Ordering::SeqCst);
        let error = retriever
            .search("margin", SearchMode::Keyword, 5)
            .await
            .expect_err("keyword failure");
        assert!(matches!(error, RetrievalError::Keyword(_)));
    }

    #[tokio::test]
    async fn semantic_search_ranks_by_similarity() {
        let embedder = Arc::new(FakeEmbedder::new(64));
        let store = indexed_store(embedder.clone()).await;
        let retriever = HybridRetriever::new(store, embedder, "localrag");

        let outcome = retriever
            .search("Operating margin expanded to 15.4%", SearchMode::Semantic, 2)
            .await
            .expect("search");
        assert_eq!(outcome.hits.len(), 2);
        assert_eq!(outcome.hits[0].content, "Operating margin expanded to 15.4%");
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected() {
        let embedder = Arc::new(FakeEmbedder::new(8));
        let retriever = HybridRetriever::new(Arc::new(MemoryStore::new()), embedder, "localrag");
        assert!(retriever.search("  ", SearchMode::Keyword, 5).await.is_err());
        assert!(retriever.search("revenue", SearchMode::Keyword, 0).await.is_err());
    }
}
