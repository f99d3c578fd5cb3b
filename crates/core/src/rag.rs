use crate::backends::strip_reasoning;
use crate::error::ParseEnumError;
use crate::models::{ScoredChunk, SearchMode};
use crate::retriever::HybridRetriever;
use crate::traits::{DocumentStore, Embedder, TextGenerator};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

pub const EMPTY_QUERY_ANSWER: &str = "Please enter a question.";
pub const NO_CONTEXT_ANSWER: &str =
    "I couldn't find any relevant information in the indexed documents to answer this question.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelType {
    Gemini,
    Ollama,
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelType::Gemini => "gemini",
            ModelType::Ollama => "ollama",
        })
    }
}

impl FromStr for ModelType {
    type Err = ParseEnumError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(ModelType::Gemini),
            "ollama" => Ok(ModelType::Ollama),
            _ => Err(ParseEnumError {
                kind: "model type",
                value: value.to_string(),
                expected: "gemini, ollama",
            }),
        }
    }
}

/// What the UI layer receives: the full answer, or the answer as it is
/// generated.
pub enum RagResponse {
    Complete(String),
    Stream(BoxStream<'static, String>),
}

impl RagResponse {
    pub async fn into_text(self) -> String {
        match self {
            RagResponse::Complete(text) => text,
            RagResponse::Stream(chunks) => chunks.collect::<Vec<_>>().await.concat(),
        }
    }
}

impl fmt::Debug for RagResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RagResponse::Complete(text) => f.debug_tuple("Complete").field(text).finish(),
            RagResponse::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Renders retrieved chunks as numbered context blocks ahead of the question.
pub fn build_prompt(query: &str, hits: &[ScoredChunk]) -> String {
    let mut context = String::new();
    for (position, hit) in hits.iter().enumerate() {
        let mut source = hit.content_type.to_string();
        if !hit.metadata.filename.is_empty() {
            source.push_str(&format!(", {}", hit.metadata.filename));
        }
        if let Some(page) = hit.metadata.page_number {
            source.push_str(&format!(", page {page}"));
        }
        context.push_str(&format!("[{}] ({source})\n{}\n\n", position + 1, hit.content.trim()));
    }

    format!(
        "You are a helpful assistant answering questions about a document. \
         Answer using only the context below. If the context does not contain the answer, \
         say that you don't know.\n\n\
         Context:\n{context}\
         Question: {query}\n\
         Answer:"
    )
}

pub struct RagService<S: ?Sized, E: ?Sized> {
    retriever: HybridRetriever<S, E>,
    generators: HashMap<ModelType, Arc<dyn TextGenerator>>,
}

impl<S, E> RagService<S, E>
where
    S: DocumentStore + ?Sized,
    E: Embedder + ?Sized,
{
    pub fn new(retriever: HybridRetriever<S, E>) -> Self {
        Self {
            retriever,
            generators: HashMap::new(),
        }
    }

    pub fn with_generator(mut self, model: ModelType, generator: Arc<dyn TextGenerator>) -> Self {
        self.generators.insert(model, generator);
        self
    }

    /// Retrieves context and generates an answer. Never fails: every error is
    /// rendered into the returned text.
    pub async fn generate_rag_response(
        &self,
        query: &str,
        search_type: SearchMode,
        top_k: usize,
        model_type: ModelType,
        stream: bool,
    ) -> RagResponse {
        if query.trim().is_empty() {
            return RagResponse::Complete(EMPTY_QUERY_ANSWER.to_string());
        }

        let outcome = match self.retriever.search(query, search_type, top_k).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(%error, "retrieval failed");
                return RagResponse::Complete(format!(
                    "Sorry, I couldn't search the documents: {error}"
                ));
            }
        };
        for warning in &outcome.warnings {
            warn!(%warning, "answering from degraded retrieval");
        }
        if outcome.hits.is_empty() {
            return RagResponse::Complete(NO_CONTEXT_ANSWER.to_string());
        }

        let Some(generator) = self.generators.get(&model_type) else {
            return RagResponse::Complete(format!("The {model_type} model is not configured."));
        };

        let prompt = build_prompt(query, &outcome.hits);
        info!(
            model = %model_type,
            mode = %outcome.effective_mode,
            context_chunks = outcome.hits.len(),
            stream,
            "generating answer"
        );

        if !stream {
            return match generator.generate(&prompt).await {
                Ok(answer) => RagResponse::Complete(strip_reasoning(&answer)),
                Err(error) => {
                    warn!(%error, "answer generation failed");
                    RagResponse::Complete(format!("Sorry, answer generation failed: {error}"))
                }
            };
        }

        match generator.generate_stream(&prompt).await {
            Ok(tokens) => {
                let chunks = tokens.scan(false, |failed, token| {
                    if *failed {
                        return future::ready(None);
                    }
                    let text = match token {
                        Ok(text) => text,
                        Err(error) => {
                            *failed = true;
                            format!("\n\n[answer generation interrupted: {error}]")
                        }
                    };
                    future::ready(Some(text))
                });
                RagResponse::Stream(chunks.boxed())
            }
            Err(error) => {
                warn!(%error, "answer stream failed to start");
                RagResponse::Stream(
                    stream::once(future::ready(format!(
                        "Sorry, answer generation failed: {error}"
                    )))
                    .boxed(),
                )
            }
        }
    }
}
