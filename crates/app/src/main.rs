use chrono::Utc;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use localrag_core::{
    load_elements, normalize_elements, BulkIngestionEngine, ChunkSet, DescriptorEnricher,
    DocumentStore, FusionWeights, GeminiConfig, GeminiGenerator, GenerationOptions,
    HybridRetriever, IngestionOptions, IngestionRun, ModelType, NormalizeOptions, OllamaConfig,
    OllamaEmbedder, OllamaGenerator, OpenSearchConfig, OpenSearchStore, RagResponse, RagService,
    SearchMode, TextGenerator, VisionModel,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "localrag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// OpenSearch base URL
    #[arg(long, env = "OPENSEARCH_URL", default_value = "http://localhost:9200")]
    opensearch_url: String,

    /// OpenSearch index name
    #[arg(long, env = "OPENSEARCH_INDEX", default_value = "localrag")]
    opensearch_index: String,

    /// Ollama base URL
    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Ollama embedding model
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "nomic-embed-text")]
    embedding_model: String,

    /// Ollama model used to describe tables
    #[arg(long, env = "TABLE_MODEL", default_value = "deepseek-r1:1.5b")]
    table_model: String,

    /// Ollama model used for answers
    #[arg(long, env = "ANSWER_MODEL", default_value = "llama3.2")]
    answer_model: String,

    /// Gemini API key; Gemini features are disabled without it
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    /// Gemini model used for image descriptions and answers
    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-2.5-flash")]
    gemini_model: String,

    /// Weight of the normalized keyword score in hybrid ranking
    #[arg(long, default_value = "0.5")]
    keyword_weight: f64,

    /// Weight of the normalized semantic score in hybrid ranking
    #[arg(long, default_value = "0.5")]
    semantic_weight: f64,

    /// Timeout for every backend request, in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value = "30")]
    http_timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Turn a parsed element dump into enriched chunk artifacts.
    Prepare {
        /// Parser output: a JSON array of elements.
        #[arg(long, default_value = "parsed_data.json")]
        elements: PathBuf,
        /// Directory that receives the chunk artifact files.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Do not describe images; images without parsed text are dropped.
        #[arg(long, default_value_t = false)]
        skip_images: bool,
        /// Do not describe tables; they keep their parsed text.
        #[arg(long, default_value_t = false)]
        skip_tables: bool,
    },
    /// Load chunk artifacts, then recreate the index and ingest them.
    Ingest {
        /// Directory holding the chunk artifact files.
        #[arg(long, default_value = ".")]
        chunks_dir: PathBuf,
        /// Documents per bulk request.
        #[arg(long, default_value = "100")]
        batch_size: usize,
    },
    /// Print ranked chunks for a query.
    Search {
        #[arg(long)]
        query: String,
        /// keyword, semantic or hybrid
        #[arg(long, default_value = "hybrid")]
        mode: SearchMode,
        #[arg(long, default_value = "5")]
        top_k: usize,
    },
    /// Answer a question from the indexed documents.
    Ask {
        #[arg(long)]
        query: String,
        /// keyword, semantic or hybrid
        #[arg(long, default_value = "hybrid")]
        mode: SearchMode,
        #[arg(long, default_value = "5")]
        top_k: usize,
        /// gemini or ollama
        #[arg(long, default_value = "gemini")]
        model: ModelType,
        /// Print the answer as it is generated.
        #[arg(long, default_value_t = false)]
        stream: bool,
    },
}

impl Cli {
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    fn ollama_config(&self) -> OllamaConfig {
        OllamaConfig {
            base_url: self.ollama_url.clone(),
            timeout: self.timeout(),
        }
    }

    fn gemini(&self) -> anyhow::Result<Option<Arc<GeminiGenerator>>> {
        let Some(api_key) = self.gemini_api_key.as_deref().filter(|key| !key.trim().is_empty())
        else {
            return Ok(None);
        };
        let mut config = GeminiConfig::new(api_key, &self.gemini_model);
        config.timeout = config.timeout.max(self.timeout());
        Ok(Some(Arc::new(GeminiGenerator::new(config, GenerationOptions::default())?)))
    }

    fn store(&self) -> anyhow::Result<Arc<OpenSearchStore>> {
        Ok(Arc::new(OpenSearchStore::new(OpenSearchConfig {
            endpoint: self.opensearch_url.clone(),
            timeout: self.timeout(),
        })?))
    }

    fn embedder(&self) -> anyhow::Result<Arc<OllamaEmbedder>> {
        Ok(Arc::new(OllamaEmbedder::new(&self.ollama_config(), &self.embedding_model)?))
    }

    fn retriever(&self) -> anyhow::Result<HybridRetriever<OpenSearchStore, OllamaEmbedder>> {
        Ok(HybridRetriever::new(self.store()?, self.embedder()?, &self.opensearch_index)
            .with_weights(FusionWeights {
                keyword: self.keyword_weight,
                semantic: self.semantic_weight,
            }))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            return Err(error.into());
        }
    }

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "localrag boot"
    );

    match &cli.command {
        Command::Prepare {
            elements,
            out_dir,
            skip_images,
            skip_tables,
        } => {
            let parsed = load_elements(elements)?;
            info!(path = %elements.display(), elements = parsed.len(), "loaded parsed elements");

            let normalized = normalize_elements(&parsed, &NormalizeOptions::default());
            for error in &normalized.errors {
                warn!(%error, "element dropped during normalization");
            }

            let mut enricher = DescriptorEnricher::new();
            if !skip_tables {
                let tables: Arc<dyn TextGenerator> = Arc::new(OllamaGenerator::new(
                    &cli.ollama_config(),
                    &cli.table_model,
                    GenerationOptions::default(),
                )?);
                enricher = enricher.with_table_describer(tables);
            }
            if !skip_images {
                match cli.gemini()? {
                    Some(gemini) => {
                        let images: Arc<dyn VisionModel> = gemini;
                        enricher = enricher.with_image_describer(images);
                    }
                    None => warn!("GEMINI_API_KEY is not set; image chunks stay undescribed"),
                }
            }

            let enriched = enricher.enrich(normalized.chunks).await;

            let set = ChunkSet::from_chunks(enriched.chunks);
            set.save(out_dir)?;
            println!(
                "Prepared {} text, {} table and {} image chunks in {} ({} described, {} failed, {} dropped empty)",
                set.text.len(),
                set.tables.len(),
                set.images.len(),
                out_dir.display(),
                enriched.described,
                enriched.errors.len(),
                enriched.dropped_empty
            );
        }
        Command::Ingest {
            chunks_dir,
            batch_size,
        } => {
            let store = cli.store()?;
            let cluster = store.ping().await?;
            info!(
                cluster = %cluster.cluster_name,
                version = %cluster.version,
                "connected to OpenSearch"
            );

            let engine = BulkIngestionEngine::new(
                store.clone(),
                cli.embedder()?,
                IngestionOptions {
                    batch_size: *batch_size,
                },
            );
            let IngestionRun { schema, report } = engine
                .ingest_directory(&cli.opensearch_index, chunks_dir)
                .await?;
            if report.embedding_failures > 0 || report.skipped_empty > 0 {
                warn!(
                    embedding_failures = report.embedding_failures,
                    skipped_empty = report.skipped_empty,
                    "some chunks were not submitted"
                );
            }

            let total = store.count_documents(&schema.name).await;
            match total {
                Ok(total) => info!(index = %schema.name, documents = total, "index document count"),
                Err(error) => warn!(%error, "unable to count indexed documents"),
            }
            println!(
                "Ingestion complete: {} successful, {} failed",
                report.succeeded, report.failed
            );
        }
        Command::Search { query, mode, top_k } => {
            let retriever = cli.retriever()?;
            let outcome = retriever.search(query, *mode, *top_k).await?;

            println!(
                "query: {} mode={} effective_mode={}",
                outcome.query, outcome.requested_mode, outcome.effective_mode
            );
            for warning in &outcome.warnings {
                println!("warning: {warning}");
            }
            for (rank, hit) in outcome.hits.iter().enumerate() {
                println!(
                    "[{}] score={:.4} mode={} type={} file={} page={}",
                    rank + 1,
                    hit.score,
                    hit.mode,
                    hit.content_type,
                    hit.metadata.filename,
                    hit.metadata
                        .page_number
                        .map_or_else(|| "-".to_string(), |page| page.to_string())
                );
                println!("  {}", hit.content.trim());
            }
        }
        Command::Ask {
            query,
            mode,
            top_k,
            model,
            stream,
        } => {
            let retriever = cli.retriever()?;
            let ollama: Arc<dyn TextGenerator> = Arc::new(OllamaGenerator::new(
                &cli.ollama_config(),
                &cli.answer_model,
                GenerationOptions::default(),
            )?);
            let mut service = RagService::new(retriever).with_generator(ModelType::Ollama, ollama);
            if let Some(gemini) = cli.gemini()? {
                let gemini: Arc<dyn TextGenerator> = gemini;
                service = service.with_generator(ModelType::Gemini, gemini);
            }

            match service
                .generate_rag_response(query, *mode, *top_k, *model, *stream)
                .await
            {
                RagResponse::Complete(answer) => println!("{answer}"),
                RagResponse::Stream(mut chunks) => {
                    let mut stdout = std::io::stdout();
                    while let Some(chunk) = chunks.next().await {
                        write!(stdout, "{chunk}")?;
                        stdout.flush()?;
                    }
                    writeln!(stdout)?;
                }
            }
        }
    }

    Ok(())
}
