//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the offline build (load → chunk → embed →
//! index → save) and hands out [`QueryEngine`]s for the online path
//! (retrieve → assemble context → render prompt → generate).
//!
//! # Example
//!
//! ```rust,ignore
//! use lexqa_rag::{AskOutcome, MockAnswerGenerator, MockEmbeddingProvider, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(MockEmbeddingProvider::new(256)))
//!     .answer_generator(Arc::new(MockAnswerGenerator::new("Article 20.")))
//!     .build()?;
//!
//! pipeline.ingest("data/", "vectorstore/udhr").await?;
//! match pipeline.ask("Which article covers assembly?", "vectorstore/udhr", None).await? {
//!     AskOutcome::Answered(answer) => println!("{}", answer.text),
//!     AskOutcome::NoRelevantDocuments => println!("nothing found"),
//! }
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt, stream};
use tracing::{Instrument, debug, error, info, info_span};

use crate::chunking::{Chunker, chunk_documents};
use crate::config::RagConfig;
use crate::context::assemble_context;
use crate::document::{Chunk, SearchResult};
use crate::embedding::{EmbeddingModelInfo, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::generation::AnswerGenerator;
use crate::index::{IndexEntry, VectorIndex};
use crate::loader::{DirectoryLoader, LoadFailure};
use crate::prompt::PromptTemplate;
use crate::retriever::{Retriever, RetrieverConfig};
use crate::store;

/// Summary of a completed [`RagPipeline::ingest`].
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// Documents that were loaded and chunked.
    pub documents: usize,
    /// Non-blank pages across those documents.
    pub pages: usize,
    /// Chunks embedded into the index.
    pub chunks: usize,
    /// Files skipped by the loader.
    pub failures: Vec<LoadFailure>,
    /// The index path passed to `ingest`.
    pub index_path: PathBuf,
    /// The version directory that `CURRENT` now points at.
    pub version_dir: PathBuf,
    /// Model that produced the vectors.
    pub model: EmbeddingModelInfo,
}

/// A generated answer and the passages it was grounded on.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// Raw model output.
    pub text: String,
    /// Retrieved chunks, most relevant first.
    pub sources: Vec<SearchResult>,
}

/// Result of asking a question.
#[derive(Debug, Clone, PartialEq)]
pub enum AskOutcome {
    /// The model answered from retrieved context.
    Answered(Answer),
    /// Retrieval found nothing; the model was not called.
    NoRelevantDocuments,
}

impl AskOutcome {
    /// The answer, if there is one.
    pub fn answer(&self) -> Option<&Answer> {
        match self {
            Self::Answered(answer) => Some(answer),
            Self::NoRelevantDocuments => None,
        }
    }
}

/// The RAG pipeline orchestrator.
///
/// Holds its collaborators explicitly; there is no global state. Construct
/// one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    answer_generator: Arc<dyn AnswerGenerator>,
    chunker: Arc<dyn Chunker>,
    prompt: PromptTemplate,
}

impl std::fmt::Debug for RagPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagPipeline")
            .field("config", &self.config)
            .field("embedding_model", &self.embedding_provider.model_info())
            .field("answer_generator", &self.answer_generator.name())
            .finish_non_exhaustive()
    }
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Build an index from every supported document under `source_dir` and
    /// save it at `index_path`.
    ///
    /// The previous index at `index_path`, if any, stays live until the new
    /// one is completely written.
    ///
    /// # Errors
    ///
    /// - [`RagError::Load`] if the source cannot be read or yields no text.
    /// - [`RagError::Embedding`] naming the affected documents if a batch fails.
    /// - [`RagError::Io`] if the index cannot be written.
    pub async fn ingest(
        &self,
        source_dir: impl AsRef<Path>,
        index_path: impl AsRef<Path>,
    ) -> Result<IngestReport> {
        let source_dir = source_dir.as_ref();
        let index_path = index_path.as_ref();
        let span = info_span!(
            "rag.ingest",
            source = %source_dir.display(),
            index = %index_path.display(),
            chunks = tracing::field::Empty
        );

        async move {
            // 1. Load
            let loader = DirectoryLoader::new(self.config.loader.clone());
            let dir = source_dir.to_path_buf();
            let loaded = run_blocking(source_dir, move || loader.load(&dir)).await?;

            // 2. Chunk
            let chunks = chunk_documents(self.chunker.as_ref(), &loaded.documents);
            if chunks.is_empty() {
                return Err(RagError::Load {
                    path: source_dir.to_path_buf(),
                    message: "source documents contain no text".to_string(),
                });
            }
            tracing::Span::current().record("chunks", chunks.len());
            debug!(chunks = chunks.len(), "chunked documents");

            // 3. Embed, batches in flight concurrently, output in chunk order
            let batches = chunks.chunks(self.config.embedding_batch_size);
            let vectors: Vec<Vec<Vec<f32>>> = stream::iter(batches.map(|b| self.embed_chunks(b)))
                .buffered(self.config.embedding_concurrency)
                .try_collect()
                .await?;

            // 4. Build
            let model = self.embedding_provider.model_info();
            let chunk_count = chunks.len();
            let entries: Vec<IndexEntry> = vectors
                .into_iter()
                .flatten()
                .zip(chunks)
                .map(|(vector, chunk)| IndexEntry::new(vector, chunk))
                .collect();
            let index = VectorIndex::build(self.config.collection.clone(), model.clone(), entries)?;

            // 5. Save
            let path = index_path.to_path_buf();
            let version_dir = run_blocking(index_path, move || store::save(&index, &path)).await?;

            info!(
                documents = loaded.documents.len(),
                pages = loaded.page_count(),
                chunks = chunk_count,
                skipped = loaded.failures.len(),
                model = %model,
                "ingestion complete"
            );

            Ok(IngestReport {
                documents: loaded.documents.len(),
                pages: loaded.page_count(),
                chunks: chunk_count,
                failures: loaded.failures,
                index_path: index_path.to_path_buf(),
                version_dir,
                model,
            })
        }
        .instrument(span)
        .await
    }

    async fn embed_chunks(&self, batch: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
        let provider = self.embedding_provider.model_info().provider;
        let documents = || {
            let ids: BTreeSet<&str> = batch.iter().map(|c| c.document_id.as_str()).collect();
            ids.into_iter().collect::<Vec<_>>().join(", ")
        };

        let timeout = self.config.request_timeout();
        let request = self.embedding_provider.embed_batch(&texts);
        let vectors = match tokio::time::timeout(timeout, request).await {
            Ok(Ok(vectors)) => vectors,
            Ok(Err(e)) => {
                error!(documents = %documents(), error = %e, "embedding failed during ingestion");
                return Err(match e {
                    RagError::Embedding { provider, message } => RagError::Embedding {
                        provider,
                        message: format!("{message} (documents: {})", documents()),
                    },
                    other => other,
                });
            }
            Err(_) => {
                error!(documents = %documents(), "embedding timed out during ingestion");
                return Err(RagError::Embedding {
                    provider,
                    message: format!(
                        "batch timed out after {}s (documents: {})",
                        timeout.as_secs_f64(),
                        documents()
                    ),
                });
            }
        };

        if vectors.len() != batch.len() {
            return Err(RagError::Embedding {
                provider,
                message: format!(
                    "provider returned {} vectors for {} chunks (documents: {})",
                    vectors.len(),
                    batch.len(),
                    documents()
                ),
            });
        }
        Ok(vectors)
    }

    /// Load the index at `index_path` and bind it to this pipeline's
    /// provider, generator and prompt.
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexNotFound`] / [`RagError::IndexCorrupt`] from loading.
    /// - [`RagError::EmbeddingMismatch`] if the index was built with another model.
    pub async fn open_index(&self, index_path: impl AsRef<Path>) -> Result<QueryEngine> {
        let index_path = index_path.as_ref();
        let path = index_path.to_path_buf();
        let index = run_blocking(index_path, move || store::load(&path)).await?;
        let retriever = Retriever::new(
            self.embedding_provider.clone(),
            Arc::new(index),
            RetrieverConfig::from(&self.config),
        )?;
        Ok(QueryEngine {
            retriever,
            answer_generator: self.answer_generator.clone(),
            prompt: self.prompt.clone(),
            request_timeout: self.config.request_timeout(),
        })
    }

    /// Answer `query` from the index at `index_path`.
    ///
    /// Opens the index on every call; hold a [`QueryEngine`] from
    /// [`open_index`](Self::open_index) to answer many questions.
    pub async fn ask(
        &self,
        query: &str,
        index_path: impl AsRef<Path>,
        k: Option<usize>,
    ) -> Result<AskOutcome> {
        self.open_index(index_path).await?.ask(query, k).await
    }
}

/// Run filesystem or subprocess work on the blocking pool, inside the
/// caller's span.
async fn run_blocking<T, F>(path: &Path, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(work)).await.map_err(|e| {
        RagError::io(path, std::io::Error::other(format!("blocking task failed: {e}")))
    })?
}

/// An opened index ready to answer questions.
///
/// Cheap to clone; the index is shared, not copied, so one engine can serve
/// concurrent questions.
#[derive(Clone)]
pub struct QueryEngine {
    retriever: Retriever,
    answer_generator: Arc<dyn AnswerGenerator>,
    prompt: PromptTemplate,
    request_timeout: Duration,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("retriever", &self.retriever)
            .field("answer_generator", &self.answer_generator.name())
            .finish_non_exhaustive()
    }
}

impl QueryEngine {
    /// The loaded index.
    pub fn index(&self) -> &Arc<VectorIndex> {
        self.retriever.index()
    }

    /// Retrieve without generating.
    pub async fn retrieve(&self, query: &str, k: Option<usize>) -> Result<Vec<SearchResult>> {
        self.retriever.retrieve(query, k).await
    }

    /// Retrieve context for `query` and generate a grounded answer.
    ///
    /// When retrieval returns nothing, the outcome is
    /// [`AskOutcome::NoRelevantDocuments`] and the model is not called.
    ///
    /// # Errors
    ///
    /// - [`RagError::Embedding`] if the query cannot be embedded.
    /// - [`RagError::Generation`] if the model fails or times out.
    pub async fn ask(&self, query: &str, k: Option<usize>) -> Result<AskOutcome> {
        let span = info_span!("rag.ask", query_len = query.len(), outcome = tracing::field::Empty);
        async move {
            let sources = self.retriever.retrieve(query, k).await?;
            if sources.is_empty() {
                info!("no relevant documents");
                tracing::Span::current().record("outcome", "no_relevant_documents");
                return Ok(AskOutcome::NoRelevantDocuments);
            }

            let context = assemble_context(&sources);
            let prompt = self.prompt.render(&context, query);
            let text = self.generate(&prompt).await?;

            tracing::Span::current().record("outcome", "answered");
            info!(sources = sources.len(), answer_len = text.len(), "answered question");
            Ok(AskOutcome::Answered(Answer { text, sources }))
        }
        .instrument(span)
        .await
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let backend = self.answer_generator.name().to_string();
        let span = info_span!("rag.generate", backend = %backend, prompt_len = prompt.len());
        async move {
            let request = self.answer_generator.generate(prompt);
            match tokio::time::timeout(self.request_timeout, request).await {
                Ok(Ok(text)) => Ok(text),
                Ok(Err(e)) => {
                    error!(error = %e, "generation failed");
                    Err(e)
                }
                Err(_) => {
                    error!("generation timed out");
                    Err(RagError::Generation {
                        backend,
                        message: format!("timed out after {}s", self.request_timeout.as_secs_f64()),
                    })
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `config`, `embedding_provider` and `answer_generator` are required. The
/// chunker defaults to [`RagConfig::chunker`] and the prompt to
/// [`PromptTemplate::default`].
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(RagConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .answer_generator(Arc::new(generator))
///     .prompt_template(PromptTemplate::new("{context}\n\nQ: {question}")?)  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    answer_generator: Option<Arc<dyn AnswerGenerator>>,
    chunker: Option<Arc<dyn Chunker>>,
    prompt: Option<PromptTemplate>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider used for both indexing and queries.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the language model backend.
    pub fn answer_generator(mut self, generator: Arc<dyn AnswerGenerator>) -> Self {
        self.answer_generator = Some(generator);
        self
    }

    /// Override the chunker selected by the configuration.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Override the grounding prompt.
    pub fn prompt_template(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if any required field is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::Config("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?;
        let answer_generator = self
            .answer_generator
            .ok_or_else(|| RagError::Config("answer_generator is required".to_string()))?;
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => config.chunker()?,
        };

        Ok(RagPipeline {
            config,
            embedding_provider,
            answer_generator,
            chunker,
            prompt: self.prompt.unwrap_or_default(),
        })
    }
}
