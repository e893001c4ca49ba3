//! # lexqa-rag
//!
//! Retrieval-augmented question answering over a directory of documents.
//!
//! ## Overview
//!
//! Indexing runs offline and once per corpus:
//!
//! - [`DirectoryLoader`] - reads PDFs (via `pdftotext`), `.txt` and `.md` into pages
//! - [`Chunker`] - splits pages into overlapping windows ([`FixedSizeChunker`], [`RecursiveChunker`])
//! - [`EmbeddingProvider`] - turns chunk text into vectors
//! - [`VectorIndex`] + [`store`] - exact cosine search, persisted with an atomic version swap
//!
//! Answering runs per question:
//!
//! - [`Retriever`] - embeds the question and returns the top-k chunks
//! - [`assemble_context`] + [`PromptTemplate`] - build one grounded prompt
//! - [`AnswerGenerator`] - calls the language model
//!
//! [`RagPipeline`] wires all of this together.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use lexqa_rag::{AskOutcome, MockAnswerGenerator, MockEmbeddingProvider, RagConfig, RagPipeline};
//!
//! # async fn run() -> lexqa_rag::Result<()> {
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(MockEmbeddingProvider::new(256)))
//!     .answer_generator(Arc::new(MockAnswerGenerator::new("Articles 20 and 21.")))
//!     .build()?;
//!
//! pipeline.ingest("data", "vectorstore/udhr").await?;
//! if let AskOutcome::Answered(answer) =
//!     pipeline.ask("Which articles protect peaceful assembly?", "vectorstore/udhr", None).await?
//! {
//!     println!("{}", answer.text);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! | Feature | Adds |
//! |---------|------|
//! | `ollama` | [`OllamaEmbeddingProvider`](ollama::OllamaEmbeddingProvider) |
//! | `openai` | [`OpenAIEmbeddingProvider`](openai::OpenAIEmbeddingProvider) |
//! | `chat` | [`ChatCompletionGenerator`](chat::ChatCompletionGenerator) (Groq, OpenAI, compatible) |
//! | `full` | all of the above |

pub mod chunking;
pub mod config;
pub mod context;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod loader;
pub mod mock;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod retry;
pub mod store;

#[cfg(feature = "chat")]
pub mod chat;
#[cfg(all(test, any(feature = "chat", feature = "ollama", feature = "openai")))]
mod http_stub;
#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;

pub use chunking::{Chunker, ChunkingStrategy, FixedSizeChunker, RecursiveChunker, chunk_documents};
pub use config::{RagConfig, RagConfigBuilder};
pub use context::{CONTEXT_SEPARATOR, NO_RELEVANT_CONTEXT, assemble_context};
pub use document::{Chunk, Document, Page, SearchResult};
pub use embedding::{EmbeddingModelInfo, EmbeddingProvider, ensure_embeddable};
pub use error::{RagError, Result};
pub use generation::AnswerGenerator;
pub use index::{IndexEntry, Metric, VectorIndex, cosine_similarity};
pub use loader::{DirectoryLoader, LoadFailure, LoadReport, LoaderConfig};
pub use mock::{MockAnswerGenerator, MockEmbeddingProvider};
pub use pipeline::{Answer, AskOutcome, IngestReport, QueryEngine, RagPipeline, RagPipelineBuilder};
pub use prompt::{DEFAULT_TEMPLATE, PromptTemplate};
pub use retriever::{Retriever, RetrieverConfig};
pub use retry::{RetryPolicy, RetryingAnswerGenerator, RetryingEmbeddingProvider, retry_with_backoff};
pub use store::IndexManifest;

#[cfg(feature = "chat")]
pub use chat::ChatCompletionGenerator;
#[cfg(feature = "ollama")]
pub use ollama::OllamaEmbeddingProvider;
#[cfg(feature = "openai")]
pub use openai::OpenAIEmbeddingProvider;
