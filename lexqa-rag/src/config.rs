//! Configuration for the RAG pipeline.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chunking::{Chunker, ChunkingStrategy, FixedSizeChunker, RecursiveChunker};
use crate::error::{RagError, Result};
use crate::loader::LoaderConfig;

/// Configuration parameters for the RAG pipeline.
///
/// Deserializable from TOML; missing fields take their defaults.
///
/// ```toml
/// collection = "udhr"
/// chunk_size = 1000
/// chunk_overlap = 200
/// top_k = 4
///
/// [loader]
/// recursive = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Name recorded in the index manifest.
    pub collection: String,
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Record each chunk's character offset within its page.
    pub track_start_index: bool,
    /// Chunk a document's pages as one continuous text instead of page by page.
    pub merge_pages: bool,
    /// Which chunker to build.
    pub chunking_strategy: ChunkingStrategy,
    /// Number of top results to return from vector search.
    pub top_k: usize,
    /// Minimum similarity score for results. `None` keeps the top-k regardless of score.
    pub similarity_threshold: Option<f32>,
    /// Number of chunk texts sent per embedding request during ingestion.
    pub embedding_batch_size: usize,
    /// Maximum number of embedding requests in flight during ingestion.
    pub embedding_concurrency: usize,
    /// Upper bound for a single embedding or generation call, in seconds.
    pub request_timeout_secs: u64,
    /// Source document loading options.
    pub loader: LoaderConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            collection: "documents".to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
            track_start_index: true,
            merge_pages: false,
            chunking_strategy: ChunkingStrategy::Fixed,
            top_k: 4,
            similarity_threshold: None,
            embedding_batch_size: 32,
            embedding_concurrency: 4,
            request_timeout_secs: 60,
            loader: LoaderConfig::default(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Parse and validate a TOML configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the document does not parse or fails validation.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: RagConfig =
            toml::from_str(s).map_err(|e| RagError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML configuration file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RagError::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// The per-call timeout for remote embedding and generation requests.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Build the chunker selected by [`chunking_strategy`](Self::chunking_strategy).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the chunk sizes are invalid.
    pub fn chunker(&self) -> Result<Arc<dyn Chunker>> {
        Ok(match self.chunking_strategy {
            ChunkingStrategy::Fixed => Arc::new(
                FixedSizeChunker::new(self.chunk_size, self.chunk_overlap)?
                    .with_start_index(self.track_start_index)
                    .with_merged_pages(self.merge_pages),
            ),
            ChunkingStrategy::Recursive => Arc::new(
                RecursiveChunker::new(self.chunk_size, self.chunk_overlap)?
                    .with_start_index(self.track_start_index),
            ),
        })
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `embedding_batch_size == 0` or `embedding_concurrency == 0`
    /// - `similarity_threshold` is not finite
    /// - `request_timeout_secs == 0`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if self.embedding_batch_size == 0 || self.embedding_concurrency == 0 {
            return Err(RagError::Config(
                "embedding_batch_size and embedding_concurrency must be greater than zero"
                    .to_string(),
            ));
        }
        if self.similarity_threshold.is_some_and(|t| !t.is_finite()) {
            return Err(RagError::Config("similarity_threshold must be finite".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(RagError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the collection name recorded in the index.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.config.collection = name.into();
        self
    }

    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Enable or disable recording of chunk start offsets.
    pub fn track_start_index(mut self, enabled: bool) -> Self {
        self.config.track_start_index = enabled;
        self
    }

    /// Chunk each document as one continuous text across page boundaries.
    pub fn merge_pages(mut self, enabled: bool) -> Self {
        self.config.merge_pages = enabled;
        self
    }

    /// Select the chunking strategy.
    pub fn chunking_strategy(mut self, strategy: ChunkingStrategy) -> Self {
        self.config.chunking_strategy = strategy;
        self
    }

    /// Set the number of top results to return from vector search.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = Some(threshold);
        self
    }

    /// Set how many chunk texts go into one embedding request.
    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding_batch_size = size;
        self
    }

    /// Set how many embedding requests may run at once during ingestion.
    pub fn embedding_concurrency(mut self, concurrency: usize) -> Self {
        self.config.embedding_concurrency = concurrency;
        self
    }

    /// Set the per-call timeout for remote backends.
    ///
    /// The timeout is stored in whole seconds; a fractional part rounds up,
    /// so the effective timeout is never shorter than requested.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        self.config.request_timeout_secs = secs;
        self
    }

    /// Set the document loader options.
    pub fn loader(mut self, loader: LoaderConfig) -> Self {
        self.config.loader = loader;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
