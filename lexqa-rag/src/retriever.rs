//! Query-time retrieval: embed the question, search the index, filter.

use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument, debug, info_span, warn};

use crate::config::RagConfig;
use crate::document::SearchResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;

/// Retrieval parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrieverConfig {
    /// Results returned when the caller does not pass `k`.
    pub top_k: usize,
    /// Drop results scoring below this value.
    pub similarity_threshold: Option<f32>,
    /// Upper bound for the query embedding call.
    pub request_timeout: Duration,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self::from(&RagConfig::default())
    }
}

impl From<&RagConfig> for RetrieverConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            top_k: config.top_k,
            similarity_threshold: config.similarity_threshold,
            request_timeout: config.request_timeout(),
        }
    }
}

/// Embeds queries with the same model the index was built with and returns
/// the nearest chunks.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
    config: RetrieverConfig,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("model", &self.index.model())
            .field("entries", &self.index.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Retriever {
    /// Create a retriever.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingMismatch`] if `embedder` is not the model
    /// the index was built with.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndex>,
        config: RetrieverConfig,
    ) -> Result<Self> {
        index.check_compatible(&embedder.model_info())?;
        Ok(Self { embedder, index, config })
    }

    /// The index searched by this retriever.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// The retrieval parameters.
    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Return up to `k` (default `top_k`) chunks relevant to `query`, best first.
    ///
    /// An empty index or a threshold nothing clears yields an empty `Vec`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Embedding`] if the query cannot be embedded in time
    /// and [`RagError::EmbeddingMismatch`] if the vector has the wrong length.
    pub async fn retrieve(&self, query: &str, k: Option<usize>) -> Result<Vec<SearchResult>> {
        let k = k.unwrap_or(self.config.top_k);
        let span = info_span!(
            "rag.retrieve",
            k,
            entries = self.index.len(),
            results = tracing::field::Empty
        );
        async move {
            if self.index.is_empty() {
                warn!("index has no entries");
                return Ok(Vec::new());
            }

            let provider = self.index.model().provider.clone();
            let timeout = self.config.request_timeout;
            let vector = tokio::time::timeout(timeout, self.embedder.embed(query))
                .await
                .map_err(|_| RagError::Embedding {
                    provider,
                    message: format!(
                        "query embedding timed out after {}s",
                        timeout.as_secs_f64()
                    ),
                })??;

            let mut results = self.index.search(&vector, k)?;
            if let Some(threshold) = self.config.similarity_threshold {
                results.retain(|r| r.score >= threshold);
            }

            tracing::Span::current().record("results", results.len());
            debug!(
                top_score = results.first().map(|r| r.score),
                "retrieved {} chunks",
                results.len()
            );
            Ok(results)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;
    use crate::index::IndexEntry;
    use crate::mock::MockEmbeddingProvider;
    use std::path::PathBuf;

    async fn index_of(provider: &MockEmbeddingProvider, texts: &[&str]) -> Arc<VectorIndex> {
        let mut entries = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let chunk = Chunk {
                id: format!("doc#{i}"),
                text: text.to_string(),
                start_index: None,
                document_id: "doc".to_string(),
                source_path: PathBuf::from("doc.txt"),
                page_number: 1,
                chunk_index: i,
            };
            entries.push(IndexEntry::new(provider.embed(text).await.unwrap(), chunk));
        }
        Arc::new(VectorIndex::build("test", provider.model_info(), entries).unwrap())
    }

    #[tokio::test]
    async fn returns_best_match_first() {
        let provider = Arc::new(MockEmbeddingProvider::new(128));
        let index = index_of(
            &provider,
            &["freedom of peaceful assembly", "right to own property", "right to education"],
        )
        .await;
        let retriever = Retriever::new(provider, index, RetrieverConfig::default()).unwrap();

        let results = retriever.retrieve("peaceful assembly", Some(2)).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.text, "freedom of peaceful assembly");
    }

    #[tokio::test]
    async fn threshold_can_filter_everything() {
        let provider = Arc::new(MockEmbeddingProvider::new(128));
        let index = index_of(&provider, &["freedom of peaceful assembly"]).await;
        let config = RetrieverConfig { similarity_threshold: Some(1.1), ..RetrieverConfig::default() };
        let retriever = Retriever::new(provider, index, config).unwrap();

        assert!(retriever.retrieve("peaceful assembly", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_a_different_model() {
        let builder = MockEmbeddingProvider::new(64);
        let index = index_of(&builder, &["text"]).await;
        let other = Arc::new(MockEmbeddingProvider::new(64).with_model("other"));

        let err = Retriever::new(other, index, RetrieverConfig::default()).unwrap_err();
        assert!(matches!(err, RagError::EmbeddingMismatch { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_query_embedding_times_out() {
        let builder = MockEmbeddingProvider::new(64);
        let index = index_of(&builder, &["freedom of peaceful assembly"]).await;
        let slow = Arc::new(MockEmbeddingProvider::new(64).with_delay(Duration::from_secs(600)));
        let config = RetrieverConfig { request_timeout: Duration::from_secs(5), ..RetrieverConfig::default() };
        let retriever = Retriever::new(slow, index, config).unwrap();

        let started = tokio::time::Instant::now();
        let err = retriever.retrieve("peaceful assembly", None).await.unwrap_err();
        assert!(matches!(err, RagError::Embedding { .. }));
        assert!(err.to_string().contains("timed out after 5s"), "{err}");
        assert!(started.elapsed() < Duration::from_secs(600));
    }

    #[tokio::test]
    async fn empty_index_returns_nothing_without_embedding() {
        let provider = Arc::new(MockEmbeddingProvider::new(16));
        let index = Arc::new(VectorIndex::build("empty", provider.model_info(), Vec::new()).unwrap());
        let retriever = Retriever::new(provider.clone(), index, RetrieverConfig::default()).unwrap();

        assert!(retriever.retrieve("anything", None).await.unwrap().is_empty());
        assert_eq!(provider.calls(), 0);
    }
}
