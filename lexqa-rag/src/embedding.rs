//! Embedding provider trait for generating vector embeddings from text.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Identity of the model that produced a set of vectors.
///
/// Recorded in every persisted index so query-time embeddings can be checked
/// against build-time embeddings before any similarity is computed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmbeddingModelInfo {
    /// Backend name, e.g. `ollama` or `openai`.
    pub provider: String,
    /// Model name as understood by the backend.
    pub model: String,
    /// Length of every vector the model produces.
    pub dimensions: usize,
}

impl EmbeddingModelInfo {
    /// Create a model identity.
    pub fn new(provider: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
        Self { provider: provider.into(), model: model.into(), dimensions }
    }
}

impl fmt::Display for EmbeddingModelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({} dims)", self.provider, self.model, self.dimensions)
    }
}

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends (Ollama, OpenAI, etc.)
/// behind a unified async interface. The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
///
/// Empty or whitespace-only input is rejected with [`RagError::Embedding`]
/// by every provider in this crate (see [`ensure_embeddable`]).
///
/// # Example
///
/// ```rust,ignore
/// use lexqa_rag::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("right to peaceful assembly").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// The default implementation calls [`embed`](EmbeddingProvider::embed)
    /// sequentially for each input. Override this method if the backend
    /// supports native batch embedding for better throughput.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Return the identity of the underlying model.
    fn model_info(&self) -> EmbeddingModelInfo;
}

/// Reject input that has no content to embed.
///
/// # Errors
///
/// Returns [`RagError::Embedding`] if `text` is empty or whitespace only.
pub fn ensure_embeddable(provider: &str, text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(RagError::Embedding {
            provider: provider.to_string(),
            message: "cannot embed empty text".to_string(),
        });
    }
    Ok(())
}

/// Check that every vector returned by a backend has the advertised length.
#[cfg_attr(not(any(feature = "ollama", feature = "openai")), allow(dead_code))]
pub(crate) fn ensure_dimensions(provider: &str, expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
    if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
        return Err(RagError::Embedding {
            provider: provider.to_string(),
            message: format!("backend returned {} dimensions, expected {expected}", bad.len()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_is_not_embeddable() {
        assert!(ensure_embeddable("mock", "  \n\t").is_err());
        assert!(ensure_embeddable("mock", "").is_err());
        assert!(ensure_embeddable("mock", "Article 20").is_ok());
    }

    #[test]
    fn dimension_check_reports_offending_length() {
        let err = ensure_dimensions("mock", 3, &[vec![0.0; 3], vec![0.0; 2]]).unwrap_err();
        assert!(err.to_string().contains("returned 2 dimensions, expected 3"));
    }
}
