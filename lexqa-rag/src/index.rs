//! Exact nearest-neighbour vector index using cosine similarity.
//!
//! A [`VectorIndex`] is built once from `(vector, chunk)` entries and is
//! immutable afterwards, so it can be shared behind an `Arc` by any number of
//! concurrent searches without locking. Persistence lives in
//! [`store`](crate::store).

use serde::{Deserialize, Serialize};

use crate::document::{Chunk, SearchResult};
use crate::embedding::EmbeddingModelInfo;
use crate::error::{RagError, Result};

/// The distance metric used by every index. Fixed: cosine similarity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Cosine similarity in `[-1, 1]`, higher is closer.
    #[default]
    Cosine,
}

/// One stored vector and the chunk it was computed from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    /// The chunk's embedding.
    pub vector: Vec<f32>,
    /// The chunk text and source metadata.
    pub chunk: Chunk,
}

impl IndexEntry {
    /// Pair a vector with its chunk.
    pub fn new(vector: Vec<f32>, chunk: Chunk) -> Self {
        Self { vector, chunk }
    }
}

/// An immutable collection of embedded chunks.
///
/// # Example
///
/// ```rust,ignore
/// use lexqa_rag::{IndexEntry, VectorIndex};
///
/// let index = VectorIndex::build("udhr", embedder.model_info(), entries)?;
/// let results = index.search(&query_vector, 4)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    collection: String,
    model: EmbeddingModelInfo,
    entries: Vec<IndexEntry>,
}

/// Compute cosine similarity between two vectors.
///
/// Sums are taken in `f64`, so large finite components do not overflow.
/// Returns 0.0 if either vector has zero magnitude or the result is not finite.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let score = (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32;
    if score.is_finite() { score } else { 0.0 }
}

impl VectorIndex {
    /// Build an index from scratch.
    ///
    /// Entries keep their given order, which is the tie-break order for search.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingMismatch`] if an entry's dimension differs
    /// from `model.dimensions`, and [`RagError::Embedding`] if a vector holds a
    /// NaN or infinite component.
    pub fn build(
        collection: impl Into<String>,
        model: EmbeddingModelInfo,
        entries: Vec<IndexEntry>,
    ) -> Result<Self> {
        for entry in &entries {
            if entry.vector.len() != model.dimensions {
                let actual = EmbeddingModelInfo { dimensions: entry.vector.len(), ..model.clone() };
                return Err(RagError::EmbeddingMismatch { expected: model, actual });
            }
            if entry.vector.iter().any(|v| !v.is_finite()) {
                return Err(RagError::Embedding {
                    provider: model.provider.clone(),
                    message: format!("non-finite vector component for chunk '{}'", entry.chunk.id),
                });
            }
        }
        Ok(Self { collection: collection.into(), model, entries })
    }

    /// Reassemble an index read from storage without re-validating vectors.
    pub(crate) fn from_parts(collection: String, model: EmbeddingModelInfo, entries: Vec<IndexEntry>) -> Self {
        Self { collection, model, entries }
    }

    /// The collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Identity of the model that produced every vector in the index.
    pub fn model(&self) -> &EmbeddingModelInfo {
        &self.model
    }

    /// The similarity metric.
    pub fn metric(&self) -> Metric {
        Metric::Cosine
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Verify that vectors from `model` can be compared with this index.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingMismatch`] if provider, model name or
    /// dimensionality differ.
    pub fn check_compatible(&self, model: &EmbeddingModelInfo) -> Result<()> {
        if *model != self.model {
            return Err(RagError::EmbeddingMismatch {
                expected: self.model.clone(),
                actual: model.clone(),
            });
        }
        Ok(())
    }

    /// Return the `k` entries most similar to `query`, best first.
    ///
    /// Ties keep insertion order. A `k` larger than the index returns every
    /// entry once; an empty index returns an empty `Vec`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingMismatch`] if `query` has the wrong dimension
    /// and [`RagError::Embedding`] if it holds a NaN or infinite component.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if query.len() != self.model.dimensions {
            let actual = EmbeddingModelInfo { dimensions: query.len(), ..self.model.clone() };
            return Err(RagError::EmbeddingMismatch { expected: self.model.clone(), actual });
        }
        if query.iter().any(|v| !v.is_finite()) {
            return Err(RagError::Embedding {
                provider: self.model.provider.clone(),
                message: "non-finite query vector component".to_string(),
            });
        }
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(&entry.vector, query)))
            .collect();

        // Stable sort: equal scores stay in insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| SearchResult { chunk: self.entries[i].chunk.clone(), score })
            .collect())
    }
}
