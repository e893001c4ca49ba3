//! Error types for the `lexqa-rag` crate.

use std::path::PathBuf;

use thiserror::Error;

use crate::embedding::EmbeddingModelInfo;

/// Errors that can occur in RAG operations.
///
/// Every pipeline stage reports through one of these variants so callers can
/// tell a missing index apart from a flaky backend. An empty retrieval is
/// *not* an error; see [`AskOutcome`](crate::pipeline::AskOutcome).
#[derive(Debug, Error)]
pub enum RagError {
    /// Source documents could not be loaded.
    #[error("Load error ({}): {message}", .path.display())]
    Load {
        /// The directory or file that failed.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The query-time embedding model does not match the one the index was built with.
    #[error("Embedding model mismatch: index built with {expected}, provider is {actual}")]
    EmbeddingMismatch {
        /// Model identity recorded alongside the index.
        expected: EmbeddingModelInfo,
        /// Model identity of the provider in use.
        actual: EmbeddingModelInfo,
    },

    /// No persisted index exists at the given path.
    #[error("Index not found at {}", .0.display())]
    IndexNotFound(PathBuf),

    /// A persisted index exists but cannot be read back consistently.
    #[error("Index corrupt ({}): {message}", .path.display())]
    IndexCorrupt {
        /// The index location.
        path: PathBuf,
        /// A description of the inconsistency.
        message: String,
    },

    /// An error occurred while generating an answer.
    #[error("Generation error ({backend}): {message}")]
    Generation {
        /// The language model backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A filesystem error while writing the index.
    #[error("I/O error ({}): {source}", .path.display())]
    Io {
        /// The file or directory being accessed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl RagError {
    /// Whether the failure came from a remote backend and may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RagError::Embedding { .. } | RagError::Generation { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RagError::Io { path: path.into(), source }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        RagError::IndexCorrupt { path: path.into(), message: message.into() }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_backend_failures_are_retryable() {
        let embedding = RagError::Embedding { provider: "mock".into(), message: "down".into() };
        let generation = RagError::Generation { backend: "mock".into(), message: "down".into() };
        assert!(embedding.is_retryable());
        assert!(generation.is_retryable());

        assert!(!RagError::IndexNotFound(PathBuf::from("/nope")).is_retryable());
        assert!(!RagError::Config("bad".into()).is_retryable());
    }

    #[test]
    fn mismatch_message_names_both_models() {
        let err = RagError::EmbeddingMismatch {
            expected: EmbeddingModelInfo::new("ollama", "deepseek-r1:1.5b", 1536),
            actual: EmbeddingModelInfo::new("mock", "bag-of-words", 64),
        };
        let message = err.to_string();
        assert!(message.contains("ollama/deepseek-r1:1.5b (1536 dims)"));
        assert!(message.contains("mock/bag-of-words (64 dims)"));
    }
}
