//! Ollama embedding provider using the local `/api/embed` endpoint.
//!
//! This module is only available when the `ollama` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::{EmbeddingModelInfo, EmbeddingProvider, ensure_dimensions, ensure_embeddable};
use crate::error::{RagError, Result};

const PROVIDER: &str = "ollama";

/// Base URL used when `OLLAMA_HOST` is not set.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// The model used when none is configured.
pub const DEFAULT_MODEL: &str = "deepseek-r1:1.5b";

/// Hidden size of `deepseek-r1:1.5b`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// An [`EmbeddingProvider`] backed by a local Ollama server.
///
/// # Configuration
///
/// - `base_url` – from the constructor or `OLLAMA_HOST`, defaulting to
///   `http://localhost:11434`. A host without scheme gets `http://`.
/// - `model` – defaults to `deepseek-r1:1.5b`.
/// - `dimensions` – must match the model; use
///   [`probe_dimensions`](Self::probe_dimensions) when unsure.
///
/// # Example
///
/// ```rust,ignore
/// use lexqa_rag::ollama::OllamaEmbeddingProvider;
///
/// let provider = OllamaEmbeddingProvider::from_env()?.probe_dimensions().await?;
/// let embedding = provider.embed("right to peaceful assembly").await?;
/// ```
#[derive(Debug, Clone)]
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbeddingProvider {
    /// Create a provider for `model` served at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, model, Duration::from_secs(60))
    }

    /// Like [`new`](Self::new) with an explicit per-request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: normalize_base_url(&base_url.into()),
            model: model.into(),
            dimensions: DEFAULT_DIMENSIONS,
        })
    }

    /// Create a provider for the default model using `OLLAMA_HOST`.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
        Self::new(base_url, DEFAULT_MODEL)
    }

    /// Set the model name (e.g. `nomic-embed-text`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Declare the vector length the model produces.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self
    }

    /// Ask the server for one embedding and adopt its length.
    pub async fn probe_dimensions(mut self) -> Result<Self> {
        let vectors = self.request(&["dimension probe"]).await?;
        let dims = vectors.first().map(Vec::len).unwrap_or(0);
        if dims == 0 {
            return Err(RagError::Embedding {
                provider: PROVIDER.to_string(),
                message: format!("model '{}' returned an empty embedding", self.model),
            });
        }
        debug!(provider = PROVIDER, model = %self.model, dims, "probed embedding dimensions");
        self.dimensions = dims;
        Ok(self)
    }

    /// The server base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);
        let body = EmbedRequest { model: &self.model, input: texts.to_vec() };

        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "request failed");
            RagError::Embedding { provider: PROVIDER.to_string(), message: format!("request failed: {e}") }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error).unwrap_or(body);
            error!(provider = PROVIDER, %status, "API error");
            return Err(RagError::Embedding {
                provider: PROVIDER.to_string(),
                message: format!("API returned {status}: {detail}"),
            });
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| RagError::Embedding {
            provider: PROVIDER.to_string(),
            message: format!("failed to parse response: {e}"),
        })?;

        if parsed.embeddings.len() != texts.len() {
            return Err(RagError::Embedding {
                provider: PROVIDER.to_string(),
                message: format!(
                    "API returned {} embeddings for {} inputs",
                    parsed.embeddings.len(),
                    texts.len()
                ),
            });
        }
        Ok(parsed.embeddings)
    }
}

/// Accept `host:port` as well as full URLs, and drop a trailing slash.
fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| RagError::Embedding {
            provider: PROVIDER.to_string(),
            message: "API returned empty response".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        for text in texts {
            ensure_embeddable(PROVIDER, text)?;
        }
        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let vectors = self.request(texts).await?;
        ensure_dimensions(PROVIDER, self.dimensions, &vectors)?;
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_info(&self) -> EmbeddingModelInfo {
        EmbeddingModelInfo::new(PROVIDER, &self.model, self.dimensions)
    }
}
