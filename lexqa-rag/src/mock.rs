//! Deterministic in-process backends for tests and offline demos.
//!
//! [`MockEmbeddingProvider`] hashes words into buckets, so texts that share
//! vocabulary score high and texts with no words in common score (close to)
//! zero. [`MockAnswerGenerator`] returns a canned answer and records every
//! prompt it receives.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::embedding::{EmbeddingModelInfo, EmbeddingProvider, ensure_embeddable};
use crate::error::{RagError, Result};
use crate::generation::AnswerGenerator;

const MOCK_PROVIDER: &str = "mock";

/// FNV-1a, stable across platforms and releases.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0xcbf2_9ce4_8422_2325, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(0x0100_0000_01b3))
}

/// Hashed bag-of-words embeddings.
///
/// # Example
///
/// ```rust
/// use lexqa_rag::{EmbeddingProvider, MockEmbeddingProvider};
///
/// let provider = MockEmbeddingProvider::new(64);
/// assert_eq!(provider.dimensions(), 64);
/// ```
#[derive(Debug)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
    model: String,
    fail_with: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockEmbeddingProvider {
    /// Create a provider producing `dimensions`-long vectors.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            model: "bag-of-words".to_string(),
            fail_with: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Report a different model name, e.g. to simulate a model swap.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Make every call fail with [`RagError::Embedding`].
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    /// Sleep for `delay` before answering each call, like a slow server.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `embed` / `embed_batch` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        if self.dimensions == 0 {
            return vector;
        }
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let bucket = fnv1a(word.to_lowercase().as_bytes()) % self.dimensions as u64;
            vector[bucket as usize] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }

    fn check(&self, text: &str) -> Result<()> {
        if let Some(message) = &self.fail_with {
            return Err(RagError::Embedding {
                provider: MOCK_PROVIDER.to_string(),
                message: message.clone(),
            });
        }
        ensure_embeddable(MOCK_PROVIDER, text)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.check(text)?;
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        texts
            .iter()
            .map(|text| {
                self.check(text)?;
                Ok(self.vectorize(text))
            })
            .collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_info(&self) -> EmbeddingModelInfo {
        EmbeddingModelInfo::new(MOCK_PROVIDER, &self.model, self.dimensions)
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Fixed(String),
    Echo,
    Fail(String),
}

/// An [`AnswerGenerator`] that never leaves the process.
#[derive(Debug)]
pub struct MockAnswerGenerator {
    reply: Reply,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl MockAnswerGenerator {
    /// Always answer with `response`.
    pub fn new(response: impl Into<String>) -> Self {
        Self::with_reply(Reply::Fixed(response.into()))
    }

    /// Answer with the prompt itself.
    pub fn echo() -> Self {
        Self::with_reply(Reply::Echo)
    }

    /// Fail every call with [`RagError::Generation`].
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_reply(Reply::Fail(message.into()))
    }

    fn with_reply(reply: Reply) -> Self {
        Self { reply, delay: None, prompts: Mutex::new(Vec::new()) }
    }

    /// Sleep for `delay` before replying, like a slow model.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

#[async_trait]
impl AnswerGenerator for MockAnswerGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.reply {
            Reply::Fixed(text) => Ok(text.clone()),
            Reply::Echo => Ok(prompt.to_string()),
            Reply::Fail(message) => {
                Err(RagError::Generation { backend: "mock".to_string(), message: message.clone() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::cosine_similarity;

    #[tokio::test]
    async fn shared_words_score_higher_than_disjoint_text() {
        let provider = MockEmbeddingProvider::new(256);
        let query = provider.embed("right to peaceful assembly").await.unwrap();
        let related = provider.embed("Everyone has the right to freedom of peaceful assembly").await.unwrap();
        let unrelated = provider.embed("photosynthesis converts sunlight").await.unwrap();

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
        assert_eq!(query, provider.embed("Right to PEACEFUL assembly!").await.unwrap());
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let provider = MockEmbeddingProvider::new(8);
        assert!(matches!(provider.embed("   ").await, Err(RagError::Embedding { .. })));
        assert!(provider.embed_batch(&["ok", ""]).await.is_err());
    }

    #[tokio::test]
    async fn generator_records_prompts_and_fails_on_demand() {
        let generator = MockAnswerGenerator::new("Articles 20 and 21.");
        assert_eq!(generator.generate("prompt one").await.unwrap(), "Articles 20 and 21.");
        assert_eq!(generator.prompts(), vec!["prompt one".to_string()]);

        let failing = MockAnswerGenerator::failing("backend down");
        assert!(matches!(failing.generate("p").await, Err(RagError::Generation { .. })));
    }
}
