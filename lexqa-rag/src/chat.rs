//! Answer generation through an OpenAI-compatible `/chat/completions` API.
//!
//! Groq, OpenAI and most self-hosted gateways speak this protocol, so one
//! client covers all of them; the presets only differ in base URL, model
//! and which environment variable holds the key.
//!
//! This module is only available when the `chat` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{RagError, Result};
use crate::generation::AnswerGenerator;

/// Groq's OpenAI-compatible endpoint.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Model used by the [`groq`](ChatCompletionGenerator::groq) preset.
pub const GROQ_DEFAULT_MODEL: &str = "deepseek-r1-distill-llama-70b";

/// OpenAI's API endpoint.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Model used by the [`openai`](ChatCompletionGenerator::openai) preset.
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Client for a chat-completions backend.
///
/// The prompt is sent as a single user message and the first choice's
/// content is returned verbatim.
///
/// # Example
///
/// ```rust,ignore
/// use lexqa_rag::chat::ChatCompletionGenerator;
///
/// let generator = ChatCompletionGenerator::groq()?;
/// let answer = generator.generate(&prompt).await?;
/// ```
#[derive(Clone)]
pub struct ChatCompletionGenerator {
    client: reqwest::Client,
    backend: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl std::fmt::Debug for ChatCompletionGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionGenerator")
            .field("backend", &self.backend)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl ChatCompletionGenerator {
    /// Groq with `deepseek-r1-distill-llama-70b`, key from `GROQ_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the key is not set.
    pub fn groq() -> Result<Self> {
        let key = api_key_from_env("GROQ_API_KEY")?;
        Self::build("groq", GROQ_BASE_URL, key, GROQ_DEFAULT_MODEL)
    }

    /// OpenAI, key from `OPENAI_API_KEY`.
    pub fn openai() -> Result<Self> {
        let key = api_key_from_env("OPENAI_API_KEY")?;
        Self::build("openai", OPENAI_BASE_URL, key, OPENAI_DEFAULT_MODEL)
    }

    /// Any other OpenAI-compatible server.
    pub fn compatible(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        Self::build("compatible", &base_url.into(), api_key.into(), &model.into())
    }

    fn build(backend: &str, base_url: &str, api_key: String, model: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(RagError::Config(format!("{backend} API key must not be empty")));
        }
        Ok(Self {
            client: build_client(Duration::from_secs(60))?,
            backend: backend.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            temperature: None,
            max_tokens: None,
        })
    }

    /// Use a different model on the same backend.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sampling temperature; the backend default applies when unset.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Cap on generated tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Replace the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    /// The model name sent with each request.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn generation_error(&self, message: String) -> RagError {
        RagError::Generation { backend: self.backend.clone(), message }
    }
}

fn api_key_from_env(var: &str) -> Result<String> {
    std::env::var(var).map_err(|_| RagError::Config(format!("{var} environment variable not set")))
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RagError::Config(format!("failed to build HTTP client: {e}")))
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl AnswerGenerator for ChatCompletionGenerator {
    fn name(&self) -> &str {
        &self.backend
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(
            backend = %self.backend,
            model = %self.model,
            prompt_len = prompt.len(),
            "requesting completion"
        );

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(backend = %self.backend, error = %e, "request failed");
                self.generation_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            error!(backend = %self.backend, %status, "API error");
            return Err(self.generation_error(format!("API returned {status}: {detail}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| self.generation_error(format!("failed to parse response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| self.generation_error("response contained no choices".into()))
    }
}
