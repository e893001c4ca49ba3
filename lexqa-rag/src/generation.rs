//! Answer generation backends.

use async_trait::async_trait;

use crate::error::Result;

/// A language model that turns a filled prompt into answer text.
///
/// Implementations return the model output unmodified; any reasoning markup
/// the model emits is left for the caller to present.
///
/// # Example
///
/// ```rust,ignore
/// use lexqa_rag::AnswerGenerator;
///
/// let answer = generator.generate(&prompt).await?;
/// ```
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Backend name used in errors and logs.
    fn name(&self) -> &str;

    /// Generate an answer for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}
