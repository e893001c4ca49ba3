//! Prompt template binding retrieved context and the user's question.

use crate::error::{RagError, Result};

/// Placeholder replaced by the assembled context.
pub const CONTEXT_PLACEHOLDER: &str = "{context}";

/// Placeholder replaced by the user's question.
pub const QUESTION_PLACEHOLDER: &str = "{question}";

/// The grounding prompt used unless a custom template is supplied.
pub const DEFAULT_TEMPLATE: &str = "\
Use the pieces of information provided in the context to answer the user's question.
If you don't know the answer, just say that you don't know; don't try to make up an answer.
Do not provide anything outside of the given context.

Question: {question}
Context: {context}

Answer:
";

/// A prompt with `{context}` and `{question}` slots.
///
/// Rendering is a single left-to-right pass over the template, so braces
/// that appear inside the substituted context or question are copied
/// verbatim and never expanded.
///
/// # Example
///
/// ```rust
/// use lexqa_rag::PromptTemplate;
///
/// let template = PromptTemplate::new("Q: {question}\nC: {context}").unwrap();
/// assert_eq!(template.render("Article 20", "{context}?"), "Q: {context}?\nC: Article 20");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self { template: DEFAULT_TEMPLATE.to_string() }
    }
}

impl PromptTemplate {
    /// Create a custom template.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if either placeholder is missing.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in [CONTEXT_PLACEHOLDER, QUESTION_PLACEHOLDER] {
            if !template.contains(placeholder) {
                return Err(RagError::Config(format!(
                    "prompt template must contain the {placeholder} placeholder"
                )));
            }
        }
        Ok(Self { template })
    }

    /// The raw template text.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitute `context` and `question` into the template.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();
        while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix(CONTEXT_PLACEHOLDER) {
                out.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUESTION_PLACEHOLDER) {
                out.push_str(question);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}
