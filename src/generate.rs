//! Answer generation

use crate::{Availability, Result};
use async_trait::async_trait;

/// Reply the model is told to give when the context lacks the answer
pub const NO_ANSWER: &str = "I cannot find the answer in the provided document.";

/// Trait for answer generators
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Answer `question` using only `context`
    async fn generate(&self, context: &str, question: &str) -> Result<String>;

    /// Get model identifier
    fn model_id(&self) -> &str;

    /// Whether this is a real provider or a stand-in
    fn availability(&self) -> Availability {
        Availability::Available
    }
}

/// Build the grounded-answer prompt sent to a language model
#[must_use]
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a helpful AI assistant. Answer the following question based ONLY on the \
         provided context. If the answer cannot be found in the context, say \"{NO_ANSWER}\"\n\n\
         Context:\n{context}\n\nQuestion: {question}\n\nAnswer:"
    )
}

/// Stand-in used when no generation provider is configured
#[derive(Debug, Clone, Default)]
pub struct PlaceholderGenerator;

impl PlaceholderGenerator {
    /// Create a placeholder generator
    #[must_use]
    pub fn new() -> Self {
        tracing::warn!("no generation provider configured, answers will be placeholders");
        Self
    }
}

#[async_trait]
impl AnswerGenerator for PlaceholderGenerator {
    async fn generate(&self, context: &str, question: &str) -> Result<String> {
        let preview: String = context.chars().take(100).collect();
        Ok(format!(
            "[placeholder answer] No generation provider is configured. \
             Set GEMINI_API_KEY to get model answers.\n\n\
             Context preview: {preview}...\nQuestion: {question}"
        ))
    }

    fn model_id(&self) -> &str {
        "placeholder"
    }

    fn availability(&self) -> Availability {
        Availability::Fallback
    }
}
