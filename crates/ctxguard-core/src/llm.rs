//! Language model client seam used for summarization

use crate::error::GuardResult;
use async_trait::async_trait;

/// A single non-streaming generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    /// System instruction for the summarization call
    pub system_instruction: String,
    /// User prompt carrying the transcript to summarize
    pub prompt: String,
    /// Hard cap on generated tokens
    pub max_output_tokens: u32,
}

/// Client for the agent's own language model
///
/// Implementations may stream internally; the guard only needs the fully
/// concatenated text. Dropping the returned future must abort the call,
/// which is how caller cancellation propagates.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LanguageModelClient: Send + Sync {
    /// Generate text for the request
    async fn generate(&self, request: GenerateRequest) -> GuardResult<String>;
}
