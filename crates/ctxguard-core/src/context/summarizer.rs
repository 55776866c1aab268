//! Conversation summarization for compaction
//!
//! Asks the agent's own model for a structured summary within an output
//! budget derived from the token buffer. An empty answer falls back to a
//! mechanical summary so conversation content is never silently dropped.

use super::prompt::{build_fallback_summary, build_summary_prompt, build_system_instruction};
use crate::config::CompactionTuning;
use crate::error::{GuardError, GuardResult};
use crate::llm::{GenerateRequest, LanguageModelClient};
use crate::types::Turn;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Summarizer bound to one agent's language model
#[derive(Clone)]
pub struct Summarizer {
    client: Arc<dyn LanguageModelClient>,
    tuning: CompactionTuning,
}

impl std::fmt::Debug for Summarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Summarizer")
            .field("tuning", &self.tuning)
            .finish_non_exhaustive()
    }
}

impl Summarizer {
    pub fn new(client: Arc<dyn LanguageModelClient>, tuning: CompactionTuning) -> Self {
        Self { client, tuning }
    }

    /// Summarize `old_turns`, merging `previous_summary` into the result
    ///
    /// Client errors, the optional deadline and cancellation all surface as
    /// [`GuardError::Summarization`]; the caller then leaves the request as is.
    pub async fn summarize(
        &self,
        old_turns: &[Turn],
        previous_summary: Option<&str>,
        buffer_tokens: usize,
        cancel: &CancellationToken,
    ) -> GuardResult<String> {
        let max_output_tokens = self.tuning.max_output_tokens(buffer_tokens);
        let max_words = self.tuning.max_summary_words(max_output_tokens);

        let request = GenerateRequest {
            system_instruction: build_system_instruction(max_words),
            prompt: build_summary_prompt(old_turns, previous_summary),
            max_output_tokens,
        };

        debug!(
            turns = old_turns.len(),
            max_output_tokens,
            max_words,
            "Requesting conversation summary"
        );

        // Dropping the losing branch aborts the in-flight client call
        let text = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(GuardError::summarization(GuardError::Cancelled));
            }
            result = self.generate_with_deadline(request) => {
                result.map_err(GuardError::summarization)?
            }
        };

        if text.trim().is_empty() {
            warn!(
                turns = old_turns.len(),
                "Summarization returned no text, using mechanical summary"
            );
            return Ok(build_fallback_summary(
                old_turns,
                previous_summary,
                self.tuning.fallback_excerpt_chars,
            ));
        }

        Ok(text)
    }

    async fn generate_with_deadline(&self, request: GenerateRequest) -> GuardResult<String> {
        match self.tuning.summary_timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.client.generate(request))
                .await
                .map_err(|_| GuardError::Timeout {
                    seconds: deadline.as_secs(),
                })?,
            None => self.client.generate(request).await,
        }
    }
}
