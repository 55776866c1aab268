//! Compaction strategies
//!
//! Two algorithms decide whether and how to compact before a model call:
//!
//! - [`ThresholdStrategy`] estimates tokens and summarizes once the
//!   remaining capacity drops below a safety buffer. Reactive.
//! - [`SlidingWindowStrategy`] summarizes every time more than `max_turns`
//!   turns have accumulated since the last compaction. Preventive.
//!
//! The strategy for an agent is chosen once, when the guard's strategy table
//! is built. Each strategy instance serves exactly one agent and serializes
//! its compaction critical section on its own mutex.

mod sliding_window;
mod threshold;


pub use sliding_window::SlidingWindowStrategy;
pub use threshold::ThresholdStrategy;

use super::estimator::TokenEstimator;
use super::prompt::{is_summary_turn, summary_turn};
use super::summarizer::Summarizer;
use crate::config::{CompactionTuning, StrategyConfig, StrategyKind};
use crate::error::GuardResult;
use crate::guard::CallContext;
use crate::llm::LanguageModelClient;
use crate::registry::ModelCapabilityRegistry;
use crate::types::{ModelRequest, Turn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// What a strategy did to the request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompactOutcome {
    /// Under the trigger; the request was left as is
    BelowThreshold,
    /// Under the trigger; the stored summary was prepended
    SummaryInjected,
    /// The trigger fired but the split left nothing to summarize
    NothingToSummarize,
    /// A concurrent request for the same agent compacted first; its summary was reused
    ReusedConcurrentSummary { turns_after: usize },
    /// Old turns were summarized and replaced
    Compacted(CompactReport),
}

impl CompactOutcome {
    /// Whether a new summary was generated
    pub fn was_compacted(&self) -> bool {
        matches!(self, CompactOutcome::Compacted(_))
    }

    /// Report of the compaction, if one happened
    pub fn report(&self) -> Option<&CompactReport> {
        match self {
            CompactOutcome::Compacted(report) => Some(report),
            _ => None,
        }
    }
}

/// Details of a completed compaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactReport {
    /// Compaction id (for tracking)
    pub compact_id: Uuid,
    /// When the compaction finished
    pub compacted_at: DateTime<Utc>,
    /// Strategy that compacted
    pub strategy: StrategyKind,
    /// Turns in the request before compaction
    pub turns_before: usize,
    /// Turns in the request after compaction, summary turn included
    pub turns_after: usize,
    /// Turns folded into the summary
    pub old_turns: usize,
    /// Token estimate before compaction
    pub tokens_before: usize,
    /// Token estimate after compaction
    pub tokens_after: usize,
}

impl CompactReport {
    /// Get the number of tokens saved
    pub fn tokens_saved(&self) -> usize {
        self.tokens_before.saturating_sub(self.tokens_after)
    }

    /// Get the compression ratio
    pub fn compression_ratio(&self) -> f32 {
        if self.tokens_before == 0 {
            1.0
        } else {
            self.tokens_after as f32 / self.tokens_before as f32
        }
    }
}

/// Compaction strategy for one agent
#[derive(Debug)]
pub enum Strategy {
    Threshold(ThresholdStrategy),
    SlidingWindow(SlidingWindowStrategy),
}

impl Strategy {
    /// Build the strategy selected by `config`
    pub fn new(
        config: &StrategyConfig,
        registry: Arc<dyn ModelCapabilityRegistry>,
        client: Arc<dyn LanguageModelClient>,
        tuning: CompactionTuning,
    ) -> Self {
        let window = ContextWindow {
            registry,
            override_tokens: config.context_window_override,
        };
        let summarizer = Summarizer::new(client, tuning.clone());
        match config.kind {
            StrategyKind::Threshold => {
                Strategy::Threshold(ThresholdStrategy::new(window, summarizer, tuning))
            }
            StrategyKind::SlidingWindow => Strategy::SlidingWindow(SlidingWindowStrategy::new(
                window,
                summarizer,
                tuning,
                config.resolved_max_turns(),
            )),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Threshold(_) => StrategyKind::Threshold,
            Strategy::SlidingWindow(_) => StrategyKind::SlidingWindow,
        }
    }

    /// Strategy identifier for logging
    pub fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Compact `request.turns` if this strategy's trigger fires
    ///
    /// On `Err` the request is left exactly as it was passed in.
    pub async fn compact(
        &self,
        ctx: &CallContext,
        request: &mut ModelRequest,
    ) -> GuardResult<CompactOutcome> {
        match self {
            Strategy::Threshold(s) => s.compact(ctx, request).await,
            Strategy::SlidingWindow(s) => s.compact(ctx, request).await,
        }
    }
}

/// Context window source: a pinned override or the registry
#[derive(Clone)]
pub(crate) struct ContextWindow {
    registry: Arc<dyn ModelCapabilityRegistry>,
    override_tokens: Option<usize>,
}

impl ContextWindow {
    pub(crate) fn resolve(&self, model_id: &str) -> usize {
        match self.override_tokens {
            Some(tokens) if tokens > 0 => tokens,
            _ => self.registry.context_window_for(model_id),
        }
    }
}

impl std::fmt::Debug for ContextWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextWindow")
            .field("override_tokens", &self.override_tokens)
            .finish_non_exhaustive()
    }
}

/// The turns that make up the conversation proper
///
/// A leading summary turn stands in for turns that were already summarized.
/// It is set aside whenever a stored summary exists, since that summary is
/// passed to the summarizer separately.
pub(crate) fn conversation_turns(turns: &[Turn], has_stored_summary: bool) -> &[Turn] {
    match turns.first() {
        Some(first) if has_stored_summary && is_summary_turn(first) => &turns[1..],
        _ => turns,
    }
}

/// Prepend the stored summary unless the first turn already carries one
///
/// Returns `None` when nothing needs to change.
pub(crate) fn inject_summary(turns: &[Turn], summary: Option<&str>) -> Option<Vec<Turn>> {
    let summary = summary?;
    if turns.first().is_some_and(is_summary_turn) {
        return None;
    }
    let mut injected = Vec::with_capacity(turns.len() + 1);
    injected.push(summary_turn(summary));
    injected.extend_from_slice(turns);
    Some(injected)
}

/// Commit a pending injection and report it
pub(crate) fn finish_with_injection(
    request: &mut ModelRequest,
    injected: Option<Vec<Turn>>,
) -> CompactOutcome {
    match injected {
        Some(turns) => {
            request.turns = turns;
            CompactOutcome::SummaryInjected
        }
        None => CompactOutcome::BelowThreshold,
    }
}

/// `[summary turn] + recent`
pub(crate) fn replace_with_summary(summary: &str, recent: &[Turn]) -> Vec<Turn> {
    let mut turns = Vec::with_capacity(recent.len() + 1);
    turns.push(summary_turn(summary));
    turns.extend_from_slice(recent);
    turns
}

/// Build the report for a finished compaction
pub(crate) fn build_report(
    strategy: StrategyKind,
    request: &ModelRequest,
    turns_before: usize,
    old_turns: usize,
    tokens_before: usize,
) -> CompactReport {
    CompactReport {
        compact_id: Uuid::new_v4(),
        compacted_at: Utc::now(),
        strategy,
        turns_before,
        turns_after: request.turns.len(),
        old_turns,
        tokens_before,
        tokens_after: TokenEstimator::estimate(
            &request.turns,
            request.system_instruction.as_deref(),
        ),
    }
}
