//! Token-threshold compaction

use super::{
    CompactOutcome, ContextWindow, build_report, conversation_turns, finish_with_injection,
    inject_summary, replace_with_summary,
};
use crate::config::{CompactionTuning, StrategyKind};
use crate::context::estimator::TokenEstimator;
use crate::context::split::SplitPointSelector;
use crate::context::summarizer::Summarizer;
use crate::error::GuardResult;
use crate::guard::CallContext;
use crate::state::CompactionState;
use crate::types::ModelRequest;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Summarizes older turns once the token estimate crosses
/// `context_window - buffer`
///
/// The buffer is two-tier: a fixed amount for large windows, a share of the
/// window for small ones. After compaction the turns that fit in the recent
/// budget stay verbatim behind one summary turn.
#[derive(Debug)]
pub struct ThresholdStrategy {
    window: ContextWindow,
    summarizer: Summarizer,
    tuning: CompactionTuning,
    lock: Mutex<()>,
}

impl ThresholdStrategy {
    pub(crate) fn new(
        window: ContextWindow,
        summarizer: Summarizer,
        tuning: CompactionTuning,
    ) -> Self {
        Self {
            window,
            summarizer,
            tuning,
            lock: Mutex::new(()),
        }
    }

    pub(crate) async fn compact(
        &self,
        ctx: &CallContext,
        request: &mut ModelRequest,
    ) -> GuardResult<CompactOutcome> {
        let context_window = self.window.resolve(&request.model);
        let buffer = self.tuning.buffer_for(context_window);
        let threshold = context_window.saturating_sub(buffer);

        let snapshot = CompactionState::load(ctx.state.as_ref(), &ctx.agent_id).await;
        let injected = inject_summary(&request.turns, snapshot.summary.as_deref());
        let candidate = injected.as_deref().unwrap_or(&request.turns);
        let total = TokenEstimator::estimate(candidate, request.system_instruction.as_deref());
        let turns_before = candidate.len();

        if total < threshold {
            debug!(
                agent = %ctx.agent_id,
                tokens = total,
                threshold,
                "ContextGuard [threshold]: below threshold"
            );
            return Ok(finish_with_injection(request, injected));
        }

        info!(
            agent = %ctx.agent_id,
            session = ctx.session(),
            strategy = StrategyKind::Threshold.as_str(),
            tokens = total,
            threshold,
            context_window,
            buffer,
            max_summary_words = self
                .tuning
                .max_summary_words(self.tuning.max_output_tokens(buffer)),
            "ContextGuard [threshold]: threshold exceeded, summarizing"
        );

        let _guard = self.lock.lock().await;

        // Another request for this agent may have compacted while we waited
        let current = CompactionState::load(ctx.state.as_ref(), &ctx.agent_id).await;
        let conversation = conversation_turns(&request.turns, current.summary.is_some());
        let recent_budget = self.tuning.recent_budget_for(context_window);
        let split = SplitPointSelector::select_split(conversation, recent_budget);

        let superseded =
            current.summary != snapshot.summary && current.tokens_at_last_summarization >= total;
        if let (true, Some(fresh)) = (superseded, current.summary.as_deref()) {
            request.turns = replace_with_summary(fresh, &conversation[split..]);
            info!(
                agent = %ctx.agent_id,
                session = ctx.session(),
                recent_turns = request.turns.len() - 1,
                "ContextGuard [threshold]: reused summary from concurrent compaction"
            );
            return Ok(CompactOutcome::ReusedConcurrentSummary {
                turns_after: request.turns.len(),
            });
        }

        if split == 0 {
            finish_with_injection(request, injected);
            return Ok(CompactOutcome::NothingToSummarize);
        }

        let (old, recent) = conversation.split_at(split);
        let summary = self
            .summarizer
            .summarize(old, current.summary.as_deref(), buffer, &ctx.cancel)
            .await?;

        let old_turns = old.len();
        let recent_turns = recent.len();
        CompactionState::persist_summary(ctx.state.as_ref(), &ctx.agent_id, &summary, total).await;
        request.turns = replace_with_summary(&summary, recent);

        let report = build_report(StrategyKind::Threshold, request, turns_before, old_turns, total);
        info!(
            agent = %ctx.agent_id,
            session = ctx.session(),
            old_turns,
            recent_turns,
            new_token_estimate = report.tokens_after,
            "ContextGuard [threshold]: conversation compacted"
        );

        Ok(CompactOutcome::Compacted(report))
    }
}
