//! Turn-count compaction

use super::{
    CompactOutcome, ContextWindow, build_report, conversation_turns, finish_with_injection,
    inject_summary, replace_with_summary,
};
use crate::config::{CompactionTuning, StrategyKind};
use crate::context::estimator::TokenEstimator;
use crate::context::prompt::is_summary_turn;
use crate::context::split::SplitPointSelector;
use crate::context::summarizer::Summarizer;
use crate::error::GuardResult;
use crate::guard::CallContext;
use crate::state::CompactionState;
use crate::types::ModelRequest;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Summarizes every time more than `max_turns` turns have accumulated since
/// the last compaction, regardless of their size
#[derive(Debug)]
pub struct SlidingWindowStrategy {
    window: ContextWindow,
    summarizer: Summarizer,
    tuning: CompactionTuning,
    max_turns: usize,
    lock: Mutex<()>,
}

impl SlidingWindowStrategy {
    pub(crate) fn new(
        window: ContextWindow,
        summarizer: Summarizer,
        tuning: CompactionTuning,
        max_turns: usize,
    ) -> Self {
        Self {
            window,
            summarizer,
            tuning,
            max_turns,
            lock: Mutex::new(()),
        }
    }

    /// Turns allowed between compactions
    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub(crate) async fn compact(
        &self,
        ctx: &CallContext,
        request: &mut ModelRequest,
    ) -> GuardResult<CompactOutcome> {
        let snapshot = CompactionState::load(ctx.state.as_ref(), &ctx.agent_id).await;
        let injected = inject_summary(&request.turns, snapshot.summary.as_deref());
        let conversation = conversation_turns(&request.turns, snapshot.summary.is_some());
        let keeps_compacted = keeps_compacted_history(request, &snapshot);
        let since = turns_since(conversation.len(), keeps_compacted, &snapshot);

        if since <= self.max_turns {
            debug!(
                agent = %ctx.agent_id,
                turns_since_compaction = since,
                max_turns = self.max_turns,
                "ContextGuard [sliding_window]: within turn limit"
            );
            return Ok(finish_with_injection(request, injected));
        }

        info!(
            agent = %ctx.agent_id,
            session = ctx.session(),
            strategy = StrategyKind::SlidingWindow.as_str(),
            turns = conversation.len(),
            turns_since_compaction = since,
            max_turns = self.max_turns,
            "ContextGuard [sliding_window]: turn limit exceeded, summarizing"
        );

        let _guard = self.lock.lock().await;

        let current = CompactionState::load(ctx.state.as_ref(), &ctx.agent_id).await;
        let conversation = conversation_turns(&request.turns, current.summary.is_some());
        let recent_keep = self.tuning.sliding_recent_keep(self.max_turns);
        let split = SplitPointSelector::split_keeping(conversation, recent_keep);

        // A concurrent compaction already covered our turns
        let since = turns_since(conversation.len(), keeps_compacted, &current);
        let covered = since <= self.max_turns
            || (current != snapshot && conversation.len() <= current.turn_count_at_last_compaction);
        if covered {
            if let Some(fresh) = current.summary.as_deref() {
                request.turns = replace_with_summary(fresh, &conversation[split..]);
                info!(
                    agent = %ctx.agent_id,
                    session = ctx.session(),
                    recent_turns = request.turns.len() - 1,
                    "ContextGuard [sliding_window]: reused summary from concurrent compaction"
                );
                return Ok(CompactOutcome::ReusedConcurrentSummary {
                    turns_after: request.turns.len(),
                });
            }
            return Ok(finish_with_injection(request, injected));
        }

        if split == 0 {
            finish_with_injection(request, injected);
            return Ok(CompactOutcome::NothingToSummarize);
        }

        let turns_before = request.turns.len() + usize::from(injected.is_some());
        let tokens_before = match injected.as_deref() {
            Some(turns) => TokenEstimator::estimate(turns, request.system_instruction.as_deref()),
            None => {
                TokenEstimator::estimate(&request.turns, request.system_instruction.as_deref())
            }
        };

        let context_window = self.window.resolve(&request.model);
        let buffer = self.tuning.buffer_for(context_window);
        let (old, recent) = conversation.split_at(split);
        let summary = self
            .summarizer
            .summarize(old, current.summary.as_deref(), buffer, &ctx.cancel)
            .await?;

        let old_turns = old.len();
        let recent_turns = recent.len();
        let watermark = conversation.len();
        let old_estimate = TokenEstimator::estimate_turns(old);
        CompactionState::persist_summary(ctx.state.as_ref(), &ctx.agent_id, &summary, old_estimate)
            .await;
        CompactionState::persist_watermark(
            ctx.state.as_ref(),
            &ctx.agent_id,
            watermark,
            recent_turns,
        )
        .await;
        request.turns = replace_with_summary(&summary, recent);

        let report = build_report(
            StrategyKind::SlidingWindow,
            request,
            turns_before,
            old_turns,
            tokens_before,
        );
        info!(
            agent = %ctx.agent_id,
            session = ctx.session(),
            old_turns,
            recent_turns,
            watermark,
            new_token_estimate = report.tokens_after,
            "ContextGuard [sliding_window]: conversation compacted"
        );

        Ok(CompactOutcome::Compacted(report))
    }
}

/// Whether the host sent back a compacted list instead of its full history
fn keeps_compacted_history(request: &ModelRequest, state: &CompactionState) -> bool {
    state.summary.is_some() && request.turns.first().is_some_and(is_summary_turn)
}

/// Turns added since the last compaction
///
/// A host that keeps the compacted list resends the kept turns after the
/// summary turn; only what follows them is new. A full history is measured
/// against the watermark. A watermark above the current count restarts the
/// count from zero.
fn turns_since(turn_count: usize, keeps_compacted: bool, state: &CompactionState) -> usize {
    if keeps_compacted {
        return turn_count.saturating_sub(state.turns_kept_at_last_compaction);
    }
    let watermark = state.turn_count_at_last_compaction;
    if watermark > turn_count {
        turn_count
    } else {
        turn_count - watermark
    }
}
