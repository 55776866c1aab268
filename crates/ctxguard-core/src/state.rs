//! Per-agent compaction state kept in the conversation's key-value store

use crate::error::{GuardError, GuardResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// Key holding the running conversation summary
pub const STATE_KEY_SUMMARY: &str = "__context_guard_summary";
/// Diagnostic key holding the token count that triggered the last summarization
pub const STATE_KEY_SUMMARIZED_AT: &str = "__context_guard_summarized_at";
/// Key holding the turn-count watermark of the last compaction
pub const STATE_KEY_TURNS_AT_COMPACTION: &str = "__context_guard_turns_at_compaction";
/// Key holding how many turns the last compaction kept verbatim
pub const STATE_KEY_TURNS_KEPT: &str = "__context_guard_turns_kept";

/// Key-value state scoped to one conversation
///
/// Owned by the session store; the guard never deletes entries.
#[async_trait]
pub trait ConversationState: Send + Sync {
    /// Read a value, `None` when absent
    async fn get(&self, agent_id: &str, key: &str) -> Option<Value>;

    /// Write a value
    async fn set(&self, agent_id: &str, key: &str, value: Value) -> GuardResult<()>;
}

/// In-memory conversation state, mainly for tests and single-process hosts
#[derive(Debug, Default)]
pub struct InMemoryConversationState {
    entries: RwLock<HashMap<(String, String), Value>>,
}

impl InMemoryConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries across all agents
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl ConversationState for InMemoryConversationState {
    async fn get(&self, agent_id: &str, key: &str) -> Option<Value> {
        self.entries
            .read()
            .get(&(agent_id.to_string(), key.to_string()))
            .cloned()
    }

    async fn set(&self, agent_id: &str, key: &str, value: Value) -> GuardResult<()> {
        self.entries
            .write()
            .insert((agent_id.to_string(), key.to_string()), value);
        Ok(())
    }
}

/// Snapshot of the persisted compaction fields for one agent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionState {
    /// Running summary, `None` until the first compaction
    pub summary: Option<String>,
    /// Token estimate that triggered the last summarization (diagnostic)
    pub tokens_at_last_summarization: usize,
    /// Turn count at the last sliding-window compaction
    pub turn_count_at_last_compaction: usize,
    /// Turns kept verbatim behind the summary at that compaction
    pub turns_kept_at_last_compaction: usize,
}

impl CompactionState {
    /// Load the current snapshot; missing or malformed values read as defaults
    pub async fn load(store: &dyn ConversationState, agent_id: &str) -> Self {
        let summary = match store.get(agent_id, STATE_KEY_SUMMARY).await {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        };
        let tokens_at_last_summarization =
            read_count(store.get(agent_id, STATE_KEY_SUMMARIZED_AT).await);
        let turn_count_at_last_compaction =
            read_count(store.get(agent_id, STATE_KEY_TURNS_AT_COMPACTION).await);
        let turns_kept_at_last_compaction =
            read_count(store.get(agent_id, STATE_KEY_TURNS_KEPT).await);

        Self {
            summary,
            tokens_at_last_summarization,
            turn_count_at_last_compaction,
            turns_kept_at_last_compaction,
        }
    }

    /// Persist a new summary and the token count that triggered it
    ///
    /// Failures are logged and reported as `false`; they never fail the request.
    pub async fn persist_summary(
        store: &dyn ConversationState,
        agent_id: &str,
        summary: &str,
        token_count: usize,
    ) -> bool {
        let summary_ok = write_logged(
            store,
            agent_id,
            STATE_KEY_SUMMARY,
            Value::String(summary.to_string()),
        )
        .await;
        let count_ok =
            write_logged(store, agent_id, STATE_KEY_SUMMARIZED_AT, Value::from(token_count)).await;
        summary_ok && count_ok
    }

    /// Persist the turn-count watermark and the number of turns kept
    pub async fn persist_watermark(
        store: &dyn ConversationState,
        agent_id: &str,
        turn_count: usize,
        turns_kept: usize,
    ) -> bool {
        let count_ok = write_logged(
            store,
            agent_id,
            STATE_KEY_TURNS_AT_COMPACTION,
            Value::from(turn_count),
        )
        .await;
        let kept_ok =
            write_logged(store, agent_id, STATE_KEY_TURNS_KEPT, Value::from(turns_kept)).await;
        count_ok && kept_ok
    }
}

/// Counts may come back as integers or floats depending on the store's codec
fn read_count(value: Option<Value>) -> usize {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|v| v as usize)
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as usize))
            .unwrap_or(0),
        _ => 0,
    }
}

async fn write_logged(
    store: &dyn ConversationState,
    agent_id: &str,
    key: &str,
    value: Value,
) -> bool {
    match store.set(agent_id, key, value).await {
        Ok(()) => true,
        Err(e) => {
            let e = match e {
                GuardError::State { message, key: None } => GuardError::state_for_key(message, key),
                other => other,
            };
            warn!(agent = agent_id, key, error = %e, "ContextGuard: failed to persist state");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct ReadOnlyState;

    #[async_trait]
    impl ConversationState for ReadOnlyState {
        async fn get(&self, _agent_id: &str, _key: &str) -> Option<Value> {
            None
        }

        async fn set(&self, _agent_id: &str, _key: &str, _value: Value) -> GuardResult<()> {
            Err(GuardError::state("read-only store"))
        }
    }

    #[tokio::test]
    async fn test_load_defaults_when_empty() {
        let store = InMemoryConversationState::new();
        let state = CompactionState::load(&store, "agent-a").await;
        assert_eq!(state, CompactionState::default());
    }

    #[tokio::test]
    async fn test_persist_and_load_round_trip() {
        let store = InMemoryConversationState::new();
        assert!(CompactionState::persist_summary(&store, "agent-a", "the gist", 104_000).await);
        assert!(CompactionState::persist_watermark(&store, "agent-a", 42, 9).await);

        let state = CompactionState::load(&store, "agent-a").await;
        assert_eq!(state.summary.as_deref(), Some("the gist"));
        assert_eq!(state.tokens_at_last_summarization, 104_000);
        assert_eq!(state.turn_count_at_last_compaction, 42);
        assert_eq!(state.turns_kept_at_last_compaction, 9);
    }

    #[tokio::test]
    async fn test_agents_do_not_share_keys() {
        let store = InMemoryConversationState::new();
        CompactionState::persist_summary(&store, "agent-a", "a", 1).await;

        let other = CompactionState::load(&store, "agent-b").await;
        assert_eq!(other.summary, None);
    }

    #[tokio::test]
    async fn test_float_and_malformed_counts() {
        let store = InMemoryConversationState::new();
        store
            .set("agent-a", STATE_KEY_TURNS_AT_COMPACTION, json!(12.0))
            .await
            .unwrap();
        store
            .set("agent-a", STATE_KEY_SUMMARIZED_AT, json!("lots"))
            .await
            .unwrap();
        store.set("agent-a", STATE_KEY_SUMMARY, json!("")).await.unwrap();

        let state = CompactionState::load(&store, "agent-a").await;
        assert_eq!(state.turn_count_at_last_compaction, 12);
        assert_eq!(state.tokens_at_last_summarization, 0);
        assert_eq!(state.summary, None);
    }

    #[tokio::test]
    async fn test_write_failure_is_reported_not_raised() {
        assert!(!CompactionState::persist_summary(&ReadOnlyState, "agent-a", "s", 10).await);
        assert!(!CompactionState::persist_watermark(&ReadOnlyState, "agent-a", 10, 3).await);
    }
}
