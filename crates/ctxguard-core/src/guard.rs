//! Per-call dispatch to the agent's compaction strategy

use crate::config::GuardConfig;
use crate::context::strategy::{CompactOutcome, Strategy};
use crate::error::{GuardError, GuardResult};
use crate::llm::LanguageModelClient;
use crate::registry::ModelCapabilityRegistry;
use crate::state::ConversationState;
use crate::types::ModelRequest;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Everything a strategy needs to know about the calling request
#[derive(Clone)]
pub struct CallContext {
    /// Agent issuing the model call
    pub agent_id: String,
    /// Session id, for logging only
    pub session_id: Option<String>,
    /// Conversation-scoped key-value state
    pub state: Arc<dyn ConversationState>,
    /// Cancellation signal of the calling request
    pub cancel: CancellationToken,
}

impl CallContext {
    pub fn new(agent_id: impl Into<String>, state: Arc<dyn ConversationState>) -> Self {
        Self {
            agent_id: agent_id.into(),
            session_id: None,
            state,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Tie summarization to the caller's cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Session id for log fields
    pub fn session(&self) -> &str {
        self.session_id.as_deref().unwrap_or("-")
    }
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("agent_id", &self.agent_id)
            .field("session_id", &self.session_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Strategy instances keyed by agent id
///
/// Built once from configuration and never mutated afterwards; a reload
/// swaps in a whole new table.
#[derive(Debug, Default)]
pub struct StrategyTable {
    strategies: HashMap<String, Strategy>,
}

impl StrategyTable {
    /// Build one strategy per enabled agent
    ///
    /// Every enabled agent needs a language model client in `clients`; the
    /// summary is always produced by the agent's own model.
    pub fn build(
        config: &GuardConfig,
        registry: Arc<dyn ModelCapabilityRegistry>,
        clients: &HashMap<String, Arc<dyn LanguageModelClient>>,
    ) -> GuardResult<Self> {
        config.validate()?;

        let mut strategies = HashMap::new();
        for (agent_id, strategy_config) in &config.agents {
            if !strategy_config.enabled {
                continue;
            }
            let client = clients.get(agent_id).cloned().ok_or_else(|| {
                GuardError::config_with_context(
                    format!("no language model client for agent '{}'", agent_id),
                    "Building context guard strategies",
                )
            })?;

            let strategy = Strategy::new(
                strategy_config,
                registry.clone(),
                client,
                config.tuning.clone(),
            );
            info!(
                agent = %agent_id,
                strategy = strategy.name(),
                max_turns = strategy_config.max_turns,
                context_window_override = strategy_config.context_window_override,
                "ContextGuard: strategy configured"
            );
            strategies.insert(agent_id.clone(), strategy);
        }

        Ok(Self { strategies })
    }

    pub fn get(&self, agent_id: &str) -> Option<&Strategy> {
        self.strategies.get(agent_id)
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// Pre-call hook that keeps conversations inside their context window
///
/// Call [`ContextGuard::before_model_call`] immediately before dispatching
/// every model request. Failures never block the request: the turns are left
/// as they were and the call proceeds uncompacted.
#[derive(Debug, Default)]
pub struct ContextGuard {
    strategies: RwLock<Arc<StrategyTable>>,
}

impl ContextGuard {
    pub fn new(table: StrategyTable) -> Self {
        Self {
            strategies: RwLock::new(Arc::new(table)),
        }
    }

    /// Swap in a freshly built strategy table
    ///
    /// Calls already in flight finish against the table they started with.
    pub fn reload(&self, table: StrategyTable) {
        let agents = table.len();
        *self.strategies.write() = Arc::new(table);
        info!(agents, "ContextGuard: strategy table reloaded");
    }

    /// Current strategy table
    pub fn strategies(&self) -> Arc<StrategyTable> {
        self.strategies.read().clone()
    }

    /// Compact `request.turns` in place if the agent's strategy says so
    ///
    /// Returns `None` when the agent has no strategy, the request is empty,
    /// or compaction failed.
    pub async fn before_model_call(
        &self,
        ctx: &CallContext,
        request: &mut ModelRequest,
    ) -> Option<CompactOutcome> {
        if request.turns.is_empty() {
            return None;
        }

        let table = self.strategies();
        let strategy = table.get(&ctx.agent_id)?;

        match strategy.compact(ctx, request).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(
                    agent = %ctx.agent_id,
                    session = ctx.session(),
                    strategy = strategy.name(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "ContextGuard: compaction failed, passing through"
                );
                None
            }
        }
    }
}
