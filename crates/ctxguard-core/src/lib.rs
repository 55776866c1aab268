//! Context guard core library
//!
//! A pre-call hook for multi-turn language model conversations. Before every
//! model call, [`ContextGuard::before_model_call`] looks up the calling
//! agent's compaction strategy and, when the conversation has grown past its
//! limit, replaces older turns with a summary produced by the agent's own
//! model. Compaction failures never block the call.

#![forbid(unsafe_code)]

pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod llm;
pub mod registry;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use config::{CompactionTuning, DEFAULT_MAX_TURNS, GuardConfig, StrategyConfig, StrategyKind};
pub use context::{CompactOutcome, CompactReport, Strategy};
pub use error::{GuardError, GuardResult};
pub use guard::{CallContext, ContextGuard, StrategyTable};
pub use llm::{GenerateRequest, LanguageModelClient};
pub use registry::{DEFAULT_CONTEXT_WINDOW, ModelCapabilityRegistry, ModelInfo, ModelRegistry};
pub use state::{CompactionState, ConversationState, InMemoryConversationState};
pub use types::{ModelRequest, Part, Role, Turn};
