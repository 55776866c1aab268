//! Context compaction for multi-turn conversations
//!
//! Keeps a conversation inside its model's context window by replacing older
//! turns with a running summary.
//!
//! # Overview
//!
//! - [`TokenEstimator`] approximates the token cost of turns
//! - [`SplitPointSelector`] picks the boundary between summarized and kept
//!   turns without separating a tool call from its result
//! - [`Summarizer`] asks the agent's model for a structured summary, with a
//!   mechanical fallback
//! - [`Strategy`] decides when to compact: by token threshold or by turn count
//!
//! # Example
//!
//! ```rust,ignore
//! use ctxguard_core::context::Strategy;
//! use ctxguard_core::{CallContext, StrategyConfig, CompactionTuning, ModelRequest};
//!
//! let config = StrategyConfig::sliding_window(20);
//! let strategy = Strategy::new(&config, registry, client, CompactionTuning::default());
//! let outcome = strategy.compact(&ctx, &mut request).await?;
//! ```

pub mod estimator;
pub mod prompt;
pub mod split;
pub mod strategy;
pub mod summarizer;

pub use estimator::TokenEstimator;
pub use split::SplitPointSelector;
pub use strategy::{
    CompactOutcome, CompactReport, SlidingWindowStrategy, Strategy, ThresholdStrategy,
};
pub use summarizer::Summarizer;
