//! Configuration for the context guard
//!
//! Strategy selection is supplied once per agent when agents are built and
//! never re-read mid-request. A hot reload builds a fresh strategy table from
//! a fresh [`GuardConfig`].

use crate::error::{GuardError, GuardResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Turn limit used by the sliding window strategy when none is configured
pub const DEFAULT_MAX_TURNS: usize = 20;

/// Which compaction algorithm an agent uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Summarize when the token estimate approaches the context window
    #[default]
    Threshold,
    /// Summarize every time enough turns accumulate
    SlidingWindow,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Threshold => "threshold",
            StrategyKind::SlidingWindow => "sliding_window",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-agent strategy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Whether the guard compacts for this agent at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Compaction algorithm
    #[serde(default)]
    pub kind: StrategyKind,
    /// Turns allowed between compactions (sliding window only)
    #[serde(default)]
    pub max_turns: Option<usize>,
    /// Context window to use instead of the registry's value
    #[serde(default)]
    pub context_window_override: Option<usize>,
}

fn default_enabled() -> bool {
    true
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::threshold()
    }
}

impl StrategyConfig {
    /// Token-threshold strategy with registry-resolved context window
    pub fn threshold() -> Self {
        Self {
            enabled: true,
            kind: StrategyKind::Threshold,
            max_turns: None,
            context_window_override: None,
        }
    }

    /// Sliding window strategy allowing `max_turns` turns between compactions
    pub fn sliding_window(max_turns: usize) -> Self {
        Self {
            enabled: true,
            kind: StrategyKind::SlidingWindow,
            max_turns: Some(max_turns),
            context_window_override: None,
        }
    }

    /// Pin the context window instead of asking the registry
    pub fn with_context_window(mut self, tokens: usize) -> Self {
        self.context_window_override = Some(tokens);
        self
    }

    /// Enable or disable compaction for the agent
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Turn limit, falling back to [`DEFAULT_MAX_TURNS`] when unset or zero
    pub fn resolved_max_turns(&self) -> usize {
        match self.max_turns {
            Some(n) if n > 0 => n,
            _ => DEFAULT_MAX_TURNS,
        }
    }
}

/// Empirically chosen compaction constants
///
/// None of these carry precision beyond their round values; they are exposed
/// so deployments can tune them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionTuning {
    /// Windows above this size get a fixed buffer
    pub large_window_threshold: usize,
    /// Fixed buffer for large windows
    pub large_window_buffer: usize,
    /// Buffer share of small windows
    pub small_window_ratio: f64,
    /// Share of the window kept verbatim after a threshold compaction
    pub recent_window_ratio: f64,
    /// Share of the buffer the summary may use
    pub summary_buffer_share: f64,
    /// Words per token when turning the output budget into a word limit
    pub words_per_token: f64,
    /// Share of `max_turns` kept verbatim by the sliding window
    pub sliding_keep_ratio: f64,
    /// Lower bound on turns kept verbatim by the sliding window
    pub min_recent_turns: usize,
    /// Characters of each text part kept by the mechanical fallback summary
    pub fallback_excerpt_chars: usize,
    /// Deadline for the summarization call
    #[serde(with = "humantime_serde")]
    pub summary_timeout: Option<Duration>,
}

impl Default for CompactionTuning {
    fn default() -> Self {
        Self {
            large_window_threshold: 200_000,
            large_window_buffer: 20_000,
            small_window_ratio: 0.20,
            recent_window_ratio: 0.20,
            summary_buffer_share: 0.50,
            words_per_token: 0.75,
            sliding_keep_ratio: 0.30,
            min_recent_turns: 3,
            fallback_excerpt_chars: 200,
            summary_timeout: None,
        }
    }
}

impl CompactionTuning {
    /// Token buffer reserved below the context window
    ///
    /// Large windows get a fixed buffer, small ones a share of the window.
    pub fn buffer_for(&self, context_window: usize) -> usize {
        if context_window > self.large_window_threshold {
            self.large_window_buffer
        } else {
            scale(context_window, self.small_window_ratio)
        }
    }

    /// Token budget for turns kept verbatim after a threshold compaction
    pub fn recent_budget_for(&self, context_window: usize) -> usize {
        scale(context_window, self.recent_window_ratio)
    }

    /// Turns kept verbatim by a sliding window compaction
    pub fn sliding_recent_keep(&self, max_turns: usize) -> usize {
        scale(max_turns, self.sliding_keep_ratio).max(self.min_recent_turns)
    }

    /// Hard cap on summary output tokens for a given buffer
    pub fn max_output_tokens(&self, buffer_tokens: usize) -> u32 {
        let tokens = scale(buffer_tokens, self.summary_buffer_share);
        u32::try_from(tokens).unwrap_or(u32::MAX)
    }

    /// Word ceiling written into the summarization instruction
    pub fn max_summary_words(&self, max_output_tokens: u32) -> usize {
        scale(max_output_tokens as usize, self.words_per_token)
    }

    /// Check ranges of all ratios and thresholds
    pub fn validate(&self) -> GuardResult<()> {
        let ratios = [
            ("small_window_ratio", self.small_window_ratio),
            ("recent_window_ratio", self.recent_window_ratio),
            ("summary_buffer_share", self.summary_buffer_share),
            ("sliding_keep_ratio", self.sliding_keep_ratio),
        ];
        for (name, value) in ratios {
            if !(value > 0.0 && value <= 1.0) {
                return Err(GuardError::config_with_context(
                    format!("{} must be in (0, 1], got {}", name, value),
                    "Validating compaction tuning",
                ));
            }
        }
        if !(self.words_per_token > 0.0 && self.words_per_token.is_finite()) {
            return Err(GuardError::config(format!(
                "words_per_token must be positive, got {}",
                self.words_per_token
            )));
        }
        if self.large_window_threshold == 0 {
            return Err(GuardError::config("large_window_threshold must be non-zero"));
        }
        if self.min_recent_turns == 0 {
            return Err(GuardError::config("min_recent_turns must be at least 1"));
        }
        Ok(())
    }
}

fn scale(value: usize, ratio: f64) -> usize {
    let scaled = value as f64 * ratio;
    if scaled.is_finite() && scaled >= 0.0 {
        scaled as usize
    } else {
        0
    }
}

/// Top-level guard configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Strategy per agent id
    pub agents: HashMap<String, StrategyConfig>,
    /// Shared compaction constants
    pub tuning: CompactionTuning,
}

impl GuardConfig {
    /// Add or replace one agent's strategy
    pub fn with_agent(mut self, agent_id: impl Into<String>, strategy: StrategyConfig) -> Self {
        self.agents.insert(agent_id.into(), strategy);
        self
    }

    /// Replace the tuning constants
    pub fn with_tuning(mut self, tuning: CompactionTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Validate the shared tuning and every agent entry
    pub fn validate(&self) -> GuardResult<()> {
        self.tuning.validate()?;
        for (agent_id, strategy) in &self.agents {
            if strategy.context_window_override == Some(0) {
                return Err(GuardError::config_with_context(
                    "context_window_override must be non-zero",
                    format!("Validating strategy for agent '{}'", agent_id),
                ));
            }
        }
        Ok(())
    }

    /// Load configuration from a file
    ///
    /// Supports JSON, TOML, and YAML formats based on file extension.
    /// Returns default config if file doesn't exist.
    pub fn load_from_file(path: &Path) -> GuardResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            GuardError::io_with_path(
                format!("Failed to read config file: {}", e),
                path.display().to_string(),
            )
        })?;

        let config: GuardConfig = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => toml::from_str(&content).map_err(|e| {
                GuardError::config_with_context(
                    format!("Failed to parse TOML config: {}", e),
                    format!("Deserializing TOML configuration from '{}'", path.display()),
                )
            })?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| {
                GuardError::config_with_context(
                    format!("Failed to parse YAML config: {}", e),
                    format!("Deserializing YAML configuration from '{}'", path.display()),
                )
            })?,
            _ => serde_json::from_str(&content).map_err(|e| {
                GuardError::config_with_context(
                    format!("Failed to parse JSON config: {}", e),
                    format!("Deserializing JSON configuration from '{}'", path.display()),
                )
            })?,
        };

        config.validate()?;
        Ok(config)
    }
}
