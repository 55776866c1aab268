//! Model capability registry
//!
//! Maps model identifiers to their context window. The compaction engine
//! only ever calls the synchronous [`ModelCapabilityRegistry::context_window_for`]
//! accessor; refreshing the catalog is the embedding application's job and
//! happens through [`ModelRegistry::replace_from_catalog_json`].

use crate::error::{GuardError, GuardResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, info};

/// Fallback context window (128k tokens) for models missing from the catalog
pub const DEFAULT_CONTEXT_WINDOW: usize = 128_000;

/// Read-only view of per-model context windows
pub trait ModelCapabilityRegistry: Send + Sync {
    /// Context window in tokens, or [`DEFAULT_CONTEXT_WINDOW`] for unknown models
    fn context_window_for(&self, model_id: &str) -> usize;
}

/// Metadata for a single model, as published in a provider catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub context_window: i64,
    #[serde(default)]
    pub default_max_tokens: i64,
    #[serde(default)]
    pub cost_per_1m_in: f64,
    #[serde(default)]
    pub cost_per_1m_out: f64,
}

impl ModelInfo {
    /// Create an entry with only an id and a context window
    pub fn new(id: impl Into<String>, context_window: i64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            context_window,
            default_max_tokens: 0,
            cost_per_1m_in: 0.0,
            cost_per_1m_out: 0.0,
        }
    }
}

#[derive(Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

/// Context windows for commonly used models
static BUILTIN_MODELS: LazyLock<Vec<ModelInfo>> = LazyLock::new(|| {
    [
        // Anthropic Claude models
        ("claude-3-5-sonnet-20241022", 200_000),
        ("claude-sonnet-4-20250514", 200_000),
        ("claude-3-opus-20240229", 200_000),
        ("claude-3-haiku-20240307", 200_000),
        // OpenAI GPT models
        ("gpt-4", 128_000),
        ("gpt-4-turbo", 128_000),
        ("gpt-4o", 128_000),
        ("gpt-4o-mini", 128_000),
        ("gpt-4.1", 1_047_576),
        ("o1", 200_000),
        ("o1-mini", 128_000),
        // Google Gemini models
        ("gemini-1.5-pro", 2_000_000),
        ("gemini-1.5-flash", 1_000_000),
        ("gemini-2.0-flash", 1_000_000),
        ("gemini-2.5-pro", 1_048_576),
        // GLM models (Zhipu)
        ("glm-4", 128_000),
        ("glm-4-plus", 128_000),
    ]
    .into_iter()
    .map(|(id, window)| ModelInfo::new(id, window))
    .collect()
});

/// Thread-safe in-memory model catalog
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: RwLock<HashMap<String, ModelInfo>>,
}

impl ModelRegistry {
    /// Create an empty registry; every lookup falls back to the default
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry seeded with the built-in model table
    pub fn with_builtin_models() -> Self {
        let registry = Self::new();
        registry.replace_all(BUILTIN_MODELS.iter().cloned());
        registry
    }

    /// Look up full metadata for a model
    pub fn get(&self, model_id: &str) -> Option<ModelInfo> {
        self.models.read().get(model_id).cloned()
    }

    /// Add or overwrite one model entry
    pub fn insert(&self, info: ModelInfo) {
        self.models.write().insert(info.id.clone(), info);
    }

    /// Number of known models
    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    /// Whether the registry holds no models
    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }

    /// Atomically replace the whole catalog
    pub fn replace_all(&self, models: impl IntoIterator<Item = ModelInfo>) {
        let models: HashMap<String, ModelInfo> =
            models.into_iter().map(|m| (m.id.clone(), m)).collect();
        *self.models.write() = models;
    }

    /// Parse a provider catalog (`{"models": [...]}`) and swap it in
    ///
    /// On a parse error the current catalog stays in place.
    pub fn replace_from_catalog_json(&self, bytes: &[u8]) -> GuardResult<usize> {
        let document: CatalogDocument = serde_json::from_slice(bytes)
            .map_err(|e| GuardError::registry(format!("invalid model catalog: {}", e)))?;
        let count = document.models.len();
        self.replace_all(document.models);
        info!(models = count, "Context window registry: catalog loaded");
        Ok(count)
    }
}

impl ModelCapabilityRegistry for ModelRegistry {
    fn context_window_for(&self, model_id: &str) -> usize {
        match self.models.read().get(model_id) {
            Some(info) if info.context_window > 0 => info.context_window as usize,
            _ => {
                debug!(
                    model = model_id,
                    default = DEFAULT_CONTEXT_WINDOW,
                    "Context window registry: unknown model, using default"
                );
                DEFAULT_CONTEXT_WINDOW
            }
        }
    }
}
