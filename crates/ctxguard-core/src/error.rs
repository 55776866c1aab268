//! Error types for the context guard

use thiserror::Error;

/// Result type alias for context guard operations
pub type GuardResult<T> = Result<T, GuardError>;

/// Main error type for the context guard
///
/// Only `Config` and `Registry` errors ever reach the embedding application.
/// Everything raised while compacting a live request is caught by the guard,
/// logged and swallowed so the model call proceeds uncompacted.
#[derive(Error, Debug, Clone)]
pub enum GuardError {
    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },

    /// Errors reported by a language model client
    #[error("LLM error: {message}")]
    Llm {
        message: String,
        provider: Option<String>,
    },

    /// Summarization failed; wraps the underlying cause
    #[error("Summarization failed: {source}")]
    Summarization {
        #[source]
        source: Box<GuardError>,
    },

    /// The summarization call exceeded its deadline
    #[error("Summarization timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The calling request was cancelled
    #[error("Request was cancelled")]
    Cancelled,

    /// Conversation state store errors
    #[error("State error: {message}")]
    State { message: String, key: Option<String> },

    /// Malformed model catalog data
    #[error("Registry error: {message}")]
    Registry { message: String },

    /// IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        path: Option<String>,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },
}

impl GuardError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: None,
        }
    }

    /// Create a configuration error with context
    pub fn config_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Create a new LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
            provider: None,
        }
    }

    /// Create an LLM error with provider
    pub fn llm_with_provider(message: impl Into<String>, provider: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
            provider: Some(provider.into()),
        }
    }

    /// Wrap an error as a summarization failure
    pub fn summarization(source: GuardError) -> Self {
        Self::Summarization {
            source: Box::new(source),
        }
    }

    /// Create a new state store error
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
            key: None,
        }
    }

    /// Create a state store error for a specific key
    pub fn state_for_key(message: impl Into<String>, key: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Create a new registry error
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
        }
    }

    /// Create an IO error with the offending path
    pub fn io_with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    /// Check if this error is worth retrying on a later call
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Llm { .. } | Self::Timeout { .. } => true,
            Self::Summarization { source } => source.is_retryable(),
            _ => false,
        }
    }

    /// Check if this error stems from cancellation of the calling request
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Summarization { source } => source.is_cancelled(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for GuardError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<serde_json::Error> for GuardError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GuardError::llm("connection reset");
        assert_eq!(err.to_string(), "LLM error: connection reset");

        let err = GuardError::summarization(GuardError::Timeout { seconds: 30 });
        assert_eq!(
            err.to_string(),
            "Summarization failed: Summarization timeout after 30 seconds"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(GuardError::llm("503").is_retryable());
        assert!(GuardError::summarization(GuardError::llm("rate limited")).is_retryable());
        assert!(!GuardError::Cancelled.is_retryable());
        assert!(!GuardError::config("bad ratio").is_retryable());
    }

    #[test]
    fn test_cancelled_through_wrapper() {
        assert!(GuardError::summarization(GuardError::Cancelled).is_cancelled());
        assert!(!GuardError::state("disk full").is_cancelled());
    }

    #[test]
    fn test_from_json_error() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: GuardError = parse.unwrap_err().into();
        assert!(matches!(err, GuardError::Json { .. }));
    }
}
