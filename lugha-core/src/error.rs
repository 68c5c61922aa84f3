//! Error types for the Lugha evaluation core.
//!
//! Uses `thiserror` for public API error types. Each concern (similarity math,
//! metric inputs, provider calls, configuration) gets its own enum, and
//! `EvalError` wraps them for callers that want a single error type.

use std::path::PathBuf;

/// Top-level error type for the evaluation core.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("Similarity error: {0}")]
    Similarity(#[from] SimilarityError),

    #[error("Metric error: {0}")]
    Metric(#[from] MetricError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EvalError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Errors from the similarity engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimilarityError {
    #[error("Vector dimensions differ: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("Cannot compare a zero-magnitude vector")]
    ZeroVector,

    #[error("Vector contains a non-finite component")]
    NonFinite,
}

/// Input errors raised by pure metric functions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricError {
    #[error("Invalid relevance grade {grade} at position {position}")]
    InvalidGrade { position: usize, grade: f64 },

    #[error("Invalid timestamps: start={start}, end={end}")]
    InvalidTiming { start: f64, end: f64 },

    #[error("Invalid latency threshold: {threshold}")]
    InvalidThreshold { threshold: f64 },
}

/// Errors from embedding and generation provider interactions.
///
/// Cloneable so that one failed embedding can mark every metric that depends
/// on it as unavailable.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("API request failed: {message}")]
    Request { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    Auth { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

impl ProviderError {
    /// Whether the failure is transient and worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Connection { .. }
                | ProviderError::Timeout { .. }
        )
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::ParseError {
            message: err.to_string(),
        }
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_error_display() {
        let err = SimilarityError::DimensionMismatch { left: 3, right: 4 };
        assert_eq!(err.to_string(), "Vector dimensions differ: 3 vs 4");
    }

    #[test]
    fn test_provider_error_transient() {
        assert!(ProviderError::Timeout { timeout_ms: 10 }.is_transient());
        assert!(ProviderError::RateLimited { retry_after_secs: 1 }.is_transient());
        assert!(
            !ProviderError::Auth {
                provider: "gemini".into()
            }
            .is_transient()
        );
        assert!(
            !ProviderError::ResponseParse {
                message: "bad".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_eval_error_from_provider() {
        let err: EvalError = ProviderError::Timeout { timeout_ms: 250 }.into();
        assert!(matches!(err, EvalError::Provider(_)));
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn test_eval_error_invalid_input() {
        let err = EvalError::invalid_input("empty query");
        assert_eq!(err.to_string(), "Invalid input: empty query");
    }
}
