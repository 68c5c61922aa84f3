//! Embedding and generation provider contracts and their implementations.
//!
//! The evaluator only sees the two traits below. Concrete clients:
//! - [`GeminiEmbedder`] / [`GeminiGenerator`]: Google Gemini REST API
//! - [`LocalEmbedder`]: offline hashed bag-of-words vectors
//! - [`NullGenerator`]: placeholder when no generation backend is configured
//! - [`mock`]: scripted providers for tests and dry runs
//!
//! Retry/backoff lives here (in the HTTP clients), never in the evaluator.

pub mod embedding;
pub mod generation;
pub mod mock;

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EmbeddingConfig, GenerationConfig, RetryConfig, resolve_api_key};
use crate::error::{ConfigError, ProviderError};

pub use embedding::{GeminiEmbedder, LocalEmbedder};
pub use generation::{GeminiGenerator, NullGenerator};

/// Converts text into a fixed-dimension vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Dimensionality of the vectors this provider returns.
    fn dimensions(&self) -> usize;

    fn provider_name(&self) -> &str;
}

/// Produces text for a prompt. Empty output is a valid result.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError>;

    fn model_name(&self) -> &str;
}

/// Per-call generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    pub timeout: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl From<&GenerationConfig> for GenerationOptions {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Execute an async operation with exponential backoff retry on transient errors.
///
/// Retries on `RateLimited` (respects `retry_after_secs`), `Connection` and
/// `Timeout`. Permanent errors (auth, parse, request) return immediately.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, ProviderError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !e.is_transient() || attempt >= config.max_retries {
                    return Err(e);
                }
                let backoff_ms = compute_backoff(config, attempt, &e);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying provider call after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}

/// Compute backoff delay, respecting rate limit retry-after hints.
fn compute_backoff(config: &RetryConfig, attempt: u32, err: &ProviderError) -> u64 {
    let computed = compute_exponential_backoff(config, attempt);
    if let ProviderError::RateLimited { retry_after_secs } = err {
        return (retry_after_secs * 1000).max(computed);
    }
    computed
}

fn compute_exponential_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_backoff_ms as f64) as u64;
    if config.jitter {
        // Up to 25% jitter
        capped + (capped as f64 * 0.25 * jitter_fraction()) as u64
    } else {
        capped
    }
}

/// Cheap jitter source from the clock's sub-second nanos.
fn jitter_fraction() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// Map a transport-level `reqwest` failure into the provider taxonomy.
pub(crate) fn map_transport_error(err: reqwest::Error, timeout: Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else if err.is_connect() {
        ProviderError::Connection {
            message: err.to_string(),
        }
    } else {
        ProviderError::Request {
            message: err.to_string(),
        }
    }
}

/// Map a non-success HTTP status into the provider taxonomy.
pub(crate) fn map_http_error(provider: &str, status: reqwest::StatusCode, body: &str) -> ProviderError {
    match status.as_u16() {
        401 | 403 => ProviderError::Auth {
            provider: provider.to_string(),
        },
        429 => ProviderError::RateLimited {
            retry_after_secs: 30,
        },
        500..=599 => ProviderError::Connection {
            message: format!("HTTP {status} from {provider}: {body}"),
        },
        _ => ProviderError::Request {
            message: format!("HTTP {status} from {provider}: {body}"),
        },
    }
}

/// Build the embedding provider named in config.
pub fn create_embedder(
    config: &EmbeddingConfig,
    retry: &RetryConfig,
) -> Result<Arc<dyn EmbeddingProvider>, ConfigError> {
    match config.provider.as_str() {
        "local" => Ok(Arc::new(LocalEmbedder::new(config.dimensions))),
        "gemini" => {
            let api_key = resolve_api_key(&config.api_key_env)?;
            Ok(Arc::new(GeminiEmbedder::new(config, api_key, retry.clone())?))
        }
        other => Err(ConfigError::Invalid {
            message: format!("unknown embedding provider '{other}'"),
        }),
    }
}

/// Build the generation provider named in config.
pub fn create_generator(
    config: &GenerationConfig,
    retry: &RetryConfig,
) -> Result<Arc<dyn GenerationProvider>, ConfigError> {
    match config.provider.as_str() {
        "none" => Ok(Arc::new(NullGenerator)),
        "gemini" => {
            let api_key = resolve_api_key(&config.api_key_env)?;
            Ok(Arc::new(GeminiGenerator::new(config, api_key, retry.clone())?))
        }
        other => Err(ConfigError::Invalid {
            message: format!("unknown generation provider '{other}'"),
        }),
    }
}
