//! Configuration system for Lugha.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment -> explicit overrides. Configuration is
//! loaded from `~/.config/lugha/config.toml` and/or `.lugha/config.toml` in the
//! workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::metrics::performance::DEFAULT_LATENCY_THRESHOLD_SECS;
use crate::types::MetricKind;
use crate::validation::TermCorrections;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LughaConfig {
    /// Target language the evaluator and providers are bound to.
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
}

impl Default for LughaConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            evaluation: EvaluationConfig::default(),
            retry: RetryConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

fn default_language() -> String {
    "Kiswahili".into()
}

fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".into()
}

fn default_true() -> bool {
    true
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name: "gemini" (default) or "local".
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Provider-specific model name.
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Dimensions for the local embedder (remote providers report their own).
    #[serde(default = "default_local_dimensions")]
    pub dimensions: usize,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Override for the provider base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Timeout for a single HTTP attempt, in seconds. The evaluator's
    /// `embed_timeout_ms` bounds the whole call, retries included.
    #[serde(default = "default_embedding_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_embedding_provider() -> String {
    "gemini".into()
}

fn default_embedding_model() -> String {
    "text-embedding-004".into()
}

fn default_local_dimensions() -> usize {
    256
}

fn default_embedding_request_timeout() -> u64 {
    30
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimensions: default_local_dimensions(),
            api_key_env: default_api_key_env(),
            base_url: None,
            request_timeout_secs: default_embedding_request_timeout(),
        }
    }
}

/// Generation provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Provider name. Only "gemini" ships with the core.
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Sampling temperature for grading prompts.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Output token cap for grading prompts. Unset by default: on thinking
    /// models the cap also counts reasoning tokens and can leave no text.
    #[serde(default)]
    pub max_tokens: Option<usize>,
    /// Per-call timeout in seconds.
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

fn default_generation_provider() -> String {
    "gemini".into()
}

fn default_generation_model() -> String {
    "gemini-2.5-flash".into()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_generation_timeout() -> u64 {
    60
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            api_key_env: default_api_key_env(),
            base_url: None,
            temperature: default_temperature(),
            max_tokens: None,
            timeout_secs: default_generation_timeout(),
        }
    }
}

/// Evaluator behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Latency SLA gate in seconds.
    #[serde(default = "default_latency_threshold")]
    pub latency_threshold_secs: f64,
    /// Cut-off for NDCG@k.
    #[serde(default = "default_ndcg_k")]
    pub ndcg_k: usize,
    /// Upper bound on every embedding call, in milliseconds.
    #[serde(default = "default_embed_timeout_ms")]
    pub embed_timeout_ms: u64,
    /// Samples evaluated concurrently within a batch (1 = sequential).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Metrics to compute per sample.
    #[serde(default = "default_metrics")]
    pub metrics: Vec<MetricKind>,
}

fn default_latency_threshold() -> f64 {
    DEFAULT_LATENCY_THRESHOLD_SECS
}

fn default_ndcg_k() -> usize {
    5
}

fn default_embed_timeout_ms() -> u64 {
    30_000
}

fn default_concurrency() -> usize {
    1
}

fn default_metrics() -> Vec<MetricKind> {
    MetricKind::ALL.to_vec()
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            latency_threshold_secs: default_latency_threshold(),
            ndcg_k: default_ndcg_k(),
            embed_timeout_ms: default_embed_timeout_ms(),
            concurrency: default_concurrency(),
            metrics: default_metrics(),
        }
    }
}

impl EvaluationConfig {
    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }
}

/// Retry policy applied inside the HTTP provider clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_true")]
    pub jitter: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Output validation: the injected term-correction table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub corrections: TermCorrections,
}

impl LughaConfig {
    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
    }

    /// Check values that deserialize fine but make no sense at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let eval = &self.evaluation;
        if !eval.latency_threshold_secs.is_finite() || eval.latency_threshold_secs <= 0.0 {
            return Err(ConfigError::Invalid {
                message: format!(
                    "evaluation.latency_threshold_secs must be positive, got {}",
                    eval.latency_threshold_secs
                ),
            });
        }
        if eval.concurrency == 0 {
            return Err(ConfigError::Invalid {
                message: "evaluation.concurrency must be at least 1".into(),
            });
        }
        if eval.embed_timeout_ms == 0
            || self.generation.timeout_secs == 0
            || self.embedding.request_timeout_secs == 0
        {
            return Err(ConfigError::Invalid {
                message: "provider timeouts must be non-zero".into(),
            });
        }
        if self.embedding.provider == "local" && self.embedding.dimensions == 0 {
            return Err(ConfigError::Invalid {
                message: "embedding.dimensions must be non-zero for the local embedder".into(),
            });
        }
        Ok(())
    }
}

/// Path of the user-level config file, if a home directory can be resolved.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "lugha", "lugha")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration by merging defaults, config files, environment and overrides.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&LughaConfig>,
) -> Result<LughaConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(LughaConfig::default()));

    // User-level config
    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".lugha").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (LUGHA_LANGUAGE, LUGHA_EVALUATION__NDCG_K, etc.)
    figment = figment.merge(Env::prefixed("LUGHA_").split("__"));

    // Explicit overrides
    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: LughaConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a single TOML file on top of the defaults.
pub fn load_config_file(path: &Path) -> Result<LughaConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let config: LughaConfig = Figment::from(Serialized::defaults(LughaConfig::default()))
        .merge(Toml::file(path))
        .extract()?;
    config.validate()?;
    Ok(config)
}

/// Read an API key from the environment variable named in config.
pub fn resolve_api_key(var: &str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(ConfigError::EnvVarMissing { var: var.into() }),
    }
}
