//! # Lugha Core
//!
//! RAG evaluation core for the Lugha language tutor.
//! Provides retrieval, generation, context and performance metrics, the
//! evaluator that orchestrates them over embedding and generation providers,
//! report aggregation, batch loading, configuration, and output validation.

pub mod cache;
pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluator;
pub mod metrics;
pub mod providers;
pub mod report;
pub mod response_parser;
pub mod similarity;
pub mod types;
pub mod validation;

// Re-export commonly used types at the crate root.
pub use cache::{CacheKey, CacheMetrics, ProviderCache, ProviderRegistry};
pub use config::{LughaConfig, load_config};
pub use dataset::{SampleRecord, load_samples};
pub use error::{ConfigError, EvalError, MetricError, ProviderError, Result, SimilarityError};
pub use evaluator::{Evaluator, EvaluatorConfig, FAITHFULNESS_FALLBACK, SampleResult};
pub use providers::{EmbeddingProvider, GenerationOptions, GenerationProvider};
pub use report::{EvaluationReport, LatencySummary, MetricAggregate};
pub use response_parser::{ParsedResponse, ResponseGrammar};
pub use similarity::cosine_similarity;
pub use types::{
    EvaluationSample, MatchCriterion, MetricKind, MetricValue, Passage, RelevanceJudgment, Timing,
};
pub use validation::{TermCorrections, Validator};
