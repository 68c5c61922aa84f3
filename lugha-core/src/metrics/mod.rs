//! Pure metric functions. None of these touch a provider or suspend.

pub mod context;
pub mod generation;
pub mod performance;
pub mod retrieval;

pub use context::context_precision;
pub use generation::answer_completeness;
pub use performance::{LatencyReport, batch_throughput, evaluate_latency, throughput};
pub use retrieval::{
    MAX_RELEVANCE_GRADE, f1, graded_relevance, mean_reciprocal_rank, ndcg_at_k, precision, recall,
    reciprocal_rank,
};
