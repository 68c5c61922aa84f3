//! Evaluation orchestrator.
//!
//! The [`Evaluator`] binds one embedding provider and one generation provider
//! and computes every enabled metric for a sample. Pure metrics are computed
//! inline; provider-backed metrics are bounded by timeouts and degrade to
//! [`MetricValue::Unavailable`] on failure (faithfulness degrades to 0.5
//! instead). A failing sample never aborts a batch.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::LughaConfig;
use crate::error::{MetricError, ProviderError};
use crate::metrics::{self, LatencyReport};
use crate::providers::{EmbeddingProvider, GenerationOptions, GenerationProvider};
use crate::report::EvaluationReport;
use crate::response_parser::ResponseGrammar;
use crate::similarity::cosine_similarity;
use crate::types::{EvaluationSample, MetricKind, MetricValue, Passage, RelevanceJudgment, Timing};

/// Neutral faithfulness score used when the grader reply cannot be used.
pub const FAITHFULNESS_FALLBACK: f64 = 0.5;

/// Runtime settings for an [`Evaluator`].
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorConfig {
    pub language: String,
    pub embed_timeout: Duration,
    pub latency_threshold_secs: f64,
    pub ndcg_k: usize,
    pub metrics: BTreeSet<MetricKind>,
    pub concurrency: usize,
    pub generation: GenerationOptions,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self::from(&LughaConfig::default())
    }
}

impl From<&LughaConfig> for EvaluatorConfig {
    fn from(config: &LughaConfig) -> Self {
        let eval = &config.evaluation;
        Self {
            language: config.language.clone(),
            embed_timeout: eval.embed_timeout(),
            latency_threshold_secs: eval.latency_threshold_secs,
            ndcg_k: eval.ndcg_k,
            metrics: eval.metrics.iter().copied().collect(),
            concurrency: eval.concurrency.max(1),
            generation: GenerationOptions::from(&config.generation),
        }
    }
}

impl EvaluatorConfig {
    pub fn with_metrics(mut self, metrics: impl IntoIterator<Item = MetricKind>) -> Self {
        self.metrics = metrics.into_iter().collect();
        self
    }

    pub fn without_metric(mut self, metric: MetricKind) -> Self {
        self.metrics.remove(&metric);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn is_enabled(&self, metric: MetricKind) -> bool {
        self.metrics.contains(&metric)
    }
}

/// Scores for one sample. A metric missing from `scores` was not applicable
/// (disabled, or the sample lacks the input it needs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleResult {
    pub sample_id: String,
    pub scores: BTreeMap<MetricKind, MetricValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencyReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
    /// Fallbacks and provider failures worth surfacing to a reader.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl SampleResult {
    pub fn new(sample_id: impl Into<String>) -> Self {
        Self {
            sample_id: sample_id.into(),
            scores: BTreeMap::new(),
            latency: None,
            timing: None,
            notes: Vec::new(),
        }
    }

    pub fn score(&self, metric: MetricKind) -> Option<f64> {
        self.scores.get(&metric).and_then(MetricValue::value)
    }
}

type EmbeddingResults<'a> = HashMap<&'a str, Result<Vec<f32>, ProviderError>>;

/// Computes RAG quality metrics against a fixed pair of providers.
pub struct Evaluator {
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    config: EvaluatorConfig,
    faithfulness_grammar: ResponseGrammar,
}

impl Evaluator {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
        config: EvaluatorConfig,
    ) -> Self {
        Self {
            embedder,
            generator,
            config,
            faithfulness_grammar: ResponseGrammar::faithfulness(),
        }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn language(&self) -> &str {
        &self.config.language
    }

    // --- Retrieval ---

    pub fn retrieval_precision(&self, retrieved: &[Passage], judgment: &RelevanceJudgment) -> f64 {
        metrics::precision(retrieved, judgment)
    }

    pub fn retrieval_recall(&self, retrieved: &[Passage], judgment: &RelevanceJudgment) -> f64 {
        metrics::recall(retrieved, judgment)
    }

    pub fn retrieval_f1(&self, retrieved: &[Passage], judgment: &RelevanceJudgment) -> f64 {
        metrics::f1(
            metrics::precision(retrieved, judgment),
            metrics::recall(retrieved, judgment),
        )
    }

    pub fn reciprocal_rank(&self, retrieved: &[Passage], judgment: &RelevanceJudgment) -> f64 {
        metrics::reciprocal_rank(retrieved, judgment)
    }

    /// NDCG at the configured cut-off.
    pub fn ndcg(&self, retrieved: &[Passage], judgment: &RelevanceJudgment) -> Result<f64, MetricError> {
        metrics::ndcg_at_k(
            &metrics::graded_relevance(retrieved, judgment),
            self.config.ndcg_k,
        )
    }

    // --- Generation ---

    pub fn answer_completeness(&self, answer: &str, expected_points: &[String]) -> f64 {
        metrics::answer_completeness(answer, expected_points)
    }

    /// Embed one text, bounded by the configured embedding timeout.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let timeout = self.config.embed_timeout;
        match tokio::time::timeout(timeout, self.embedder.embed(text)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn similarity(&self, left: &str, right: &str) -> MetricValue {
        let (l, r) = futures::join!(self.embed(left), self.embed(right));
        match (l, r) {
            (Ok(l), Ok(r)) => cosine_similarity(&l, &r).into(),
            (Err(e), _) | (_, Err(e)) => MetricValue::unavailable(e.to_string()),
        }
    }

    /// Cosine similarity of the query and answer embeddings.
    pub async fn answer_relevance(&self, query: &str, answer: &str) -> MetricValue {
        self.similarity(query, answer).await
    }

    /// Cosine similarity of the answer and ground-truth embeddings.
    pub async fn answer_correctness(&self, answer: &str, ground_truth: &str) -> MetricValue {
        self.similarity(answer, ground_truth).await
    }

    /// Faithfulness of `answer` to `context`, graded by the generation
    /// provider. Always returns a score in `[0, 1]`.
    pub async fn evaluate_faithfulness(&self, answer: &str, context: &str) -> f64 {
        self.grade_faithfulness(answer, context).await.0
    }

    /// Score plus a note when the fallback was used.
    async fn grade_faithfulness(&self, answer: &str, context: &str) -> (f64, Option<String>) {
        let prompt = faithfulness_prompt(answer, context);
        let options = &self.config.generation;
        let reply = match tokio::time::timeout(
            options.timeout,
            self.generator.generate(&prompt, options),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                timeout_ms: options.timeout.as_millis() as u64,
            }),
        };

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Faithfulness grader failed, using fallback score");
                return (
                    FAITHFULNESS_FALLBACK,
                    Some(format!("faithfulness fell back to {FAITHFULNESS_FALLBACK}: {e}")),
                );
            }
        };

        let parsed = self.faithfulness_grammar.parse(&reply);
        let score = parsed
            .number("SCORE")
            .unwrap_or(FAITHFULNESS_FALLBACK)
            .clamp(0.0, 1.0);
        match parsed.fallback_reason("SCORE") {
            Some(reason) => {
                warn!(reply = reply.as_str(), reason, "Unusable faithfulness reply, using fallback score");
                (
                    score,
                    Some(format!("faithfulness fell back to {score}: {reason}")),
                )
            }
            None => (score, None),
        }
    }

    // --- Context ---

    /// Cosine similarity of the query and context embeddings.
    pub async fn context_relevance(&self, query: &str, context: &str) -> MetricValue {
        self.similarity(query, context).await
    }

    pub fn context_precision(&self, context: &str, answer: &str) -> f64 {
        metrics::context_precision(context, answer)
    }

    // --- Performance ---

    pub fn evaluate_latency(&self, start: f64, end: f64) -> Result<LatencyReport, MetricError> {
        metrics::evaluate_latency(start, end, self.config.latency_threshold_secs)
    }

    pub fn evaluate_throughput(&self, num_queries: usize, total_seconds: f64) -> f64 {
        metrics::throughput(num_queries, total_seconds)
    }

    // --- Orchestration ---

    /// Compute every enabled, applicable metric for one sample.
    ///
    /// Each distinct text is embedded at most once and the vector reused
    /// across metrics. Embeddings and the faithfulness grade run concurrently.
    pub async fn evaluate_sample(&self, sample: &EvaluationSample) -> SampleResult {
        let cfg = &self.config;
        let mut result = SampleResult::new(sample.id.clone());
        result.timing = sample.timing;

        self.score_pure_metrics(sample, &mut result);

        let ground_truth = sample.ground_truth_answer.as_deref();
        let mut texts: BTreeSet<&str> = BTreeSet::new();
        if cfg.is_enabled(MetricKind::AnswerRelevance) {
            texts.insert(&sample.query);
            texts.insert(&sample.generated_answer);
        }
        if cfg.is_enabled(MetricKind::AnswerCorrectness)
            && let Some(truth) = ground_truth
        {
            texts.insert(&sample.generated_answer);
            texts.insert(truth);
        }
        if cfg.is_enabled(MetricKind::ContextRelevance) {
            texts.insert(&sample.query);
            texts.insert(&sample.context_used);
        }

        let embed_all = futures::future::join_all(
            texts
                .iter()
                .map(|text| async move { (*text, self.embed(text).await) }),
        );
        let faithfulness = async {
            if cfg.is_enabled(MetricKind::Faithfulness) {
                Some(
                    self.grade_faithfulness(&sample.generated_answer, &sample.context_used)
                        .await,
                )
            } else {
                None
            }
        };
        let (embedded, faithfulness) = futures::join!(embed_all, faithfulness);
        let vectors: EmbeddingResults<'_> = embedded.into_iter().collect();

        if cfg.is_enabled(MetricKind::AnswerRelevance) {
            result.scores.insert(
                MetricKind::AnswerRelevance,
                similarity_between(&vectors, &sample.query, &sample.generated_answer),
            );
        }
        if cfg.is_enabled(MetricKind::AnswerCorrectness)
            && let Some(truth) = ground_truth
        {
            result.scores.insert(
                MetricKind::AnswerCorrectness,
                similarity_between(&vectors, &sample.generated_answer, truth),
            );
        }
        if cfg.is_enabled(MetricKind::ContextRelevance) {
            result.scores.insert(
                MetricKind::ContextRelevance,
                similarity_between(&vectors, &sample.query, &sample.context_used),
            );
        }
        if let Some((score, note)) = faithfulness {
            result
                .scores
                .insert(MetricKind::Faithfulness, MetricValue::score(score));
            result.notes.extend(note);
        }

        for (metric, value) in &result.scores {
            if let MetricValue::Unavailable { reason } = value {
                warn!(sample = sample.id.as_str(), metric = %metric, reason = reason.as_str(), "Metric unavailable");
            }
        }
        debug!(
            sample = sample.id.as_str(),
            metrics = result.scores.len(),
            embeddings = vectors.len(),
            "Sample evaluated"
        );
        result
    }

    fn score_pure_metrics(&self, sample: &EvaluationSample, result: &mut SampleResult) {
        let cfg = &self.config;
        let retrieved = &sample.retrieved;
        let judgment = &sample.judgment;

        if cfg.is_enabled(MetricKind::Precision) {
            result.scores.insert(
                MetricKind::Precision,
                MetricValue::score(self.retrieval_precision(retrieved, judgment)),
            );
        }
        if cfg.is_enabled(MetricKind::Recall) {
            result.scores.insert(
                MetricKind::Recall,
                MetricValue::score(self.retrieval_recall(retrieved, judgment)),
            );
        }
        if cfg.is_enabled(MetricKind::F1) {
            result.scores.insert(
                MetricKind::F1,
                MetricValue::score(self.retrieval_f1(retrieved, judgment)),
            );
        }
        if cfg.is_enabled(MetricKind::ReciprocalRank) {
            result.scores.insert(
                MetricKind::ReciprocalRank,
                MetricValue::score(self.reciprocal_rank(retrieved, judgment)),
            );
        }
        if cfg.is_enabled(MetricKind::Ndcg) {
            result
                .scores
                .insert(MetricKind::Ndcg, self.ndcg(retrieved, judgment).into());
        }
        if cfg.is_enabled(MetricKind::AnswerCompleteness)
            && let Some(points) = &sample.expected_points
        {
            result.scores.insert(
                MetricKind::AnswerCompleteness,
                MetricValue::score(self.answer_completeness(&sample.generated_answer, points)),
            );
        }
        if cfg.is_enabled(MetricKind::ContextPrecision) {
            result.scores.insert(
                MetricKind::ContextPrecision,
                MetricValue::score(
                    self.context_precision(&sample.context_used, &sample.generated_answer),
                ),
            );
        }
        if cfg.is_enabled(MetricKind::LatencySeconds)
            && let Some(timing) = sample.timing
        {
            match self.evaluate_latency(timing.start, timing.end) {
                Ok(report) => {
                    result.scores.insert(
                        MetricKind::LatencySeconds,
                        MetricValue::score(report.latency_seconds),
                    );
                    result.latency = Some(report);
                }
                Err(e) => {
                    result
                        .scores
                        .insert(MetricKind::LatencySeconds, MetricValue::unavailable(e.to_string()));
                }
            }
        }
    }

    /// Evaluate every sample and aggregate into a report.
    ///
    /// Samples run with at most `concurrency` in flight; results keep input order.
    pub async fn evaluate_batch(&self, samples: &[EvaluationSample]) -> EvaluationReport {
        let results = self.evaluate_samples(samples).await;
        EvaluationReport::from_results(&self.config.language, self.config.latency_threshold_secs, results)
    }

    /// Per-sample results for a batch, in input order.
    pub async fn evaluate_samples(&self, samples: &[EvaluationSample]) -> Vec<SampleResult> {
        let started = Instant::now();
        info!(
            samples = samples.len(),
            concurrency = self.config.concurrency,
            embedder = self.embedder.provider_name(),
            generator = self.generator.model_name(),
            "Starting evaluation batch"
        );

        let results: Vec<SampleResult> = futures::stream::iter(samples)
            .map(|sample| self.evaluate_sample(sample))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        info!(
            samples = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Evaluation batch complete"
        );
        results
    }
}

fn similarity_between(vectors: &EmbeddingResults<'_>, left: &str, right: &str) -> MetricValue {
    match (vectors.get(left), vectors.get(right)) {
        (Some(Ok(l)), Some(Ok(r))) => cosine_similarity(l, r).into(),
        (Some(Err(e)), _) | (_, Some(Err(e))) => MetricValue::unavailable(e.to_string()),
        _ => MetricValue::unavailable("embedding was not computed"),
    }
}

fn faithfulness_prompt(answer: &str, context: &str) -> String {
    format!(
        "Rate how faithful this answer is to the context (0-1 scale).\n\n\
         Context: {context}\n\
         Answer: {answer}\n\n\
         Return only a number between 0 and 1, where:\n\
         - 1.0 = Answer is completely grounded in context\n\
         - 0.5 = Answer is partially grounded\n\
         - 0.0 = Answer contradicts or ignores context\n\n\
         Score:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::{MockEmbedder, MockGenerator};
    use crate::types::MatchCriterion;

    fn evaluator(embedder: MockEmbedder, generator: MockGenerator) -> Evaluator {
        Evaluator::new(
            Arc::new(embedder),
            Arc::new(generator),
            EvaluatorConfig::default(),
        )
    }

    fn passages() -> Vec<Passage> {
        vec![
            Passage::new("A", "Jambo ni salamu."),
            Passage::new("B", "Habari yako ni swali la kawaida."),
            Passage::new("C", "Asante means thank you."),
        ]
    }

    #[test]
    fn test_config_from_lugha_config() {
        let config = EvaluatorConfig::default();
        assert_eq!(config.language, "Kiswahili");
        assert_eq!(config.ndcg_k, 5);
        assert_eq!(config.metrics.len(), MetricKind::ALL.len());
        assert_eq!(config.concurrency, 1);
        assert!(!config.without_metric(MetricKind::Faithfulness).is_enabled(MetricKind::Faithfulness));
    }

    #[test]
    fn test_pure_retrieval_scenario() {
        let e = evaluator(MockEmbedder::new(8), MockGenerator::new());
        let judgment = RelevanceJudgment::binary(["B"]).with_criterion(MatchCriterion::ExactId);
        let retrieved = passages();
        assert!((e.retrieval_precision(&retrieved, &judgment) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(e.retrieval_recall(&retrieved, &judgment), 1.0);
        assert_eq!(e.reciprocal_rank(&retrieved, &judgment), 0.5);
        assert!((e.retrieval_f1(&retrieved, &judgment) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_faithfulness_prompt_carries_inputs() {
        let prompt = faithfulness_prompt("the answer", "the context");
        assert!(prompt.contains("Context: the context"));
        assert!(prompt.contains("Answer: the answer"));
        assert!(prompt.trim_end().ends_with("Score:"));
    }

    #[tokio::test]
    async fn test_faithfulness_numeric_reply() {
        let e = evaluator(MockEmbedder::new(8), MockGenerator::with_response("0.8"));
        assert_eq!(e.evaluate_faithfulness("a", "c").await, 0.8);
    }

    #[tokio::test]
    async fn test_faithfulness_non_numeric_reply_falls_back() {
        let e = evaluator(
            MockEmbedder::new(8),
            MockGenerator::with_response("The answer is mostly grounded."),
        );
        assert_eq!(e.evaluate_faithfulness("a", "c").await, FAITHFULNESS_FALLBACK);
    }

    #[tokio::test]
    async fn test_faithfulness_provider_error_falls_back() {
        let e = evaluator(
            MockEmbedder::new(8),
            MockGenerator::failing(ProviderError::Auth {
                provider: "mock".into(),
            }),
        );
        assert_eq!(e.evaluate_faithfulness("a", "c").await, FAITHFULNESS_FALLBACK);
    }

    #[tokio::test]
    async fn test_embed_timeout() {
        let config = EvaluatorConfig {
            embed_timeout: Duration::from_millis(10),
            ..Default::default()
        };
        let e = Evaluator::new(
            Arc::new(MockEmbedder::new(8).with_delay(Duration::from_millis(200))),
            Arc::new(MockGenerator::new()),
            config,
        );
        assert_eq!(
            e.embed("slow").await,
            Err(ProviderError::Timeout { timeout_ms: 10 })
        );
    }

    #[tokio::test]
    async fn test_answer_relevance_identical_vectors() {
        let e = evaluator(
            MockEmbedder::new(3)
                .with_vector("q", vec![1.0, 2.0, 3.0])
                .with_vector("a", vec![2.0, 4.0, 6.0]),
            MockGenerator::new(),
        );
        let value = e.answer_relevance("q", "a").await.value().unwrap();
        assert!((value - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_zero_vector_is_unavailable() {
        let e = evaluator(
            MockEmbedder::new(2)
                .with_vector("q", vec![1.0, 0.0])
                .with_vector("", vec![0.0, 0.0]),
            MockGenerator::new(),
        );
        assert!(!e.context_relevance("q", "").await.is_available());
    }

    #[tokio::test]
    async fn test_sample_skips_inapplicable_metrics() {
        let e = evaluator(MockEmbedder::new(16), MockGenerator::with_response("1.0"));
        let sample = EvaluationSample::new(
            "s1",
            "Jambo means?",
            passages(),
            RelevanceJudgment::binary(["salamu"]),
            "Jambo ni salamu.",
        );
        let result = e.evaluate_sample(&sample).await;
        assert!(!result.scores.contains_key(&MetricKind::AnswerCorrectness));
        assert!(!result.scores.contains_key(&MetricKind::AnswerCompleteness));
        assert!(!result.scores.contains_key(&MetricKind::LatencySeconds));
        assert_eq!(result.score(MetricKind::Faithfulness), Some(1.0));
        assert_eq!(result.score(MetricKind::Precision), Some(1.0 / 3.0));
        assert!(result.notes.is_empty());
    }

    #[tokio::test]
    async fn test_sample_latency_gate() {
        let e = evaluator(MockEmbedder::new(8), MockGenerator::with_response("1"));
        let sample = EvaluationSample::new("s", "q", vec![], RelevanceJudgment::default(), "a")
            .with_timing(10.0, 15.1);
        let result = e.evaluate_sample(&sample).await;
        let latency = result.latency.unwrap();
        assert!(!latency.is_acceptable);
        assert!((result.score(MetricKind::LatencySeconds).unwrap() - 5.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_sample_invalid_timing_is_unavailable() {
        let e = evaluator(MockEmbedder::new(8), MockGenerator::with_response("1"));
        let sample = EvaluationSample::new("s", "q", vec![], RelevanceJudgment::default(), "a")
            .with_timing(10.0, 9.0);
        let result = e.evaluate_sample(&sample).await;
        assert!(result.latency.is_none());
        assert!(!result.scores[&MetricKind::LatencySeconds].is_available());
    }
}
