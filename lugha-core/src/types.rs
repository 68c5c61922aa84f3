//! Core data model: passages, relevance judgments, evaluation samples and
//! per-metric values.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// A unit of retrievable text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    #[serde(default)]
    pub text: String,
    /// Language tag of the knowledge base the passage came from.
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Passage {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            language: String::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// How a retrieved passage is matched against the relevant set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchCriterion {
    /// The passage id equals a relevant item.
    ExactId,
    /// The passage text contains a relevant item.
    #[default]
    Substring,
}

impl MatchCriterion {
    pub fn matches(&self, passage: &Passage, item: &str) -> bool {
        match self {
            MatchCriterion::ExactId => passage.id == item,
            MatchCriterion::Substring => !item.is_empty() && passage.text.contains(item),
        }
    }
}

/// Ground truth for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelevanceJudgment {
    /// Ids or substrings considered relevant.
    #[serde(default)]
    pub relevant: Vec<String>,
    /// Graded relevance per passage id, used for NDCG.
    #[serde(default)]
    pub grades: BTreeMap<String, f64>,
    #[serde(default)]
    pub criterion: MatchCriterion,
}

impl RelevanceJudgment {
    pub fn binary(relevant: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            relevant: relevant.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_criterion(mut self, criterion: MatchCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_grades(mut self, grades: BTreeMap<String, f64>) -> Self {
        self.grades = grades;
        self
    }

    /// Whether a passage is relevant under this judgment.
    pub fn is_relevant(&self, passage: &Passage) -> bool {
        self.relevant
            .iter()
            .any(|item| self.criterion.matches(passage, item))
    }
}

/// Wall-clock timing of one query, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    pub start: f64,
    pub end: f64,
}

/// One evaluation unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSample {
    pub id: String,
    pub query: String,
    pub retrieved: Vec<Passage>,
    pub judgment: RelevanceJudgment,
    pub generated_answer: String,
    #[serde(default)]
    pub ground_truth_answer: Option<String>,
    #[serde(default)]
    pub expected_points: Option<Vec<String>>,
    pub context_used: String,
    #[serde(default)]
    pub timing: Option<Timing>,
}

impl EvaluationSample {
    /// Build a sample whose context is the concatenated retrieved passages.
    pub fn new(
        id: impl Into<String>,
        query: impl Into<String>,
        retrieved: Vec<Passage>,
        judgment: RelevanceJudgment,
        generated_answer: impl Into<String>,
    ) -> Self {
        let context_used = join_context(&retrieved);
        Self {
            id: id.into(),
            query: query.into(),
            retrieved,
            judgment,
            generated_answer: generated_answer.into(),
            ground_truth_answer: None,
            expected_points: None,
            context_used,
            timing: None,
        }
    }

    pub fn with_ground_truth(mut self, ground_truth: impl Into<String>) -> Self {
        self.ground_truth_answer = Some(ground_truth.into());
        self
    }

    pub fn with_expected_points(
        mut self,
        points: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.expected_points = Some(points.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_used = context.into();
        self
    }

    pub fn with_timing(mut self, start: f64, end: f64) -> Self {
        self.timing = Some(Timing { start, end });
        self
    }
}

/// Concatenate passage texts the way the retriever hands them to the generator.
pub fn join_context(passages: &[Passage]) -> String {
    passages
        .iter()
        .map(|p| p.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Every metric the evaluator knows how to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Precision,
    Recall,
    F1,
    ReciprocalRank,
    Ndcg,
    AnswerRelevance,
    Faithfulness,
    AnswerCorrectness,
    AnswerCompleteness,
    ContextRelevance,
    ContextPrecision,
    LatencySeconds,
}

impl MetricKind {
    pub const ALL: [MetricKind; 12] = [
        MetricKind::Precision,
        MetricKind::Recall,
        MetricKind::F1,
        MetricKind::ReciprocalRank,
        MetricKind::Ndcg,
        MetricKind::AnswerRelevance,
        MetricKind::Faithfulness,
        MetricKind::AnswerCorrectness,
        MetricKind::AnswerCompleteness,
        MetricKind::ContextRelevance,
        MetricKind::ContextPrecision,
        MetricKind::LatencySeconds,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Precision => "precision",
            MetricKind::Recall => "recall",
            MetricKind::F1 => "f1",
            MetricKind::ReciprocalRank => "reciprocal_rank",
            MetricKind::Ndcg => "ndcg",
            MetricKind::AnswerRelevance => "answer_relevance",
            MetricKind::Faithfulness => "faithfulness",
            MetricKind::AnswerCorrectness => "answer_correctness",
            MetricKind::AnswerCompleteness => "answer_completeness",
            MetricKind::ContextRelevance => "context_relevance",
            MetricKind::ContextPrecision => "context_precision",
            MetricKind::LatencySeconds => "latency_seconds",
        }
    }

    /// Whether computing this metric requires a provider round-trip.
    pub fn needs_provider(&self) -> bool {
        matches!(
            self,
            MetricKind::AnswerRelevance
                | MetricKind::Faithfulness
                | MetricKind::AnswerCorrectness
                | MetricKind::ContextRelevance
        )
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one metric on one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetricValue {
    Score { value: f64 },
    Unavailable { reason: String },
}

impl MetricValue {
    pub fn score(value: f64) -> Self {
        MetricValue::Score { value }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        MetricValue::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            MetricValue::Score { value } => Some(*value),
            MetricValue::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, MetricValue::Score { .. })
    }
}

impl<E: fmt::Display> From<Result<f64, E>> for MetricValue {
    fn from(result: Result<f64, E>) -> Self {
        match result {
            Ok(value) if value.is_finite() => MetricValue::score(value),
            Ok(value) => MetricValue::unavailable(format!("non-finite score {value}")),
            Err(e) => MetricValue::unavailable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_criterion_exact_id() {
        let p = Passage::new("doc-1", "Habari ni salamu");
        assert!(MatchCriterion::ExactId.matches(&p, "doc-1"));
        assert!(!MatchCriterion::ExactId.matches(&p, "Habari"));
    }

    #[test]
    fn test_match_criterion_substring() {
        let p = Passage::new("doc-1", "Habari ni salamu");
        assert!(MatchCriterion::Substring.matches(&p, "salamu"));
        assert!(!MatchCriterion::Substring.matches(&p, "doc-1"));
        assert!(!MatchCriterion::Substring.matches(&p, ""));
    }

    #[test]
    fn test_judgment_default_criterion_is_substring() {
        let j: RelevanceJudgment = serde_json::from_str(r#"{"relevant": ["x"]}"#).unwrap();
        assert_eq!(j.criterion, MatchCriterion::Substring);
        assert!(j.grades.is_empty());
    }

    #[test]
    fn test_join_context_skips_blank_passages() {
        let passages = vec![
            Passage::new("a", " first "),
            Passage::new("b", "  "),
            Passage::new("c", "second"),
        ];
        assert_eq!(join_context(&passages), "first\n\nsecond");
    }

    #[test]
    fn test_metric_kind_serde_names_match_as_str() {
        for kind in MetricKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_metric_value_from_result() {
        let ok: MetricValue = Ok::<f64, String>(0.25).into();
        assert_eq!(ok.value(), Some(0.25));

        let nan: MetricValue = Ok::<f64, String>(f64::NAN).into();
        assert!(!nan.is_available());

        let err: MetricValue = Err::<f64, _>("provider down").into();
        assert_eq!(err, MetricValue::unavailable("provider down"));
    }

    #[test]
    fn test_metric_value_serde_tagged() {
        let json = serde_json::to_value(MetricValue::score(0.5)).unwrap();
        assert_eq!(json["status"], "score");
        assert_eq!(json["value"], 0.5);
    }
}
