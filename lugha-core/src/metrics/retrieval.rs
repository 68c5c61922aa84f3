//! Ranking metrics over a retrieved passage list and its relevance judgment.

use crate::error::MetricError;
use crate::types::{Passage, RelevanceJudgment};
use std::collections::BTreeSet;

/// Precision = relevant retrieved / total retrieved.
///
/// Empty retrieval is a scoreable outcome and yields 0.
pub fn precision(retrieved: &[Passage], judgment: &RelevanceJudgment) -> f64 {
    if retrieved.is_empty() {
        return 0.0;
    }
    let hits = retrieved
        .iter()
        .filter(|p| judgment.is_relevant(p))
        .count();
    hits as f64 / retrieved.len() as f64
}

/// Recall = relevant items found in the retrieval / total relevant items.
///
/// Duplicate relevant items count once. Returns 0 when nothing is relevant.
pub fn recall(retrieved: &[Passage], judgment: &RelevanceJudgment) -> f64 {
    let relevant: BTreeSet<&str> = judgment.relevant.iter().map(String::as_str).collect();
    if relevant.is_empty() {
        return 0.0;
    }
    let found = relevant
        .iter()
        .filter(|item| retrieved.iter().any(|p| judgment.criterion.matches(p, item)))
        .count();
    found as f64 / relevant.len() as f64
}

/// Harmonic mean of precision and recall; 0 when both are 0.
pub fn f1(precision: f64, recall: f64) -> f64 {
    let sum = precision + recall;
    if sum <= 0.0 {
        return 0.0;
    }
    2.0 * precision * recall / sum
}

/// Reciprocal of the 1-indexed rank of the first relevant passage.
///
/// The retriever's order is authoritative; the scan stops at the first match.
pub fn reciprocal_rank(retrieved: &[Passage], judgment: &RelevanceJudgment) -> f64 {
    retrieved
        .iter()
        .position(|p| judgment.is_relevant(p))
        .map(|idx| 1.0 / (idx + 1) as f64)
        .unwrap_or(0.0)
}

/// Mean of per-query reciprocal ranks.
pub fn mean_reciprocal_rank(reciprocal_ranks: &[f64]) -> f64 {
    if reciprocal_ranks.is_empty() {
        return 0.0;
    }
    reciprocal_ranks.iter().sum::<f64>() / reciprocal_ranks.len() as f64
}

/// Graded relevance of each retrieved passage, in retrieved order.
///
/// An explicit grade for the passage id wins; otherwise a relevant match
/// counts as 1 and anything else as 0.
pub fn graded_relevance(retrieved: &[Passage], judgment: &RelevanceJudgment) -> Vec<f64> {
    retrieved
        .iter()
        .map(|p| match judgment.grades.get(&p.id) {
            Some(grade) => *grade,
            None if judgment.is_relevant(p) => 1.0,
            None => 0.0,
        })
        .collect()
}

/// Largest accepted relevance grade. Gains are `2^g - 1`, so much larger
/// grades overflow to infinity.
pub const MAX_RELEVANCE_GRADE: f64 = 1000.0;

fn dcg(grades: &[f64], k: usize) -> f64 {
    grades
        .iter()
        .take(k)
        .enumerate()
        .map(|(i, g)| (2f64.powf(*g) - 1.0) / ((i + 2) as f64).log2())
        .sum()
}

/// Normalized discounted cumulative gain over the top `k` grades.
///
/// `grades` are in retrieved order; the ideal ordering is the same grades
/// sorted descending. Items past `k` are ignored. An all-zero grade list (or
/// `k == 0`) scores 0. Negative, non-finite, or grades above
/// [`MAX_RELEVANCE_GRADE`] are rejected.
pub fn ndcg_at_k(grades: &[f64], k: usize) -> Result<f64, MetricError> {
    if let Some((position, grade)) = grades
        .iter()
        .enumerate()
        .find(|(_, g)| !(0.0..=MAX_RELEVANCE_GRADE).contains(*g))
    {
        return Err(MetricError::InvalidGrade {
            position,
            grade: *grade,
        });
    }

    let mut ideal = grades.to_vec();
    ideal.sort_by(|a, b| b.total_cmp(a));
    let ideal_dcg = dcg(&ideal, k);
    if ideal_dcg <= 0.0 {
        return Ok(0.0);
    }
    Ok((dcg(grades, k) / ideal_dcg).clamp(0.0, 1.0))
}
