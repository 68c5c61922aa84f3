//! Text-only generation metrics.
//!
//! Embedding-based generation metrics (answer relevance, answer correctness)
//! and the LLM-graded faithfulness check live on the `Evaluator`, since they
//! need provider calls.

/// Fraction of expected points that appear (case-insensitively) in the answer.
///
/// Returns 0 for an empty list of points.
pub fn answer_completeness(answer: &str, expected_points: &[String]) -> f64 {
    if expected_points.is_empty() {
        return 0.0;
    }
    let answer = answer.to_lowercase();
    let covered = expected_points
        .iter()
        .filter(|point| answer.contains(&point.to_lowercase()))
        .count();
    covered as f64 / expected_points.len() as f64
}
