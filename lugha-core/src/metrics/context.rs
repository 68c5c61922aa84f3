//! Context utilization metrics.

/// Split context into sentences on `.`, `!` and `?`, dropping blank fragments.
pub fn split_sentences(context: &str) -> Vec<&str> {
    context
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Fraction of context sentences that appear verbatim in the answer.
///
/// Literal substring overlap only: a paraphrased sentence earns no credit, so
/// treat the score as a lower bound on how much context the answer used.
/// Empty context scores 0.
pub fn context_precision(context: &str, answer: &str) -> f64 {
    let sentences = split_sentences(context);
    if sentences.is_empty() {
        return 0.0;
    }
    let used = sentences.iter().filter(|s| answer.contains(**s)).count();
    used as f64 / sentences.len() as f64
}
