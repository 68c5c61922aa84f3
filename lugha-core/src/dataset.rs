//! Batch input loading.
//!
//! A batch is either JSON Lines (one record per line) or a JSON array of the
//! same records. Each record is validated when converted into an
//! [`EvaluationSample`]; errors name the offending line or record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::EvalError;
use crate::metrics::MAX_RELEVANCE_GRADE;
use crate::types::{EvaluationSample, MatchCriterion, Passage, RelevanceJudgment, Timing, join_context};

/// Relevant items, either a plain list or graded per id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelevantItems {
    Ids(Vec<String>),
    Scores(BTreeMap<String, f64>),
}

impl Default for RelevantItems {
    fn default() -> Self {
        RelevantItems::Ids(Vec::new())
    }
}

/// One batch record as it appears on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub query: String,
    #[serde(default)]
    pub retrieved_ids: Vec<String>,
    #[serde(default)]
    pub retrieved: Vec<Passage>,
    #[serde(default)]
    pub relevant_ids_or_scores: RelevantItems,
    #[serde(default)]
    pub match_mode: Option<MatchCriterion>,
    pub answer: String,
    #[serde(default)]
    pub ground_truth: Option<String>,
    #[serde(default)]
    pub expected_points: Option<Vec<String>>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub start_ts: Option<f64>,
    #[serde(default)]
    pub end_ts: Option<f64>,
}

impl SampleRecord {
    /// Validate and convert. `position` is 1-based and used for the default id.
    ///
    /// Records that list only `retrieved_ids` carry no passage text, and grade
    /// maps are keyed by passage id, so both default to exact-id matching.
    /// Everything else defaults to substring matching.
    pub fn into_sample(self, position: usize) -> Result<EvaluationSample, String> {
        if self.query.trim().is_empty() {
            return Err("query is empty".into());
        }
        if !self.retrieved.is_empty() && !self.retrieved_ids.is_empty() {
            return Err("give either 'retrieved' or 'retrieved_ids', not both".into());
        }

        let ids_only = self.retrieved.is_empty() && !self.retrieved_ids.is_empty();
        let graded = matches!(self.relevant_ids_or_scores, RelevantItems::Scores(_));
        let retrieved = if ids_only {
            self.retrieved_ids
                .into_iter()
                .map(|id| Passage::new(id, ""))
                .collect()
        } else {
            self.retrieved
        };
        let criterion = self.match_mode.unwrap_or(if ids_only || graded {
            MatchCriterion::ExactId
        } else {
            MatchCriterion::Substring
        });

        let judgment = match self.relevant_ids_or_scores {
            RelevantItems::Ids(ids) => RelevanceJudgment::binary(ids),
            RelevantItems::Scores(grades) => {
                if let Some((id, grade)) = grades
                    .iter()
                    .find(|(_, g)| !(0.0..=MAX_RELEVANCE_GRADE).contains(*g))
                {
                    return Err(format!(
                        "relevance grade for '{id}' must be between 0 and {MAX_RELEVANCE_GRADE}, got {grade}"
                    ));
                }
                let relevant: Vec<String> = grades
                    .iter()
                    .filter(|(_, g)| **g > 0.0)
                    .map(|(id, _)| id.clone())
                    .collect();
                RelevanceJudgment::binary(relevant).with_grades(grades)
            }
        }
        .with_criterion(criterion);

        let timing = match (self.start_ts, self.end_ts) {
            (None, None) => None,
            (Some(start), Some(end)) => {
                if !start.is_finite() || !end.is_finite() {
                    return Err("timestamps must be finite".into());
                }
                if end < start {
                    return Err(format!("end_ts ({end}) is before start_ts ({start})"));
                }
                Some(Timing { start, end })
            }
            _ => return Err("start_ts and end_ts must be given together".into()),
        };

        let context_used = self.context.unwrap_or_else(|| join_context(&retrieved));
        Ok(EvaluationSample {
            id: self.id.unwrap_or_else(|| format!("sample-{position}")),
            query: self.query,
            retrieved,
            judgment,
            generated_answer: self.answer,
            ground_truth_answer: self.ground_truth,
            expected_points: self.expected_points,
            context_used,
            timing,
        })
    }
}

/// Parse JSON Lines. Blank lines are skipped; line numbers are 1-based.
pub fn parse_jsonl(content: &str) -> Result<Vec<EvaluationSample>, EvalError> {
    let mut samples = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let record: SampleRecord = serde_json::from_str(line)
            .map_err(|e| EvalError::invalid_input(format!("line {line_no}: {e}")))?;
        let sample = record
            .into_sample(samples.len() + 1)
            .map_err(|e| EvalError::invalid_input(format!("line {line_no}: {e}")))?;
        samples.push(sample);
    }
    Ok(samples)
}

/// Parse a JSON array of records.
pub fn parse_json_array(content: &str) -> Result<Vec<EvaluationSample>, EvalError> {
    let records: Vec<SampleRecord> = serde_json::from_str(content).map_err(|e| {
        EvalError::invalid_input(format!("line {}: {e}", e.line()))
    })?;
    records
        .into_iter()
        .enumerate()
        .map(|(idx, record)| {
            record
                .into_sample(idx + 1)
                .map_err(|e| EvalError::invalid_input(format!("record {}: {e}", idx + 1)))
        })
        .collect()
}

/// Load a batch file. `.jsonl` is JSON Lines, `.json` a JSON array; any other
/// extension is sniffed from the first non-blank character.
pub fn load_samples(path: &Path) -> Result<Vec<EvaluationSample>, EvalError> {
    let content = std::fs::read_to_string(path)?;
    let is_array = match path.extension().and_then(|e| e.to_str()) {
        Some("jsonl") | Some("ndjson") => false,
        Some("json") => true,
        _ => content.trim_start().starts_with('['),
    };
    let samples = if is_array {
        parse_json_array(&content)
    } else {
        parse_jsonl(&content)
    }
    .map_err(|e| match e {
        EvalError::InvalidInput { message } => {
            EvalError::invalid_input(format!("{}: {message}", path.display()))
        }
        other => other,
    })?;
    tracing::debug!(path = %path.display(), samples = samples.len(), "Loaded evaluation batch");
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const LINE: &str = r#"{"query": "What is jambo?", "retrieved_ids": ["A", "B", "C"], "relevant_ids_or_scores": ["B"], "answer": "A greeting"}"#;

    #[test]
    fn test_ids_only_defaults_to_exact_id() {
        let samples = parse_jsonl(LINE).unwrap();
        assert_eq!(samples.len(), 1);
        let s = &samples[0];
        assert_eq!(s.id, "sample-1");
        assert_eq!(s.judgment.criterion, MatchCriterion::ExactId);
        assert_eq!(s.retrieved.len(), 3);
        assert!(s.timing.is_none());
        assert!(s.expected_points.is_none());
    }

    #[test]
    fn test_graded_relevance_record() {
        let line = r#"{"id": "q7", "query": "q", "retrieved": [{"id": "p1", "text": "Jambo"}], "relevant_ids_or_scores": {"p1": 3, "p2": 0}, "answer": "a", "start_ts": 1.0, "end_ts": 2.5}"#;
        let s = parse_jsonl(line).unwrap().remove(0);
        assert_eq!(s.id, "q7");
        assert_eq!(s.judgment.relevant, vec!["p1".to_string()]);
        assert_eq!(s.judgment.grades.get("p1"), Some(&3.0));
        assert_eq!(s.judgment.criterion, MatchCriterion::ExactId);
        assert_eq!(s.context_used, "Jambo");
        assert_eq!(s.timing, Some(Timing { start: 1.0, end: 2.5 }));
    }

    #[test]
    fn test_passages_with_id_list_default_to_substring() {
        let line = r#"{"query": "q", "retrieved": [{"id": "p1", "text": "Jambo ni salamu"}], "relevant_ids_or_scores": ["salamu"], "answer": "a"}"#;
        let s = parse_jsonl(line).unwrap().remove(0);
        assert_eq!(s.judgment.criterion, MatchCriterion::Substring);
        assert!(s.judgment.is_relevant(&s.retrieved[0]));
    }

    #[test]
    fn test_explicit_context_wins() {
        let line = r#"{"query": "q", "retrieved": [{"id": "p1", "text": "x"}], "answer": "a", "context": "given"}"#;
        assert_eq!(parse_jsonl(line).unwrap()[0].context_used, "given");
    }

    #[test]
    fn test_errors_name_the_line() {
        let content = format!("{LINE}\n\n{{\"query\": \"  \", \"answer\": \"a\"}}\n");
        let err = parse_jsonl(&content).unwrap_err().to_string();
        assert!(err.contains("line 3"), "{err}");
        assert!(err.contains("query is empty"), "{err}");
    }

    #[test]
    fn test_rejects_bad_timing_and_grades() {
        let backwards = r#"{"query": "q", "answer": "a", "start_ts": 5.0, "end_ts": 4.0}"#;
        assert!(parse_jsonl(backwards).is_err());
        let half = r#"{"query": "q", "answer": "a", "start_ts": 5.0}"#;
        assert!(parse_jsonl(half).is_err());
        let negative = r#"{"query": "q", "answer": "a", "relevant_ids_or_scores": {"x": -1}}"#;
        assert!(parse_jsonl(negative).is_err());
        let huge = r#"{"query": "q", "answer": "a", "relevant_ids_or_scores": {"x": 1100}}"#;
        let err = parse_jsonl(huge).unwrap_err().to_string();
        assert!(err.contains("between 0 and 1000"), "{err}");
    }

    #[test]
    fn test_malformed_json_names_line() {
        let err = parse_jsonl(&format!("{LINE}\nnot json")).unwrap_err().to_string();
        assert!(err.contains("line 2"), "{err}");
    }

    #[test]
    fn test_json_array() {
        let content = format!("[{LINE}, {LINE}]");
        let samples = parse_json_array(&content).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].id, "sample-2");
    }

    #[test]
    fn test_load_samples_sniffs_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[{LINE}]").unwrap();
        assert_eq!(load_samples(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_load_samples_error_includes_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{}\n").unwrap();
        let err = load_samples(&path).unwrap_err().to_string();
        assert!(err.contains("bad.jsonl"), "{err}");
        assert!(err.contains("line 1"), "{err}");
    }
}
