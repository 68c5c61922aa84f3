//! Structured parsing of free-text LLM replies.
//!
//! A [`ResponseGrammar`] is an ordered list of field markers (`SCORE:`,
//! `CORRECTED:`, ...). Each marker starts a line; its value runs to the end of
//! that line plus any following lines up to the next marker. Every field has a
//! fallback, so parsing never fails: the result records which fields fell back
//! and why.
//!
//! Marker lines may carry light markdown decoration (`**SCORE**:`, `- SCORE:`)
//! and are matched case-insensitively. Two markers on one line are not split.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Expected shape of a field's value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Text,
    /// A finite number within `[min, max]`.
    Number { min: f64, max: f64 },
}

/// A parsed (or fallback) field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

/// One field of a grammar.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub marker: String,
    pub kind: FieldKind,
    pub fallback: FieldValue,
}

impl FieldSpec {
    pub fn text(marker: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            kind: FieldKind::Text,
            fallback: FieldValue::Text(fallback.into()),
        }
    }

    pub fn number(marker: impl Into<String>, min: f64, max: f64, fallback: f64) -> Self {
        Self {
            marker: marker.into(),
            kind: FieldKind::Number { min, max },
            fallback: FieldValue::Number(fallback),
        }
    }
}

/// Ordered field markers with per-field fallbacks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseGrammar {
    fields: Vec<FieldSpec>,
    allow_bare: bool,
}

impl ResponseGrammar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// When the reply contains no marker at all, treat the whole reply as the
    /// value of the first field.
    pub fn allow_bare(mut self) -> Self {
        self.allow_bare = true;
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Grammar for the faithfulness rubric: one score in `[0, 1]`, neutral 0.5 fallback.
    pub fn faithfulness() -> Self {
        Self::new()
            .field(FieldSpec::number("SCORE", 0.0, 1.0, 0.5))
            .allow_bare()
    }

    /// Grammar for tutor correction replies.
    pub fn correction() -> Self {
        Self::new()
            .field(FieldSpec::text("CORRECTED", ""))
            .field(FieldSpec::text("EXPLANATION", ""))
            .field(FieldSpec::number("CONFIDENCE", 0.0, 1.0, 0.0))
            .allow_bare()
    }

    /// Parse a reply. Never fails.
    pub fn parse(&self, response: &str) -> ParsedResponse {
        let raw = self.split_fields(response);
        let mut parsed = ParsedResponse::default();

        for spec in &self.fields {
            let key = spec.marker.to_uppercase();
            let outcome = match raw.get(&key) {
                Some(value) => parse_value(value, spec.kind),
                None => Err("marker missing".to_string()),
            };
            match outcome {
                Ok(value) => {
                    parsed.values.insert(key, value);
                }
                Err(reason) => {
                    parsed.values.insert(key.clone(), spec.fallback.clone());
                    parsed.fallbacks.insert(key, reason);
                }
            }
        }
        parsed
    }

    /// Map marker (upper-cased) to its raw value text. First occurrence wins.
    fn split_fields(&self, response: &str) -> BTreeMap<String, String> {
        let mut values: BTreeMap<String, String> = BTreeMap::new();
        let mut current: Option<String> = None;

        for line in response.lines() {
            if let Some((marker, rest)) = self.match_marker(line) {
                if values.contains_key(&marker) {
                    current = None;
                } else {
                    values.insert(marker.clone(), rest.to_string());
                    current = Some(marker);
                }
                continue;
            }
            if let Some(marker) = &current
                && let Some(value) = values.get_mut(marker)
            {
                value.push('\n');
                value.push_str(line);
            }
        }

        if values.is_empty()
            && self.allow_bare
            && let Some(first) = self.fields.first()
        {
            values.insert(first.marker.to_uppercase(), response.to_string());
        }
        values
    }

    fn match_marker<'a>(&self, line: &'a str) -> Option<(String, &'a str)> {
        let stripped = line.trim_start().trim_start_matches(['*', '#', '-', '>', ' ']);
        for spec in &self.fields {
            let marker = spec.marker.as_str();
            let Some(head) = stripped.get(..marker.len()) else {
                continue;
            };
            if !head.eq_ignore_ascii_case(marker) {
                continue;
            }
            let tail = stripped[marker.len()..].trim_start_matches('*');
            if let Some(rest) = tail.strip_prefix(':') {
                let rest = rest.trim_start_matches('*');
                return Some((marker.to_uppercase(), rest));
            }
        }
        None
    }
}

fn parse_value(raw: &str, kind: FieldKind) -> Result<FieldValue, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty value".to_string());
    }
    match kind {
        FieldKind::Text => Ok(FieldValue::Text(trimmed.to_string())),
        FieldKind::Number { min, max } => {
            let token = trimmed
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .trim_matches(|c: char| matches!(c, '*' | '`' | '"' | '\'' | ',' | ';'))
                .trim_end_matches('.');
            let value: f64 = token
                .parse()
                .map_err(|_| format!("not a number: {token:?}"))?;
            if !value.is_finite() {
                return Err(format!("not a finite number: {token:?}"));
            }
            if value < min || value > max {
                return Err(format!("{value} outside [{min}, {max}]"));
            }
            Ok(FieldValue::Number(value))
        }
    }
}

/// Result of parsing a reply against a grammar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedResponse {
    values: BTreeMap<String, FieldValue>,
    fallbacks: BTreeMap<String, String>,
}

impl ParsedResponse {
    pub fn get(&self, marker: &str) -> Option<&FieldValue> {
        self.values.get(&marker.to_uppercase())
    }

    pub fn text(&self, marker: &str) -> Option<&str> {
        match self.get(marker)? {
            FieldValue::Text(s) => Some(s.as_str()),
            FieldValue::Number(_) => None,
        }
    }

    pub fn number(&self, marker: &str) -> Option<f64> {
        match self.get(marker)? {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }

    /// Why a field fell back, if it did.
    pub fn fallback_reason(&self, marker: &str) -> Option<&str> {
        self.fallbacks.get(&marker.to_uppercase()).map(String::as_str)
    }

    pub fn fallbacks(&self) -> &BTreeMap<String, String> {
        &self.fallbacks
    }

    /// True when every field was parsed from the reply.
    pub fn is_complete(&self) -> bool {
        self.fallbacks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_faithfulness_bare_number() {
        let parsed = ResponseGrammar::faithfulness().parse("0.8");
        assert_eq!(parsed.number("score"), Some(0.8));
        assert!(parsed.is_complete());
    }

    #[test]
    fn test_faithfulness_marker() {
        let parsed = ResponseGrammar::faithfulness().parse("Score: 1.0\nThe answer quotes the context.");
        assert_eq!(parsed.number("SCORE"), Some(1.0));
    }

    #[test]
    fn test_faithfulness_bold_marker_and_trailing_period() {
        let parsed = ResponseGrammar::faithfulness().parse("**Score:** 0.5.");
        assert_eq!(parsed.number("SCORE"), Some(0.5));
        assert!(parsed.is_complete());
    }

    #[test]
    fn test_faithfulness_non_numeric_falls_back() {
        let parsed = ResponseGrammar::faithfulness().parse("The answer is well grounded.");
        assert_eq!(parsed.number("SCORE"), Some(0.5));
        assert!(parsed.fallback_reason("SCORE").unwrap().contains("not a number"));
    }

    #[test]
    fn test_faithfulness_empty_falls_back() {
        let parsed = ResponseGrammar::faithfulness().parse("   ");
        assert_eq!(parsed.number("SCORE"), Some(0.5));
        assert_eq!(parsed.fallback_reason("SCORE"), Some("empty value"));
    }

    #[test]
    fn test_faithfulness_out_of_range_falls_back() {
        let parsed = ResponseGrammar::faithfulness().parse("7");
        assert_eq!(parsed.number("SCORE"), Some(0.5));
        assert!(parsed.fallback_reason("SCORE").unwrap().contains("outside"));
    }

    #[test]
    fn test_nan_rejected() {
        let parsed = ResponseGrammar::faithfulness().parse("NaN");
        assert_eq!(parsed.number("SCORE"), Some(0.5));
    }

    #[test]
    fn test_correction_full() {
        let reply = "CORRECTED: Mimi ninasoma kitabu.\n\
                     EXPLANATION: The present tense uses -na-.\n\
                     It attaches after the subject prefix.\n\
                     CONFIDENCE: 0.9";
        let parsed = ResponseGrammar::correction().parse(reply);
        assert!(parsed.is_complete());
        assert_eq!(parsed.text("corrected"), Some("Mimi ninasoma kitabu."));
        assert_eq!(
            parsed.text("explanation"),
            Some("The present tense uses -na-.\nIt attaches after the subject prefix.")
        );
        assert_eq!(parsed.number("confidence"), Some(0.9));
    }

    #[test]
    fn test_correction_missing_confidence() {
        let parsed = ResponseGrammar::correction().parse("CORRECTED: Habari yako?\nEXPLANATION: fine");
        assert_eq!(parsed.number("CONFIDENCE"), Some(0.0));
        assert_eq!(parsed.fallback_reason("CONFIDENCE"), Some("marker missing"));
        assert_eq!(parsed.fallbacks().len(), 1);
    }

    #[test]
    fn test_correction_no_markers_uses_bare_text() {
        let parsed = ResponseGrammar::correction().parse("Habari yako?");
        assert_eq!(parsed.text("CORRECTED"), Some("Habari yako?"));
        assert_eq!(parsed.fallback_reason("EXPLANATION"), Some("marker missing"));
    }

    #[test]
    fn test_duplicate_marker_first_wins() {
        let parsed = ResponseGrammar::correction().parse("CORRECTED: one\nCORRECTED: two\nmore");
        assert_eq!(parsed.text("CORRECTED"), Some("one"));
    }

    #[test]
    fn test_empty_marker_value_falls_back() {
        let parsed = ResponseGrammar::correction().parse("CORRECTED:\nEXPLANATION: x\nCONFIDENCE: 1");
        assert_eq!(parsed.text("CORRECTED"), Some(""));
        assert_eq!(parsed.fallback_reason("CORRECTED"), Some("empty value"));
    }

    #[test]
    fn test_without_bare_missing_marker_falls_back() {
        let grammar = ResponseGrammar::new().field(FieldSpec::number("SCORE", 0.0, 1.0, 0.5));
        let parsed = grammar.parse("0.9");
        assert_eq!(parsed.number("SCORE"), Some(0.5));
    }

    #[test]
    fn test_marker_prefix_not_confused() {
        // "SCOREBOARD:" must not be read as the SCORE marker.
        let grammar = ResponseGrammar::new().field(FieldSpec::number("SCORE", 0.0, 1.0, 0.5));
        let parsed = grammar.parse("SCOREBOARD: 0.9");
        assert_eq!(parsed.fallback_reason("SCORE"), Some("marker missing"));
    }
}
