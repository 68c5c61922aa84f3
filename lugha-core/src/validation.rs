//! Output validation against an injected term-correction table.
//!
//! The table maps a term the model tends to produce to the corrected term and
//! a short note for the learner. Nothing language-specific lives in code: the
//! table comes from configuration (`[validation.corrections.terms.<term>]`).

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ConfigError;
use crate::response_parser::{ParsedResponse, ResponseGrammar};

/// Replacement for one term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermCorrection {
    pub corrected: String,
    #[serde(default)]
    pub note: String,
}

/// Term-correction table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermCorrections {
    #[serde(default)]
    pub terms: BTreeMap<String, TermCorrection>,
}

impl TermCorrections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_term(
        mut self,
        term: impl Into<String>,
        corrected: impl Into<String>,
        note: impl Into<String>,
    ) -> Self {
        self.terms.insert(
            term.into(),
            TermCorrection {
                corrected: corrected.into(),
                note: note.into(),
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// A correction that fired during validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedCorrection {
    pub term: String,
    pub corrected: String,
    pub note: String,
    pub occurrences: usize,
}

/// Validated text plus the corrections applied to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub text: String,
    pub applied: Vec<AppliedCorrection>,
}

/// A tutor correction reply after parsing and term validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewedCorrection {
    pub corrected: String,
    pub explanation: String,
    pub confidence: f64,
    pub applied: Vec<AppliedCorrection>,
    /// Fields that fell back to defaults, with the reason.
    pub fallbacks: BTreeMap<String, String>,
}

struct CompiledTerm {
    term: String,
    pattern: Regex,
    correction: TermCorrection,
}

/// Applies a [`TermCorrections`] table to model output.
pub struct Validator {
    terms: Vec<CompiledTerm>,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Escaped term with a word boundary on each side that starts or ends with a
/// word character. `\b` next to punctuation like `c++` or `-ni` never matches.
fn term_pattern(term: &str) -> String {
    let escaped = regex::escape(term);
    let lead = if term.chars().next().is_some_and(is_word_char) { r"\b" } else { "" };
    let trail = if term.chars().last().is_some_and(is_word_char) { r"\b" } else { "" };
    format!("{lead}{escaped}{trail}")
}

impl Validator {
    /// Compile the table. Longer terms are applied first so a multi-word
    /// entry wins over a single word it contains.
    pub fn new(corrections: &TermCorrections) -> Result<Self, ConfigError> {
        let mut terms = corrections
            .terms
            .iter()
            .filter(|(term, _)| !term.trim().is_empty())
            .map(|(term, correction)| {
                let pattern = RegexBuilder::new(&term_pattern(term.trim()))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| ConfigError::Invalid {
                        message: format!("bad correction term {term:?}: {e}"),
                    })?;
                Ok(CompiledTerm {
                    term: term.clone(),
                    pattern,
                    correction: correction.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        terms.sort_by(|a, b| b.term.len().cmp(&a.term.len()).then(a.term.cmp(&b.term)));
        Ok(Self { terms })
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Replace every whole-word, case-insensitive occurrence of a listed term.
    pub fn apply(&self, text: &str) -> ValidationOutcome {
        let mut current = text.to_string();
        let mut applied = Vec::new();

        for entry in &self.terms {
            let occurrences = entry.pattern.find_iter(&current).count();
            if occurrences == 0 {
                continue;
            }
            current = entry
                .pattern
                .replace_all(&current, regex::NoExpand(&entry.correction.corrected))
                .into_owned();
            tracing::debug!(
                term = entry.term.as_str(),
                occurrences,
                "Applied term correction"
            );
            applied.push(AppliedCorrection {
                term: entry.term.clone(),
                corrected: entry.correction.corrected.clone(),
                note: entry.correction.note.clone(),
                occurrences,
            });
        }

        ValidationOutcome {
            text: current,
            applied,
        }
    }

    /// Parse a tutor correction reply and validate its `CORRECTED` field.
    pub fn review(&self, reply: &str) -> ReviewedCorrection {
        let parsed: ParsedResponse = ResponseGrammar::correction().parse(reply);
        let outcome = self.apply(parsed.text("CORRECTED").unwrap_or_default());
        ReviewedCorrection {
            corrected: outcome.text,
            explanation: parsed.text("EXPLANATION").unwrap_or_default().to_string(),
            confidence: parsed.number("CONFIDENCE").unwrap_or(0.0),
            applied: outcome.applied,
            fallbacks: parsed.fallbacks().clone(),
        }
    }
}
