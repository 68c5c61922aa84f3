//! Batch aggregation and report persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

use crate::error::EvalError;
use crate::evaluator::SampleResult;
use crate::metrics::batch_throughput;
use crate::types::{MetricKind, MetricValue, Timing};

/// Summary statistics for one metric across a batch.
///
/// `count` is how many samples produced a score, `unavailable` how many tried
/// and failed. Samples where the metric did not apply are in neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAggregate {
    pub mean: Option<f64>,
    pub count: usize,
    pub unavailable: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Population standard deviation.
    pub std_dev: Option<f64>,
}

impl MetricAggregate {
    /// Aggregate finite values. Non-finite values are counted as unavailable.
    pub fn from_values(values: &[f64], unavailable: usize) -> Self {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let unavailable = unavailable + (values.len() - finite.len());
        if finite.is_empty() {
            return Self {
                mean: None,
                count: 0,
                unavailable,
                min: None,
                max: None,
                std_dev: None,
            };
        }
        let n = finite.len() as f64;
        let mean = finite.iter().sum::<f64>() / n;
        let variance = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            mean: Some(mean),
            count: finite.len(),
            unavailable,
            min: finite.iter().copied().reduce(f64::min),
            max: finite.iter().copied().reduce(f64::max),
            std_dev: Some(variance.sqrt()),
        }
    }
}

/// Latency SLA outcome across the timed samples of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub threshold_secs: f64,
    /// Samples with a valid timing.
    pub evaluated: usize,
    /// Of those, how many finished under the threshold.
    pub acceptable: usize,
}

impl LatencySummary {
    pub fn acceptable_rate(&self) -> Option<f64> {
        (self.evaluated > 0).then(|| self.acceptable as f64 / self.evaluated as f64)
    }
}

/// Aggregated result of one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub language: String,
    pub total_samples: usize,
    pub metrics: BTreeMap<MetricKind, MetricAggregate>,
    pub latency: LatencySummary,
    /// Timed samples per second of wall-clock span.
    pub throughput_qps: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub samples: Vec<SampleResult>,
}

impl EvaluationReport {
    /// Aggregate per-sample results. Aggregates depend only on `results`.
    pub fn from_results(language: &str, latency_threshold_secs: f64, results: Vec<SampleResult>) -> Self {
        let mut scored: BTreeMap<MetricKind, (Vec<f64>, usize)> = BTreeMap::new();
        for result in &results {
            for (metric, value) in &result.scores {
                let entry = scored.entry(*metric).or_default();
                match value {
                    MetricValue::Score { value } => entry.0.push(*value),
                    MetricValue::Unavailable { .. } => entry.1 += 1,
                }
            }
        }
        let metrics = scored
            .into_iter()
            .map(|(metric, (values, unavailable))| {
                (metric, MetricAggregate::from_values(&values, unavailable))
            })
            .collect();

        let latency = LatencySummary {
            threshold_secs: latency_threshold_secs,
            evaluated: results.iter().filter(|r| r.latency.is_some()).count(),
            acceptable: results
                .iter()
                .filter(|r| r.latency.is_some_and(|l| l.is_acceptable))
                .count(),
        };
        let timings: Vec<Timing> = results.iter().filter_map(|r| r.timing).collect();

        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            language: language.to_string(),
            total_samples: results.len(),
            metrics,
            latency,
            throughput_qps: batch_throughput(&timings),
            samples: results,
        }
    }

    pub fn aggregate(&self, metric: MetricKind) -> Option<&MetricAggregate> {
        self.metrics.get(&metric)
    }

    pub fn mean(&self, metric: MetricKind) -> Option<f64> {
        self.aggregate(metric).and_then(|a| a.mean)
    }

    /// `(scored, total_samples)` for a metric: "computed over N of M".
    pub fn coverage(&self, metric: MetricKind) -> (usize, usize) {
        let scored = self.aggregate(metric).map_or(0, |a| a.count);
        (scored, self.total_samples)
    }

    /// Drop per-sample detail, keeping only aggregates.
    pub fn without_samples(mut self) -> Self {
        self.samples.clear();
        self
    }

    pub fn to_json(&self) -> Result<String, EvalError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Persist the report as pretty-printed JSON, creating parent directories.
    pub fn write_json(&self, path: &Path) -> Result<(), EvalError> {
        let json = self.to_json()?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, EvalError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Human-readable summary table.
    pub fn render_summary(&self) -> String {
        let mut buf = String::new();
        buf.push_str(&format!(
            "Evaluation {} | Language: {} | Samples: {}\n",
            self.run_id, self.language, self.total_samples
        ));
        buf.push_str(&format!("Generated: {}\n\n", self.generated_at.to_rfc3339()));
        buf.push_str(&format!(
            "{:<20} {:>8} {:>8} {:>8} {:>8}  {}\n",
            "metric", "mean", "min", "max", "std", "coverage"
        ));
        for (metric, agg) in &self.metrics {
            let mut coverage = format!("computed over {} of {}", agg.count, self.total_samples);
            if agg.unavailable > 0 {
                coverage.push_str(&format!(" ({} unavailable)", agg.unavailable));
            }
            buf.push_str(&format!(
                "{:<20} {:>8} {:>8} {:>8} {:>8}  {}\n",
                metric.as_str(),
                fmt_stat(agg.mean),
                fmt_stat(agg.min),
                fmt_stat(agg.max),
                fmt_stat(agg.std_dev),
                coverage
            ));
        }
        buf.push('\n');
        match self.latency.acceptable_rate() {
            Some(rate) => buf.push_str(&format!(
                "Latency gate (< {:.1}s): {} of {} timed samples acceptable ({:.0}%)\n",
                self.latency.threshold_secs,
                self.latency.acceptable,
                self.latency.evaluated,
                rate * 100.0
            )),
            None => buf.push_str("Latency gate: no timed samples\n"),
        }
        buf.push_str(&format!("Throughput: {:.3} queries/s\n", self.throughput_qps));
        buf
    }
}

fn fmt_stat(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.4}"))
        .unwrap_or_else(|| "N/A".to_string())
}
