//! Latency gating and throughput.

use crate::error::MetricError;
use crate::types::Timing;
use serde::{Deserialize, Serialize};

/// Default acceptable response time in seconds.
pub const DEFAULT_LATENCY_THRESHOLD_SECS: f64 = 5.0;

/// Latency of one query and whether it passes the SLA gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyReport {
    pub latency_seconds: f64,
    pub latency_ms: f64,
    pub is_acceptable: bool,
}

/// Classify the elapsed time between two timestamps (seconds).
pub fn evaluate_latency(start: f64, end: f64, threshold: f64) -> Result<LatencyReport, MetricError> {
    if !threshold.is_finite() || threshold <= 0.0 {
        return Err(MetricError::InvalidThreshold { threshold });
    }
    if !start.is_finite() || !end.is_finite() || end < start {
        return Err(MetricError::InvalidTiming { start, end });
    }
    let latency_seconds = end - start;
    Ok(LatencyReport {
        latency_seconds,
        latency_ms: latency_seconds * 1000.0,
        is_acceptable: latency_seconds < threshold,
    })
}

/// Queries per second. Zero elapsed time yields 0 rather than infinity.
pub fn throughput(num_queries: usize, total_seconds: f64) -> f64 {
    if num_queries == 0 || !total_seconds.is_finite() || total_seconds <= 0.0 {
        return 0.0;
    }
    num_queries as f64 / total_seconds
}

/// Throughput over a batch: timed queries divided by the span from the
/// earliest start to the latest end, so overlapping queries are not double-counted.
pub fn batch_throughput(timings: &[Timing]) -> f64 {
    let valid: Vec<&Timing> = timings
        .iter()
        .filter(|t| t.start.is_finite() && t.end.is_finite() && t.end >= t.start)
        .collect();
    let Some(first) = valid.iter().map(|t| t.start).reduce(f64::min) else {
        return 0.0;
    };
    let last = valid.iter().map(|t| t.end).fold(first, f64::max);
    throughput(valid.len(), last - first)
}
