//! Latency statistics for performance runs
//!
//! Turns per-batch wall-clock durations into per-sample latency percentiles
//! and throughput. The first `warm_up` iterations are dropped to exclude
//! cold-start effects.

use serde::{Deserialize, Serialize};

use crate::error::BenchError;

/// Per-sample latency statistics, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    pub average: f64,
    /// Samples per second
    pub throughput: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    /// Timed iterations kept after warm-up
    pub samples: usize,
}

impl LatencySummary {
    /// Format a summary line for display
    pub fn format_summary(&self) -> String {
        format!(
            "P50: {:.3}ms | P90: {:.3}ms | P99: {:.3}ms | Avg: {:.3}ms | Throughput: {:.3}/s",
            self.p50 * 1000.0,
            self.p90 * 1000.0,
            self.p99 * 1000.0,
            self.average * 1000.0,
            self.throughput
        )
    }
}

/// Summarize per-batch `durations` (seconds) as per-sample statistics
pub fn summarize(durations: &[f64], batch_size: usize, warm_up: usize) -> Result<LatencySummary, BenchError> {
    if batch_size == 0 {
        return Err(BenchError::config("batch size must be greater than 0"));
    }
    if warm_up >= durations.len() {
        return Err(BenchError::EmptyTimings {
            warm_up,
            total: durations.len(),
        });
    }

    let mut per_sample: Vec<f64> = durations[warm_up..]
        .iter()
        .map(|d| d / batch_size as f64)
        .collect();
    per_sample.sort_by(f64::total_cmp);

    let n = per_sample.len() as f64;
    let average = per_sample.iter().sum::<f64>() / n;
    let variance = per_sample.iter().map(|x| (x - average).powi(2)).sum::<f64>() / n;

    Ok(LatencySummary {
        p50: percentile(&per_sample, 50.0),
        p90: percentile(&per_sample, 90.0),
        p99: percentile(&per_sample, 99.0),
        average,
        throughput: if average > 0.0 { 1.0 / average } else { f64::INFINITY },
        min: per_sample[0],
        max: per_sample[per_sample.len() - 1],
        std_dev: variance.sqrt(),
        samples: per_sample.len(),
    })
}

/// Percentile of sorted values, interpolating linearly between order statistics
///
/// `sorted` must be ascending and non-empty.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}
