//! Accuracy and performance workflows
//!
//! `Executor::accuracy` runs every batch of a dataset through the engine,
//! reconstructs answer spans and scores them. `Executor::performance` times
//! the engine on synthetic batches of a fixed shape.
//!
//! Engine calls are awaited one at a time in batch order. The first engine
//! error aborts the run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::benchmark::{summarize, LatencySummary, MetricService};
use crate::dataset::{validate_eval_set, DataLoader, Reference, SyntheticBatches};
use crate::engines::traits::measure_async;
use crate::engines::InferenceEngine;
use crate::error::BenchError;
use crate::postprocess::SpanPostProcessor;
use crate::run_log::RunLog;

/// Seed for synthetic performance batches
pub const DEFAULT_SEED: u64 = 42;

/// Outcome of an accuracy run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    /// F1 as reported by the metric, if present
    pub f1: Option<f64>,
    /// Exact match as reported by the metric, if present
    pub exact_match: Option<f64>,
    pub examples: usize,
    pub features: usize,
    pub batches: usize,
}

/// Shape and length of a performance run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceParams {
    pub batch_size: usize,
    pub seq_len: usize,
    pub iteration: usize,
    pub warm_up: usize,
}

impl PerformanceParams {
    /// Reject parameters that cannot produce a measurement
    pub fn validate(&self) -> Result<(), BenchError> {
        if self.batch_size == 0 {
            return Err(BenchError::config("Batch size must be greater than 0"));
        }
        if self.seq_len == 0 {
            return Err(BenchError::config("Sequence length must be greater than 0"));
        }
        if self.iteration == 0 {
            return Err(BenchError::config("Iteration must be greater than 0"));
        }
        if self.warm_up >= self.iteration {
            return Err(BenchError::config(format!(
                "Warm up should be less than iteration (warm_up = {}, iteration = {})",
                self.warm_up, self.iteration
            )));
        }
        Ok(())
    }
}

/// Outcome of a performance run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub params: PerformanceParams,
    pub latency: LatencySummary,
}

/// Drives an inference engine through the benchmark workflows
pub struct Executor {
    engine: Arc<dyn InferenceEngine>,
    postprocessor: SpanPostProcessor,
    seed: u64,
}

impl Executor {
    pub fn new(engine: Arc<dyn InferenceEngine>) -> Self {
        Self {
            engine,
            postprocessor: SpanPostProcessor::default(),
            seed: DEFAULT_SEED,
        }
    }

    pub fn with_postprocessor(mut self, postprocessor: SpanPostProcessor) -> Self {
        self.postprocessor = postprocessor;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn engine(&self) -> &dyn InferenceEngine {
        self.engine.as_ref()
    }

    /// Evaluate answer quality over every batch of `loader`
    pub async fn accuracy(
        &self,
        log: &RunLog,
        loader: &dyn DataLoader,
        metric: &dyn MetricService,
    ) -> Result<AccuracyReport> {
        let eval = loader.eval_set();
        validate_eval_set(eval.examples, eval.features)?;

        let batches = loader.len();
        log.info(format!(
            "Evaluating {} examples ({} features, {} batches) with {}",
            eval.examples.len(),
            eval.features.len(),
            batches,
            self.engine.name()
        ));

        let mut start_logits: Vec<Vec<f32>> = Vec::with_capacity(eval.features.len());
        let mut end_logits: Vec<Vec<f32>> = Vec::with_capacity(eval.features.len());

        for index in 0..batches {
            let batch = loader
                .batch(index)
                .with_context(|| format!("Failed to build batch {}", index))?;
            let output = self
                .engine
                .infer(&batch)
                .await
                .with_context(|| format!("Inference failed on batch {}", index))?;

            if output.batch_size != batch.batch_size {
                return Err(BenchError::schema(format!(
                    "batch {} has {} rows but the engine returned {}",
                    index, batch.batch_size, output.batch_size
                ))
                .into());
            }

            let (start, end) = output.split_start_end();
            start_logits.extend(start);
            end_logits.extend(end);
            tracing::debug!("Batch {}/{} done", index + 1, batches);
        }

        if start_logits.len() != eval.features.len() {
            return Err(BenchError::schema(format!(
                "{} features but {} logit rows across {} batches",
                eval.features.len(),
                start_logits.len(),
                batches
            ))
            .into());
        }

        let predictions = self
            .postprocessor
            .process(eval.examples, eval.features, &start_logits, &end_logits)?;
        let references: Vec<Reference> = eval.examples.iter().map(Reference::from).collect();

        tracing::debug!(
            "Scoring {} predictions against '{}' with {}",
            predictions.len(),
            eval.answer_column,
            metric.name()
        );
        let scores = metric
            .compute(&predictions, &references)
            .with_context(|| format!("Failed to compute {} metric", metric.name()))?;

        let f1 = scores.get("f1").copied();
        let exact_match = scores.get("exact_match").copied();
        log_metric(log, "F1 Accuracy", f1);
        log_metric(log, "Exact Match", exact_match);

        Ok(AccuracyReport {
            f1,
            exact_match,
            examples: eval.examples.len(),
            features: eval.features.len(),
            batches,
        })
    }

    /// Time the engine on synthetic batches of a fixed shape
    pub async fn performance(&self, log: &RunLog, params: &PerformanceParams) -> Result<PerformanceReport> {
        params.validate()?;

        log.info(format!("Batch size = {}", params.batch_size));
        log.info(format!("Sequence length = {}", params.seq_len));

        let batches = SyntheticBatches::new(
            params.batch_size,
            params.seq_len,
            params.iteration,
            self.engine.synthetic_ranges(),
            self.seed,
        );

        let mut durations = Vec::with_capacity(params.iteration);
        for (i, batch) in batches.enumerate() {
            let (result, elapsed) = measure_async(self.engine.infer(&batch)).await;
            result.with_context(|| format!("Inference failed on iteration {}", i))?;
            durations.push(elapsed.as_secs_f64());
            tracing::trace!("Iteration {}: {:?}", i, elapsed);
        }

        let latency = summarize(&durations, params.batch_size, params.warm_up)?;

        log.info(format!("P50 Latency: {:.3} ms", latency.p50 * 1000.0));
        log.info(format!("P90 Latency: {:.3} ms", latency.p90 * 1000.0));
        log.info(format!("P99 Latency: {:.3} ms", latency.p99 * 1000.0));
        log.info(format!("Average Latency: {:.3} ms", latency.average * 1000.0));
        log.info(format!("Throughput: {:.3} samples/sec", latency.throughput));

        Ok(PerformanceReport {
            params: *params,
            latency,
        })
    }
}

fn log_metric(log: &RunLog, label: &str, value: Option<f64>) {
    match value {
        Some(v) => log.info(format!("{}: {:.3}", label, v)),
        None => log.warn(format!("{}: absent", label)),
    }
}
