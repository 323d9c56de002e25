//! Inference engine trait abstraction
//!
//! Defines the interface every benchmarked engine implements, plus the batch
//! and logit tensor types that cross it.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::BenchError;

/// A fixed-shape batch of model inputs
///
/// All three tensors are row-major `[batch_size, seq_len]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub batch_size: usize,
    pub seq_len: usize,
    pub input_ids: Vec<i32>,
    pub attention_mask: Vec<i32>,
    pub token_type_ids: Vec<i32>,
}

impl Batch {
    /// Build a batch from per-row input tensors
    ///
    /// Rows shorter than `seq_len` are padded with zeros, longer rows are cut.
    pub fn from_rows<'a, I>(rows: I, seq_len: usize) -> Self
    where
        I: IntoIterator<Item = (&'a [i32], &'a [i32], &'a [i32])>,
    {
        let mut batch = Self {
            batch_size: 0,
            seq_len,
            input_ids: Vec::new(),
            attention_mask: Vec::new(),
            token_type_ids: Vec::new(),
        };
        for (ids, mask, types) in rows {
            push_padded(&mut batch.input_ids, ids, seq_len);
            push_padded(&mut batch.attention_mask, mask, seq_len);
            push_padded(&mut batch.token_type_ids, types, seq_len);
            batch.batch_size += 1;
        }
        batch
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.batch_size, self.seq_len]
    }

    /// Token ids of one row
    pub fn row_ids(&self, row: usize) -> &[i32] {
        &self.input_ids[row * self.seq_len..(row + 1) * self.seq_len]
    }
}

fn push_padded(dst: &mut Vec<i32>, src: &[i32], seq_len: usize) {
    let take = src.len().min(seq_len);
    dst.extend_from_slice(&src[..take]);
    dst.extend(std::iter::repeat(0).take(seq_len - take));
}

/// Raw engine output: row-major `[batch_size, seq_len, 2]`
///
/// Channel 0 holds start logits, channel 1 end logits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceOutput {
    pub batch_size: usize,
    pub seq_len: usize,
    pub logits: Vec<f32>,
}

impl InferenceOutput {
    /// Wrap a flat logit buffer, validating its length against the shape
    pub fn new(batch_size: usize, seq_len: usize, logits: Vec<f32>) -> Result<Self, BenchError> {
        let expected = batch_size * seq_len * 2;
        if logits.len() != expected {
            return Err(BenchError::schema(format!(
                "engine output has {} values, shape [{}, {}, 2] needs {}",
                logits.len(),
                batch_size,
                seq_len,
                expected
            )));
        }
        Ok(Self { batch_size, seq_len, logits })
    }

    /// Build from per-row start and end logits of equal length
    pub fn from_start_end(start: &[Vec<f32>], end: &[Vec<f32>]) -> Result<Self, BenchError> {
        if start.len() != end.len() {
            return Err(BenchError::schema(format!(
                "{} start rows but {} end rows",
                start.len(),
                end.len()
            )));
        }
        let seq_len = start.first().map(Vec::len).unwrap_or(0);
        let mut logits = Vec::with_capacity(start.len() * seq_len * 2);
        for (s_row, e_row) in start.iter().zip(end) {
            if s_row.len() != seq_len || e_row.len() != seq_len {
                return Err(BenchError::schema("ragged logit rows"));
            }
            for (s, e) in s_row.iter().zip(e_row) {
                logits.push(*s);
                logits.push(*e);
            }
        }
        Self::new(start.len(), seq_len, logits)
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.batch_size, self.seq_len, 2]
    }

    /// Split the packed channels into `(start_rows, end_rows)`
    pub fn split_start_end(&self) -> (Vec<Vec<f32>>, Vec<Vec<f32>>) {
        if self.seq_len == 0 {
            return (vec![Vec::new(); self.batch_size], vec![Vec::new(); self.batch_size]);
        }
        let mut starts = Vec::with_capacity(self.batch_size);
        let mut ends = Vec::with_capacity(self.batch_size);
        for row in self.logits.chunks_exact(self.seq_len * 2) {
            starts.push(row.iter().step_by(2).copied().collect());
            ends.push(row.iter().skip(1).step_by(2).copied().collect());
        }
        (starts, ends)
    }
}

/// Inclusive value ranges for synthetic inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticRanges {
    pub token_id: (i32, i32),
    pub attention_mask: (i32, i32),
    pub token_type_id: (i32, i32),
}

impl Default for SyntheticRanges {
    fn default() -> Self {
        Self {
            token_id: (0, 127),
            attention_mask: (0, 1),
            token_type_id: (0, 1),
        }
    }
}

/// Configuration for an engine backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Human-readable name for this configuration
    pub name: String,
    /// Backend type (replay, synthetic)
    pub backend: String,
    /// Model artifact the engine was built from
    pub model: String,
    /// Quantization mode label (if applicable)
    pub quantization: Option<String>,
    /// Additional notes
    pub notes: Option<String>,
}

/// Unified trait for inference engines
///
/// The executor awaits one call at a time, in batch order, so implementations
/// never see overlapping requests from the harness.
#[async_trait::async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Get the configuration for this engine
    fn config(&self) -> &EngineConfig;

    /// Get the name of this engine configuration
    fn name(&self) -> &str {
        &self.config().name
    }

    /// Run one batch, returning packed start/end logits
    async fn infer(&self, batch: &Batch) -> Result<InferenceOutput>;

    /// Value ranges the engine accepts for synthetic performance inputs
    fn synthetic_ranges(&self) -> SyntheticRanges {
        SyntheticRanges::default()
    }

    /// Get engine load duration
    fn load_duration(&self) -> Duration {
        Duration::ZERO
    }
}

/// Helper to measure duration of an async operation
pub async fn measure_async<F, T>(f: F) -> (T, Duration)
where
    F: std::future::Future<Output = T>,
{
    let start = std::time::Instant::now();
    let result = f.await;
    let duration = start.elapsed();
    (result, duration)
}

/// Helper to measure duration of a sync operation
pub fn measure_sync<F, T>(f: F) -> (T, Duration)
where
    F: FnOnce() -> T,
{
    let start = std::time::Instant::now();
    let result = f();
    let duration = start.elapsed();
    (result, duration)
}
