//! Synthetic backend implementation
//!
//! Produces deterministic logits derived from the input tokens, with an
//! optional simulated compute delay. Used for smoke-testing the harness and
//! for calibrating timer overhead when no compiled graph is at hand.

use anyhow::Result;
use std::time::Duration;

use super::traits::{Batch, EngineConfig, InferenceEngine, InferenceOutput, SyntheticRanges};
use crate::config::SyntheticConfig;

/// Logit assigned to padding positions
const MASKED_LOGIT: f32 = -10_000.0;

pub struct SyntheticBackend {
    config: EngineConfig,
    delay: Duration,
    ranges: SyntheticRanges,
}

impl SyntheticBackend {
    pub fn new(delay: Duration) -> Self {
        Self {
            config: EngineConfig {
                name: "synthetic".to_string(),
                backend: "synthetic".to_string(),
                model: "none".to_string(),
                quantization: None,
                notes: Some(format!("simulated delay: {:?}", delay)),
            },
            delay,
            ranges: SyntheticRanges::default(),
        }
    }

    pub fn from_config(config: &SyntheticConfig) -> Self {
        let mut backend = Self::new(Duration::from_millis(config.logit_delay_ms));
        backend.ranges = SyntheticRanges {
            token_id: (0, config.token_id_high),
            attention_mask: (0, config.mask_high),
            token_type_id: (0, config.type_id_high),
        };
        backend
    }

    fn token_logits(id: i32, position: usize) -> (f32, f32) {
        let h = (id as i64 * 31 + position as i64 * 17).rem_euclid(97) as f32;
        (h / 10.0, (96.0 - h) / 10.0)
    }
}

#[async_trait::async_trait]
impl InferenceEngine for SyntheticBackend {
    fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn infer(&self, batch: &Batch) -> Result<InferenceOutput> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut logits = Vec::with_capacity(batch.batch_size * batch.seq_len * 2);
        for (i, (&id, &mask)) in batch.input_ids.iter().zip(&batch.attention_mask).enumerate() {
            if mask == 0 {
                logits.push(MASKED_LOGIT);
                logits.push(MASKED_LOGIT);
            } else {
                let (start, end) = Self::token_logits(id, i % batch.seq_len.max(1));
                logits.push(start);
                logits.push(end);
            }
        }

        Ok(InferenceOutput::new(batch.batch_size, batch.seq_len, logits)?)
    }

    fn synthetic_ranges(&self) -> SyntheticRanges {
        self.ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_synthetic_output_shape_and_determinism() {
        let backend = SyntheticBackend::new(Duration::ZERO);
        let batch = Batch {
            batch_size: 2,
            seq_len: 3,
            input_ids: vec![101, 7, 102, 101, 9, 0],
            attention_mask: vec![1, 1, 1, 1, 1, 0],
            token_type_ids: vec![0; 6],
        };

        let first = backend.infer(&batch).await.unwrap();
        let second = backend.infer(&batch).await.unwrap();
        assert_eq!(first.shape(), [2, 3, 2]);
        assert_eq!(first, second);

        let (start, end) = first.split_start_end();
        assert_eq!(start[1][2], MASKED_LOGIT);
        assert_eq!(end[1][2], MASKED_LOGIT);
    }

    #[test]
    fn test_ranges_from_config() {
        let config = SyntheticConfig {
            token_id_high: 30521,
            ..SyntheticConfig::default()
        };
        let backend = SyntheticBackend::from_config(&config);
        assert_eq!(backend.synthetic_ranges().token_id, (0, 30521));
        assert_eq!(backend.synthetic_ranges().attention_mask, (0, 1));
    }
}
