//! Replay backend implementation
//!
//! Serves logits recorded from a compiled graph, one recorded batch per call
//! in call order. Lets accuracy runs be scored offline against dumps taken on
//! the deployment target.
//!
//! ## Recording format (JSON)
//!
//! ```json
//! {
//!   "model": "bert-large-squad-int8",
//!   "batches": [
//!     { "batch_size": 2, "seq_len": 384, "logits": [0.1, -0.3, ...] }
//!   ]
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::traits::{measure_sync, Batch, EngineConfig, InferenceEngine, InferenceOutput};
use crate::error::BenchError;

/// On-disk logit recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogitRecording {
    /// Name of the graph the logits were recorded from
    #[serde(default)]
    pub model: String,
    /// Recorded outputs, in batch order
    pub batches: Vec<InferenceOutput>,
}

impl LogitRecording {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read logit recording: {}", path.display()))?;
        let recording: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse logit recording: {}", path.display()))?;

        for (i, batch) in recording.batches.iter().enumerate() {
            if batch.logits.len() != batch.batch_size * batch.seq_len * 2 {
                anyhow::bail!(
                    "Recorded batch {} has {} values for shape [{}, {}, 2]",
                    i,
                    batch.logits.len(),
                    batch.batch_size,
                    batch.seq_len
                );
            }
        }
        Ok(recording)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string(self).context("Failed to serialize logit recording")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write logit recording: {}", path.display()))?;
        Ok(())
    }
}

/// Engine that replays a recording
pub struct ReplayBackend {
    batches: Vec<InferenceOutput>,
    cursor: AtomicUsize,
    config: EngineConfig,
    load_duration: Duration,
}

impl ReplayBackend {
    /// Load a recording from disk
    pub fn open(path: &Path) -> Result<Self> {
        tracing::info!("Loading logit recording: {}", path.display());

        let (recording, load_duration) = measure_sync(|| LogitRecording::load(path));
        let recording = recording?;

        tracing::info!(
            "Recording loaded: {} batches in {:?}",
            recording.batches.len(),
            load_duration
        );

        let model = if recording.model.is_empty() {
            path.display().to_string()
        } else {
            recording.model.clone()
        };
        let mut backend = Self::from_batches(model, recording.batches);
        backend.load_duration = load_duration;
        Ok(backend)
    }

    /// Build directly from in-memory outputs
    pub fn from_batches(model: impl Into<String>, batches: Vec<InferenceOutput>) -> Self {
        let model = model.into();
        let config = EngineConfig {
            name: format!("replay-{}", model),
            backend: "replay".to_string(),
            model,
            quantization: None,
            notes: Some(format!("{} recorded batches", batches.len())),
        };
        Self {
            batches,
            cursor: AtomicUsize::new(0),
            config,
            load_duration: Duration::ZERO,
        }
    }

    /// Number of recorded batches not yet served
    pub fn remaining(&self) -> usize {
        self.batches
            .len()
            .saturating_sub(self.cursor.load(Ordering::SeqCst))
    }
}

#[async_trait::async_trait]
impl InferenceEngine for ReplayBackend {
    fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn infer(&self, batch: &Batch) -> Result<InferenceOutput> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        let recorded = self.batches.get(index).ok_or_else(|| {
            anyhow::anyhow!(
                "Recording exhausted: call {} but only {} batches recorded",
                index + 1,
                self.batches.len()
            )
        })?;

        if recorded.batch_size != batch.batch_size || recorded.seq_len != batch.seq_len {
            return Err(BenchError::schema(format!(
                "recorded batch {} has shape [{}, {}] but input is [{}, {}]",
                index, recorded.batch_size, recorded.seq_len, batch.batch_size, batch.seq_len
            ))
            .into());
        }

        Ok(recorded.clone())
    }

    fn load_duration(&self) -> Duration {
        self.load_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(batch_size: usize, seq_len: usize) -> Batch {
        Batch {
            batch_size,
            seq_len,
            input_ids: vec![0; batch_size * seq_len],
            attention_mask: vec![1; batch_size * seq_len],
            token_type_ids: vec![0; batch_size * seq_len],
        }
    }

    #[tokio::test]
    async fn test_replay_in_order_then_exhausted() {
        let first = InferenceOutput::new(1, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let second = InferenceOutput::new(1, 2, vec![5.0, 6.0, 7.0, 8.0]).unwrap();
        let backend = ReplayBackend::from_batches("test", vec![first.clone(), second.clone()]);

        assert_eq!(backend.infer(&batch(1, 2)).await.unwrap(), first);
        assert_eq!(backend.remaining(), 1);
        assert_eq!(backend.infer(&batch(1, 2)).await.unwrap(), second);
        assert!(backend.infer(&batch(1, 2)).await.is_err());
    }

    #[tokio::test]
    async fn test_replay_shape_mismatch() {
        let recorded = InferenceOutput::new(1, 2, vec![0.0; 4]).unwrap();
        let backend = ReplayBackend::from_batches("test", vec![recorded]);

        let err = backend.infer(&batch(2, 2)).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<BenchError>(), Some(BenchError::Schema(_))));
    }

    #[test]
    fn test_recording_parse() {
        let json = r#"{
            "model": "bert-large",
            "batches": [{ "batch_size": 1, "seq_len": 1, "logits": [0.5, -0.5] }]
        }"#;
        let recording: LogitRecording = serde_json::from_str(json).unwrap();
        assert_eq!(recording.model, "bert-large");
        assert_eq!(recording.batches[0].shape(), [1, 1, 2]);
    }

    #[tokio::test]
    async fn test_recording_save_then_open() {
        let dir = std::env::temp_dir().join(format!("qa-bench-replay-{}", std::process::id()));
        let path = dir.join("logits.json");
        let output = InferenceOutput::new(1, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let recording = LogitRecording {
            model: "bert-large".to_string(),
            batches: vec![output.clone()],
        };

        recording.save(&path).unwrap();
        let backend = ReplayBackend::open(&path).unwrap();
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(backend.config().model, "bert-large");
        assert_eq!(backend.infer(&batch(1, 2)).await.unwrap(), output);
    }
}
