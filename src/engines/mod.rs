//! Inference engine abstraction
//!
//! Provides a unified trait for the engines under benchmark:
//! - replay (logits recorded from a compiled graph)
//! - synthetic (deterministic logits, optional simulated delay)

pub mod replay_backend;
pub mod synthetic_backend;
pub mod traits;

pub use replay_backend::{LogitRecording, ReplayBackend};
pub use synthetic_backend::SyntheticBackend;
pub use traits::{Batch, EngineConfig, InferenceEngine, InferenceOutput, SyntheticRanges};
