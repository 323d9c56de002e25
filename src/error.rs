//! Error taxonomy for benchmark runs
//!
//! Configuration and schema errors abort a run. Degenerate spans and missing
//! metric fields are recovered where they occur and never show up here.

use thiserror::Error;

/// Fatal conditions raised by the evaluation core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BenchError {
    /// Run parameters are invalid (e.g. warm-up not below iteration count)
    #[error("Configuration error: {0}")]
    Config(String),

    /// An upstream collaborator broke the data contract
    #[error("Schema violation: {0}")]
    Schema(String),

    /// Every timing sample was discarded, nothing left to summarize
    #[error("No timing samples left after discarding {warm_up} warm-up iterations out of {total}")]
    EmptyTimings {
        /// Number of samples discarded
        warm_up: usize,
        /// Number of samples recorded
        total: usize,
    },
}

impl BenchError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }
}
