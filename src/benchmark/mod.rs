//! Benchmark infrastructure
//!
//! Provides latency statistics for performance runs and answer-quality
//! metrics for accuracy runs.
//!
//! ## Usage
//!
//! Use the CLI for benchmarks:
//!
//! ```bash
//! qa-bench performance --model model.json --batch-size 8 --seq-len 384
//! qa-bench accuracy --model logits.json --data-dir ./data --tokenizer-dir ./bert
//! ```
//!
//! ## Modules
//!
//! - `latency` - Per-sample latency percentiles and throughput
//! - `quality` - SQuAD exact match and F1

pub mod latency;
pub mod quality;

pub use latency::{summarize, LatencySummary};
pub use quality::{
    exact_match_score, f1_score, normalize_answer, MetricScores, MetricService, SquadMetric,
};
