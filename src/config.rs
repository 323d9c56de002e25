//! Configuration for QA benchmark runs
//!
//! Defines the bench.toml schema, the dataset selector and the closed set of
//! quantization modes a benchmarked graph can be tagged with.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::BenchError;

/// Evaluation dataset, which also selects the metric
///
/// - `Squad`: every question is answerable (exact_match / f1)
/// - `SquadV2`: unanswerable questions allowed (exact / f1 / HasAns / NoAns)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    #[default]
    Squad,
    SquadV2,
}

impl DatasetKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Squad => "squad",
            Self::SquadV2 => "squad_v2",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "squad" | "squad_v1" | "squad-v1" => Some(Self::Squad),
            "squad_v2" | "squad-v2" | "squadv2" => Some(Self::SquadV2),
            _ => None,
        }
    }

    /// Parse a dataset name, failing with a configuration error
    pub fn parse(s: &str) -> Result<Self, BenchError> {
        Self::from_str(s)
            .ok_or_else(|| BenchError::config(format!("unknown dataset '{}'", s)))
    }

    /// Whether examples may have an empty answer set
    pub fn allows_no_answer(&self) -> bool {
        match self {
            Self::Squad => false,
            Self::SquadV2 => true,
        }
    }
}

/// Quantization approach the benchmarked graph was produced with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantizationMode {
    #[serde(rename = "post_training_static_quant")]
    PostTrainingStatic,
    #[serde(rename = "post_training_dynamic_quant")]
    PostTrainingDynamic,
    #[serde(rename = "quant_aware_training")]
    QuantizationAwareTraining,
}

impl QuantizationMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PostTrainingStatic => "post_training_static_quant",
            Self::PostTrainingDynamic => "post_training_dynamic_quant",
            Self::QuantizationAwareTraining => "quant_aware_training",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "post_training_static_quant" | "static" => Some(Self::PostTrainingStatic),
            "post_training_dynamic_quant" | "dynamic" => Some(Self::PostTrainingDynamic),
            "quant_aware_training" | "qat" => Some(Self::QuantizationAwareTraining),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::PostTrainingStatic => "Post-training static quantization (calibrated activations)",
            Self::PostTrainingDynamic => "Post-training dynamic quantization (runtime activation ranges)",
            Self::QuantizationAwareTraining => "Quantization-aware training",
        }
    }

    pub fn all() -> [Self; 3] {
        [
            Self::PostTrainingStatic,
            Self::PostTrainingDynamic,
            Self::QuantizationAwareTraining,
        ]
    }
}

/// Benchmark configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub postprocess: PostProcessConfig,

    #[serde(default)]
    pub features: FeatureConfig,

    #[serde(default)]
    pub synthetic: SyntheticConfig,

    #[serde(default)]
    pub model: ModelInfo,
}

impl BenchConfig {
    /// Load config from TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read bench config: {:?}", path))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse bench config: {:?}", path))?;
        Ok(config)
    }

    /// Load from default location (./bench.toml) or return defaults
    pub fn load_default() -> Result<Self> {
        let local_path = Path::new("bench.toml");
        if local_path.exists() {
            return Self::load(local_path);
        }
        Ok(Self::default())
    }

    /// Save config to TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Span post-processing knobs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostProcessConfig {
    /// Top-N start and end positions searched per feature
    #[serde(default = "default_n_best_size")]
    pub n_best_size: usize,

    /// Longest accepted answer, in characters
    #[serde(default = "default_max_answer_length")]
    pub max_answer_length: usize,

    /// Null-answer margin; 0.0 disables no-answer predictions
    #[serde(default)]
    pub null_score_threshold: f32,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            n_best_size: default_n_best_size(),
            max_answer_length: default_max_answer_length(),
            null_score_threshold: 0.0,
        }
    }
}

impl PostProcessConfig {
    pub fn null_answer_enabled(&self) -> bool {
        self.null_score_threshold != 0.0
    }
}

/// Windowing of long contexts into features
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Tokens per feature, question and special tokens included
    #[serde(default = "default_max_seq_length")]
    pub max_seq_length: usize,

    /// Overlapping context tokens between consecutive windows
    #[serde(default = "default_doc_stride")]
    pub doc_stride: usize,

    /// Name of the column holding reference answers
    #[serde(default = "default_answer_column")]
    pub answer_column: String,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            max_seq_length: default_max_seq_length(),
            doc_stride: default_doc_stride(),
            answer_column: default_answer_column(),
        }
    }
}

/// Synthetic input generation for performance runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Inclusive upper bound for token ids
    #[serde(default = "default_token_id_high")]
    pub token_id_high: i32,

    /// Inclusive upper bound for attention mask values
    #[serde(default = "default_binary_high")]
    pub mask_high: i32,

    /// Inclusive upper bound for token type ids
    #[serde(default = "default_binary_high")]
    pub type_id_high: i32,

    /// Simulated per-call compute time of the synthetic engine
    #[serde(default)]
    pub logit_delay_ms: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            token_id_high: default_token_id_high(),
            mask_high: default_binary_high(),
            type_id_high: default_binary_high(),
            logit_delay_ms: 0,
        }
    }
}

/// Descriptive metadata about the benchmarked graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantization: Option<QuantizationMode>,
}

fn default_n_best_size() -> usize { 20 }
fn default_max_answer_length() -> usize { 384 }
fn default_max_seq_length() -> usize { 384 }
fn default_doc_stride() -> usize { 128 }
fn default_answer_column() -> String { "answers".to_string() }
fn default_seed() -> u64 { 42 }
fn default_token_id_high() -> i32 { 127 }
fn default_binary_high() -> i32 { 1 }
