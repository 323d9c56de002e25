//! SQuAD-style evaluation data
//!
//! Reads flattened SQuAD records (one JSON object per line, the layout the
//! `datasets` library exports) and windows each context into features with a
//! `tokenizer.json` tokenizer.
//!
//! ## Record format (JSON lines)
//!
//! ```json
//! {"id": "56be4db0acb8001400a502ec", "question": "Which NFL team ...?",
//!  "context": "Super Bowl 50 was ...",
//!  "answers": {"text": ["Denver Broncos"], "answer_start": [177]}}
//! ```
//!
//! The answer column name is configurable; a list of
//! `{"text": ..., "answer_start": ...}` objects is accepted as well.

use anyhow::{Context, Result};
use serde_json::Value;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tokenizers::{Tokenizer, TruncationDirection, TruncationParams, TruncationStrategy};

use super::loader::FeatureSetLoader;
use super::types::{Answers, Example, Feature};
use crate::config::{DatasetKind, FeatureConfig};

/// Sequence index of the context in a (question, context) pair encoding
const CONTEXT_SEQUENCE: usize = 1;

/// Everything needed to build the evaluation loader
#[derive(Debug, Clone)]
pub struct SquadOptions {
    pub dataset: DatasetKind,
    pub data_dir: PathBuf,
    pub tokenizer_dir: PathBuf,
    pub batch_size: usize,
    /// Cap on examples read (features may outnumber it)
    pub max_eval_samples: Option<usize>,
    pub features: FeatureConfig,
}

/// Summary of a loaded evaluation set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SquadStats {
    pub examples: usize,
    pub features: usize,
    pub unanswerable: usize,
    /// Examples split into more than one window
    pub windowed_examples: usize,
}

/// Load examples, tokenize them and wrap everything in a loader
pub fn load_squad(options: &SquadOptions) -> Result<FeatureSetLoader> {
    let data_file = resolve_data_file(&options.data_dir, options.dataset)?;
    tracing::info!("Loading {} examples from {}", options.dataset.name(), data_file.display());

    let examples = read_examples(&data_file, &options.features.answer_column, options.max_eval_samples)?;

    let tokenizer = load_tokenizer(&options.tokenizer_dir, &options.features)?;
    let features = build_features(&tokenizer, &examples, &options.features)?;

    tracing::info!(
        "Prepared {} features from {} examples (max_seq_length={}, doc_stride={})",
        features.len(),
        examples.len(),
        options.features.max_seq_length,
        options.features.doc_stride
    );

    let loader = FeatureSetLoader::new(
        examples,
        features,
        options.features.answer_column.clone(),
        options.batch_size,
        Some(options.features.max_seq_length),
    )?;
    Ok(loader)
}

/// Count examples, features and windowing of a loaded set
pub fn stats(examples: &[Example], features: &[Feature]) -> SquadStats {
    let mut per_example = std::collections::HashMap::new();
    for feature in features {
        *per_example.entry(feature.example_id.as_str()).or_insert(0usize) += 1;
    }
    SquadStats {
        examples: examples.len(),
        features: features.len(),
        unanswerable: examples.iter().filter(|e| e.answers.is_empty()).count(),
        windowed_examples: per_example.values().filter(|&&n| n > 1).count(),
    }
}

/// Find the validation file for a dataset under `data_dir`
///
/// Tried in order: `{dataset}/validation.jsonl`, `{dataset}.jsonl`,
/// `validation.jsonl`.
pub fn resolve_data_file(data_dir: &Path, dataset: DatasetKind) -> Result<PathBuf> {
    let candidates = [
        data_dir.join(dataset.name()).join("validation.jsonl"),
        data_dir.join(format!("{}.jsonl", dataset.name())),
        data_dir.join("validation.jsonl"),
    ];
    candidates
        .iter()
        .find(|p| p.is_file())
        .cloned()
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No validation file for '{}' under {} (tried {:?})",
                dataset.name(),
                data_dir.display(),
                candidates
            )
        })
}

/// Read at most `max_examples` records from a JSON lines file
pub fn read_examples(path: &Path, answer_column: &str, max_examples: Option<usize>) -> Result<Vec<Example>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open dataset file: {}", path.display()))?;
    let limit = max_examples.unwrap_or(usize::MAX);

    let mut examples = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        if examples.len() >= limit {
            break;
        }
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let example = parse_record(&line, answer_column)
            .with_context(|| format!("Invalid record at {}:{}", path.display(), line_no + 1))?;
        examples.push(example);
    }

    Ok(examples)
}

/// Parse one flattened SQuAD record
pub fn parse_record(line: &str, answer_column: &str) -> Result<Example> {
    let record: Value = serde_json::from_str(line).context("Record is not valid JSON")?;

    let id = match record.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => anyhow::bail!("Record has no id"),
    };
    let context = record
        .get("context")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("Record '{}' has no context", id))?;
    let question = record.get("question").and_then(Value::as_str).unwrap_or_default();

    let answers = match record.get(answer_column) {
        Some(value) => parse_answers(value)
            .with_context(|| format!("Record '{}' has malformed '{}' column", id, answer_column))?,
        None => anyhow::bail!("Record '{}' has no '{}' column", id, answer_column),
    };

    Ok(Example::new(id, question, context).with_answers(answers))
}

fn parse_answers(value: &Value) -> Result<Answers> {
    match value {
        // Column layout: {"text": [...], "answer_start": [...]}
        Value::Object(_) => Ok(serde_json::from_value(value.clone())?),
        // Row layout: [{"text": ..., "answer_start": ...}, ...]
        Value::Array(items) => {
            let mut answers = Answers::default();
            for item in items {
                let text = item
                    .get("text")
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow::anyhow!("Answer without text"))?;
                let start = item
                    .get("answer_start")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| anyhow::anyhow!("Answer '{}' without answer_start", text))?;
                answers.text.push(text.to_string());
                answers.answer_start.push(start as usize);
            }
            Ok(answers)
        }
        _ => anyhow::bail!("Expected an object or a list"),
    }
}

/// Load `tokenizer.json` and configure context-only truncation with stride
pub fn load_tokenizer(dir: &Path, config: &FeatureConfig) -> Result<Tokenizer> {
    let path = dir.join("tokenizer.json");
    let mut tokenizer = Tokenizer::from_file(&path)
        .map_err(|e| anyhow::anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))?;

    tokenizer
        .with_truncation(Some(TruncationParams {
            direction: TruncationDirection::Right,
            max_length: config.max_seq_length,
            strategy: TruncationStrategy::OnlySecond,
            stride: config.doc_stride,
        }))
        .map_err(|e| anyhow::anyhow!("Invalid truncation settings: {}", e))?;
    tokenizer.with_padding(None);

    Ok(tokenizer)
}

/// Tokenize every example into one or more overlapping windows
pub fn build_features(tokenizer: &Tokenizer, examples: &[Example], config: &FeatureConfig) -> Result<Vec<Feature>> {
    let mut features = Vec::with_capacity(examples.len());

    for example in examples {
        let question = example.question.trim_start();
        let encoding = tokenizer
            .encode_char_offsets((question, example.context.as_str()), true)
            .map_err(|e| anyhow::anyhow!("Tokenizing example '{}': {}", example.id, e))?;

        for window in std::iter::once(&encoding).chain(encoding.get_overflowing().iter()) {
            features.push(feature_from_window(
                &example.id,
                window.get_ids(),
                window.get_type_ids(),
                window.get_attention_mask(),
                window.get_offsets(),
                &window.get_sequence_ids(),
                config.max_seq_length,
            ));
        }
    }

    Ok(features)
}

/// Turn one encoded window into a fixed-length feature
///
/// Offsets of tokens outside the context sequence and empty offsets become
/// `None`. Rows are padded (or cut) to `seq_len`.
pub fn feature_from_window(
    example_id: &str,
    ids: &[u32],
    type_ids: &[u32],
    attention_mask: &[u32],
    offsets: &[(usize, usize)],
    sequence_ids: &[Option<usize>],
    seq_len: usize,
) -> Feature {
    let to_i32 = |values: &[u32]| -> Vec<i32> {
        let mut row: Vec<i32> = values.iter().take(seq_len).map(|&v| v as i32).collect();
        row.resize(seq_len, 0);
        row
    };

    let mut offset_mapping: Vec<Option<(usize, usize)>> = offsets
        .iter()
        .zip(sequence_ids)
        .take(seq_len)
        .map(|(&(start, end), seq)| match seq {
            Some(CONTEXT_SEQUENCE) if start < end => Some((start, end)),
            _ => None,
        })
        .collect();
    offset_mapping.resize(seq_len, None);

    Feature {
        example_id: example_id.to_string(),
        input_ids: to_i32(ids),
        attention_mask: to_i32(attention_mask),
        token_type_ids: to_i32(type_ids),
        offset_mapping,
    }
}
