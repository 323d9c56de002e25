//! Evaluation data loader
//!
//! A `DataLoader` yields fixed-shape batches in feature order and exposes the
//! example and feature sets those batches were built from, so logits can be
//! mapped back to answers after inference.

use anyhow::Result;
use std::collections::HashSet;

use super::types::{Example, Feature};
use crate::engines::Batch;
use crate::error::BenchError;

/// Example set, feature set and answer column of an evaluation run
#[derive(Debug, Clone, Copy)]
pub struct EvalSet<'a> {
    pub examples: &'a [Example],
    pub features: &'a [Feature],
    pub answer_column: &'a str,
}

/// Ordered, indexable source of evaluation batches
pub trait DataLoader: Send + Sync {
    /// Number of batches
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Batch at `index`; batches concatenate to one row per feature
    fn batch(&self, index: usize) -> Result<Batch>;

    fn eval_set(&self) -> EvalSet<'_>;
}

/// In-memory loader over pre-built features
#[derive(Debug, Clone)]
pub struct FeatureSetLoader {
    examples: Vec<Example>,
    features: Vec<Feature>,
    answer_column: String,
    batch_size: usize,
    seq_len: usize,
}

impl FeatureSetLoader {
    /// Validate the example/feature relation and build the loader
    ///
    /// `seq_len` defaults to the longest feature when `None`.
    pub fn new(
        examples: Vec<Example>,
        features: Vec<Feature>,
        answer_column: impl Into<String>,
        batch_size: usize,
        seq_len: Option<usize>,
    ) -> Result<Self, BenchError> {
        if batch_size == 0 {
            return Err(BenchError::config("batch size must be greater than 0"));
        }
        validate_eval_set(&examples, &features)?;

        let seq_len = seq_len.unwrap_or_else(|| features.iter().map(Feature::len).max().unwrap_or(0));
        Ok(Self {
            examples,
            features,
            answer_column: answer_column.into(),
            batch_size,
            seq_len,
        })
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }
}

impl DataLoader for FeatureSetLoader {
    fn len(&self) -> usize {
        self.features.len().div_ceil(self.batch_size)
    }

    fn batch(&self, index: usize) -> Result<Batch> {
        let rows = self
            .features
            .chunks(self.batch_size)
            .nth(index)
            .ok_or_else(|| anyhow::anyhow!("Batch index {} out of range ({} batches)", index, self.len()))?;

        Ok(Batch::from_rows(
            rows.iter().map(|f| {
                (
                    f.input_ids.as_slice(),
                    f.attention_mask.as_slice(),
                    f.token_type_ids.as_slice(),
                )
            }),
            self.seq_len,
        ))
    }

    fn eval_set(&self) -> EvalSet<'_> {
        EvalSet {
            examples: &self.examples,
            features: &self.features,
            answer_column: &self.answer_column,
        }
    }
}

/// Check that every feature has a known owner and every example has a feature
pub fn validate_eval_set(examples: &[Example], features: &[Feature]) -> Result<(), BenchError> {
    let mut ids = HashSet::with_capacity(examples.len());
    for example in examples {
        if !ids.insert(example.id.as_str()) {
            return Err(BenchError::schema(format!("duplicate example id '{}'", example.id)));
        }
    }

    let mut owned = HashSet::with_capacity(examples.len());
    for (i, feature) in features.iter().enumerate() {
        if !ids.contains(feature.example_id.as_str()) {
            return Err(BenchError::schema(format!(
                "feature {} references unknown example '{}'",
                i, feature.example_id
            )));
        }
        owned.insert(feature.example_id.as_str());
    }

    if let Some(orphan) = examples.iter().find(|e| !owned.contains(e.id.as_str())) {
        return Err(BenchError::schema(format!("example '{}' has no features", orphan.id)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(example_id: &str, ids: Vec<i32>) -> Feature {
        let len = ids.len();
        Feature {
            example_id: example_id.to_string(),
            input_ids: ids,
            attention_mask: vec![1; len],
            token_type_ids: vec![0; len],
            offset_mapping: vec![None; len],
        }
    }

    #[test]
    fn test_batches_cover_features_in_order() {
        let examples = vec![Example::new("a", "q", "ctx"), Example::new("b", "q", "ctx")];
        let features = vec![
            feature("a", vec![1, 2, 3]),
            feature("a", vec![4, 5]),
            feature("b", vec![6, 7, 8]),
        ];
        let loader = FeatureSetLoader::new(examples, features, "answers", 2, None).unwrap();

        assert_eq!(loader.len(), 2);
        assert_eq!(loader.seq_len(), 3);

        let first = loader.batch(0).unwrap();
        assert_eq!(first.shape(), [2, 3]);
        assert_eq!(first.input_ids, vec![1, 2, 3, 4, 5, 0]);
        assert_eq!(first.attention_mask, vec![1, 1, 1, 1, 1, 0]);

        let last = loader.batch(1).unwrap();
        assert_eq!(last.shape(), [1, 3]);
        assert!(loader.batch(2).is_err());

        let rows: usize = (0..loader.len()).map(|i| loader.batch(i).unwrap().batch_size).sum();
        assert_eq!(rows, loader.eval_set().features.len());
    }

    #[test]
    fn test_example_without_features_rejected() {
        let examples = vec![Example::new("a", "q", "ctx"), Example::new("b", "q", "ctx")];
        let features = vec![feature("a", vec![1])];
        let err = FeatureSetLoader::new(examples, features, "answers", 1, None).unwrap_err();
        assert_eq!(err, BenchError::schema("example 'b' has no features"));
    }

    #[test]
    fn test_unknown_and_duplicate_ids_rejected() {
        let examples = vec![Example::new("a", "q", "ctx")];
        let err = validate_eval_set(&examples, &[feature("z", vec![1])]).unwrap_err();
        assert!(matches!(err, BenchError::Schema(_)));

        let examples = vec![Example::new("a", "q", "ctx"), Example::new("a", "q", "ctx")];
        let err = validate_eval_set(&examples, &[feature("a", vec![1])]).unwrap_err();
        assert!(matches!(err, BenchError::Schema(_)));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = FeatureSetLoader::new(vec![], vec![], "answers", 0, None).unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
    }
}
