//! Span reconstruction from start/end logits
//!
//! Maps per-feature logits back to one character-level answer per example.
//! Logit rows are indexed by feature, not by example; an example's windows are
//! searched together and the best span across all of them wins.
//!
//! ## Search
//!
//! For each feature only the top-N start and top-N end positions are paired,
//! so a feature costs O(N²) rather than O(seq_len²). A pair `(s, e)` is valid
//! when both tokens map into the context, `s ≤ e`, and the character span is
//! at most `max_answer_length` long. Its score is `start[s] + end[e]`.

use std::collections::HashMap;

use crate::config::PostProcessConfig;
use crate::dataset::{slice_chars, validate_eval_set, Example, Feature, Prediction};
use crate::error::BenchError;

/// Best span found so far for one example
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    score: f32,
    char_start: usize,
    char_end: usize,
}

impl Candidate {
    /// Keep the first-seen candidate on ties; NaN scores are dropped
    fn offer(slot: &mut Option<Candidate>, candidate: Candidate) {
        if candidate.score.is_nan() {
            return;
        }
        match slot {
            Some(best) if candidate.score <= best.score => {}
            _ => *slot = Some(candidate),
        }
    }
}

/// Converts logits into per-example predictions
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanPostProcessor {
    config: PostProcessConfig,
}

impl SpanPostProcessor {
    pub fn new(config: PostProcessConfig) -> Self {
        Self { config }
    }

    /// One prediction per example, in example order
    ///
    /// `start_logits[i]` and `end_logits[i]` belong to `features[i]`.
    pub fn process(
        &self,
        examples: &[Example],
        features: &[Feature],
        start_logits: &[Vec<f32>],
        end_logits: &[Vec<f32>],
    ) -> Result<Vec<Prediction>, BenchError> {
        if features.len() != start_logits.len() || features.len() != end_logits.len() {
            return Err(BenchError::schema(format!(
                "{} features but {} start and {} end logit rows",
                features.len(),
                start_logits.len(),
                end_logits.len()
            )));
        }
        validate_eval_set(examples, features)?;

        let mut features_per_example: HashMap<&str, Vec<usize>> = HashMap::with_capacity(examples.len());
        for (i, feature) in features.iter().enumerate() {
            features_per_example
                .entry(feature.example_id.as_str())
                .or_default()
                .push(i);
        }

        let mut predictions = Vec::with_capacity(examples.len());
        for example in examples {
            let owned = features_per_example
                .get(example.id.as_str())
                .ok_or_else(|| BenchError::schema(format!("example '{}' has no features", example.id)))?;

            let text = self.predict_example(example, owned, features, start_logits, end_logits);
            predictions.push(Prediction {
                id: example.id.clone(),
                prediction_text: text,
            });
        }

        Ok(predictions)
    }

    fn predict_example(
        &self,
        example: &Example,
        owned: &[usize],
        features: &[Feature],
        start_logits: &[Vec<f32>],
        end_logits: &[Vec<f32>],
    ) -> String {
        let context_chars = example.context.chars().count();
        let n_best = self.config.n_best_size;

        let mut best: Option<Candidate> = None;
        let mut fallback: Option<Candidate> = None;
        let mut min_null_score: Option<f32> = None;

        for &fi in owned {
            let feature = &features[fi];
            let start = &start_logits[fi];
            let end = &end_logits[fi];

            if let (Some(s0), Some(e0)) = (start.first(), end.first()) {
                let null_score = s0 + e0;
                min_null_score = Some(min_null_score.map_or(null_score, |m| m.min(null_score)));
            }

            // Offsets past the context are treated like unmapped tokens
            let offset = |token: usize| feature.offset(token).filter(|&(_, e)| e <= context_chars);

            let start_indexes = top_n_indices(start, n_best);
            let end_indexes = top_n_indices(end, n_best);

            for &s in &start_indexes {
                let Some((s_char, s_char_end)) = offset(s) else { continue };
                for &e in &end_indexes {
                    let Some((e_char_start, e_char)) = offset(e) else { continue };
                    let score = start[s] + end[e];

                    if s <= e && s_char <= e_char && e_char - s_char <= self.config.max_answer_length {
                        Candidate::offer(&mut best, Candidate { score, char_start: s_char, char_end: e_char });
                    } else if best.is_none() {
                        Candidate::offer(
                            &mut fallback,
                            Candidate {
                                score,
                                char_start: s_char.min(e_char_start),
                                char_end: s_char_end.max(e_char),
                            },
                        );
                    }
                }
            }
        }

        let chosen = match best.or(fallback) {
            Some(candidate) => candidate,
            None => {
                tracing::warn!("No token of example '{}' maps into its context, predicting empty", example.id);
                return String::new();
            }
        };
        if best.is_none() {
            tracing::debug!("Example '{}' has no valid span, using unconstrained best", example.id);
        }

        if self.config.null_answer_enabled() {
            if let Some(null_score) = min_null_score {
                if chosen.score - null_score < self.config.null_score_threshold {
                    return String::new();
                }
            }
        }

        slice_chars(&example.context, chosen.char_start, chosen.char_end).to_string()
    }
}

/// Positions of the `n` largest values, highest first; ties keep the lower index first
fn top_n_indices(values: &[f32], n: usize) -> Vec<usize> {
    let mut indexes: Vec<usize> = (0..values.len()).collect();
    indexes.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    indexes.truncate(n);
    indexes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Answers;

    const CONTEXT: &str = "city paris is big";

    /// [CLS], five context tokens, two padding; tokens 2 and 3 cover "paris"
    fn paris_offsets() -> Vec<Option<(usize, usize)>> {
        vec![
            None,
            Some((0, 4)),
            Some((5, 7)),
            Some((7, 10)),
            Some((11, 13)),
            Some((14, 17)),
            None,
            None,
        ]
    }

    fn peaked(len: usize, peak: usize) -> Vec<f32> {
        (0..len).map(|i| if i == peak { 10.0 } else { 0.0 }).collect()
    }

    fn processor(max_answer_length: usize, null_score_threshold: f32) -> SpanPostProcessor {
        SpanPostProcessor::new(PostProcessConfig {
            n_best_size: 20,
            max_answer_length,
            null_score_threshold,
        })
    }

    #[test]
    fn test_top_n_indices_stable_on_ties() {
        assert_eq!(top_n_indices(&[1.0, 3.0, 3.0, 2.0], 3), vec![1, 2, 3]);
        assert_eq!(top_n_indices(&[1.0, 2.0], 5), vec![1, 0]);
        assert!(top_n_indices(&[], 5).is_empty());
    }

    #[test]
    fn test_identity_offsets_return_exact_substring() {
        let context = "abcdefghij";
        let offsets: Vec<_> = (0..10).map(|i| Some((i, i + 1))).collect();
        let examples = vec![Example::new("e", "q", context)];
        let features = vec![Feature::with_offsets("e", offsets)];

        let predictions = processor(384, 0.0)
            .process(&examples, &features, &[peaked(10, 3)], &[peaked(10, 6)])
            .unwrap();

        assert_eq!(predictions[0].prediction_text, "defg");
        assert_eq!(predictions[0].prediction_text, &context[3..7]);
    }

    #[test]
    fn test_two_examples_predict_paris() {
        let examples = vec![
            Example::new("a", "capital?", CONTEXT).with_answers(Answers::single("paris", 5)),
            Example::new("b", "capital?", CONTEXT).with_answers(Answers::single("paris", 5)),
        ];
        let features = vec![
            Feature::with_offsets("a", paris_offsets()),
            Feature::with_offsets("b", paris_offsets()),
        ];
        let start = vec![peaked(8, 2), peaked(8, 2)];
        let end = vec![peaked(8, 3), peaked(8, 3)];

        let predictions = processor(384, 0.0).process(&examples, &features, &start, &end).unwrap();

        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0], Prediction { id: "a".into(), prediction_text: "paris".into() });
        assert_eq!(predictions[1], Prediction { id: "b".into(), prediction_text: "paris".into() });
    }

    #[test]
    fn test_null_score_produces_empty_prediction() {
        let examples = vec![Example::new("a", "q", CONTEXT)];
        let features = vec![Feature::with_offsets("a", paris_offsets())];
        // Null score 20 + 20 = 40, best span 10 + 10 = 20
        let mut start = peaked(8, 2);
        let mut end = peaked(8, 3);
        start[0] = 20.0;
        end[0] = 20.0;

        let predictions = processor(384, 1.0)
            .process(&examples, &features, &[start.clone()], &[end.clone()])
            .unwrap();
        assert_eq!(predictions[0].prediction_text, "");

        // Threshold 0 disables no-answer predictions
        let predictions = processor(384, 0.0).process(&examples, &features, &[start], &[end]).unwrap();
        assert_eq!(predictions[0].prediction_text, "paris");
    }

    #[test]
    fn test_null_score_uses_minimum_across_features() {
        let examples = vec![Example::new("a", "q", CONTEXT)];
        let features = vec![
            Feature::with_offsets("a", paris_offsets()),
            Feature::with_offsets("a", paris_offsets()),
        ];
        let mut high_null_start = peaked(8, 2);
        let mut high_null_end = peaked(8, 3);
        high_null_start[0] = 50.0;
        high_null_end[0] = 50.0;
        // Second window has null score 0, so the span (20) clears threshold 1
        let start = vec![high_null_start, peaked(8, 2)];
        let end = vec![high_null_end, peaked(8, 3)];

        let predictions = processor(384, 1.0).process(&examples, &features, &start, &end).unwrap();
        assert_eq!(predictions[0].prediction_text, "paris");
    }

    #[test]
    fn test_best_span_across_windows() {
        let context = "alpha beta gamma delta";
        let examples = vec![Example::new("a", "q", context)];
        // Window 1 covers "alpha beta", window 2 covers "gamma delta"
        let features = vec![
            Feature::with_offsets("a", vec![None, Some((0, 5)), Some((6, 10))]),
            Feature::with_offsets("a", vec![None, Some((11, 16)), Some((17, 22))]),
        ];
        let start = vec![vec![0.0, 3.0, 1.0], vec![0.0, 1.0, 6.0]];
        let end = vec![vec![0.0, 1.0, 3.0], vec![0.0, 0.0, 6.0]];

        let predictions = processor(384, 0.0).process(&examples, &features, &start, &end).unwrap();
        assert_eq!(predictions[0].prediction_text, "delta");
    }

    #[test]
    fn test_ties_keep_first_candidate() {
        let context = "one two";
        let examples = vec![Example::new("a", "q", context)];
        let features = vec![
            Feature::with_offsets("a", vec![None, Some((0, 3))]),
            Feature::with_offsets("a", vec![None, Some((4, 7))]),
        ];
        let row = vec![0.0, 5.0];
        let start = vec![row.clone(), row.clone()];
        let end = vec![row.clone(), row];

        let predictions = processor(384, 0.0).process(&examples, &features, &start, &end).unwrap();
        assert_eq!(predictions[0].prediction_text, "one");
    }

    #[test]
    fn test_max_answer_length_rejects_long_span() {
        let examples = vec![Example::new("a", "q", CONTEXT)];
        let features = vec![Feature::with_offsets("a", paris_offsets())];
        // Best pair spans "city paris is big" (17 chars); "city" alone scores next
        let start = vec![vec![0.0, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]];
        let end = vec![vec![0.0, 4.0, 0.0, 0.0, 0.0, 9.0, 0.0, 0.0]];

        let predictions = processor(384, 0.0).process(&examples, &features, &start, &end).unwrap();
        assert_eq!(predictions[0].prediction_text, "city paris is big");

        let predictions = processor(5, 0.0).process(&examples, &features, &start, &end).unwrap();
        assert_eq!(predictions[0].prediction_text, "city");
    }

    #[test]
    fn test_degenerate_offsets_fall_back_to_unconstrained_best() {
        let examples = vec![Example::new("a", "q", CONTEXT)];
        let features = vec![Feature::with_offsets("a", paris_offsets())];
        // Every token is longer than one character, so no span is valid
        let start = vec![vec![0.0, -9.0, -9.0, -9.0, -9.0, 10.0, 0.0, 0.0]];
        let end = vec![vec![0.0, 10.0, -9.0, -9.0, -9.0, -9.0, 0.0, 0.0]];

        let predictions = processor(1, 0.0).process(&examples, &features, &start, &end).unwrap();
        assert_eq!(predictions[0].prediction_text, "city paris is big");
    }

    #[test]
    fn test_unmapped_feature_predicts_empty() {
        let examples = vec![Example::new("a", "q", CONTEXT)];
        let features = vec![Feature::with_offsets("a", vec![None; 4])];
        let predictions = processor(384, 0.0)
            .process(&examples, &features, &[vec![1.0; 4]], &[vec![1.0; 4]])
            .unwrap();
        assert_eq!(predictions[0].prediction_text, "");
    }

    #[test]
    fn test_feature_logit_count_mismatch() {
        let examples = vec![Example::new("a", "q", CONTEXT)];
        let features = vec![Feature::with_offsets("a", paris_offsets())];
        let err = processor(384, 0.0)
            .process(&examples, &features, &[peaked(8, 2), peaked(8, 2)], &[peaked(8, 3)])
            .unwrap_err();
        assert!(matches!(err, BenchError::Schema(_)));
    }

    #[test]
    fn test_example_without_features() {
        let examples = vec![Example::new("a", "q", CONTEXT), Example::new("b", "q", CONTEXT)];
        let features = vec![Feature::with_offsets("a", paris_offsets())];
        let err = processor(384, 0.0)
            .process(&examples, &features, &[peaked(8, 2)], &[peaked(8, 3)])
            .unwrap_err();
        assert_eq!(err, BenchError::schema("example 'b' has no features"));
    }

    #[test]
    fn test_feature_with_unknown_example() {
        let examples = vec![Example::new("a", "q", CONTEXT)];
        let features = vec![
            Feature::with_offsets("a", paris_offsets()),
            Feature::with_offsets("zzz", paris_offsets()),
        ];
        let err = processor(384, 0.0)
            .process(&examples, &features, &[peaked(8, 2), peaked(8, 2)], &[peaked(8, 3), peaked(8, 3)])
            .unwrap_err();
        assert!(matches!(err, BenchError::Schema(_)));
    }

    #[test]
    fn test_duplicate_example_ids() {
        let examples = vec![Example::new("a", "q", CONTEXT), Example::new("a", "q", CONTEXT)];
        let features = vec![Feature::with_offsets("a", paris_offsets())];
        let err = processor(384, 0.0)
            .process(&examples, &features, &[peaked(8, 2)], &[peaked(8, 3)])
            .unwrap_err();
        assert_eq!(err, BenchError::schema("duplicate example id 'a'"));
    }

    #[test]
    fn test_nan_score_never_wins() {
        let mut slot = Some(Candidate { score: 5.0, char_start: 0, char_end: 4 });
        Candidate::offer(&mut slot, Candidate { score: f32::NAN, char_start: 5, char_end: 10 });
        assert_eq!(slot.map(|c| c.char_start), Some(0));

        // NaN logit on the best start token: the finite span still wins
        let examples = vec![Example::new("a", "q", CONTEXT)];
        let features = vec![Feature::with_offsets("a", paris_offsets())];
        let mut start = peaked(8, 2);
        start[4] = f32::NAN;
        let predictions = processor(384, 0.0)
            .process(&examples, &features, &[start], &[peaked(8, 3)])
            .unwrap();
        assert_eq!(predictions[0].prediction_text, "paris");
    }
}
