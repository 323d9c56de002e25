//! Quality metrics for extractive question answering
//!
//! Implements SQuAD exact match and token F1 over normalized answer text.
//!
//! ## Metrics Overview
//!
//! - **Exact match**: prediction equals a reference answer after normalization
//! - **F1**: token overlap between prediction and the best-matching reference
//!
//! Both take the maximum over all reference answers of an example and are
//! reported as percentages. SQuAD v2 treats an empty reference set as "no
//! answer", matched only by an empty prediction.

use anyhow::Result;
use std::collections::{BTreeMap, HashMap};

use crate::config::DatasetKind;
use crate::dataset::{Prediction, Reference};

/// Named scores as returned by a metric
pub type MetricScores = BTreeMap<String, f64>;

/// Scores formatted predictions against formatted references
pub trait MetricService: Send + Sync {
    fn name(&self) -> &str;

    fn compute(&self, predictions: &[Prediction], references: &[Reference]) -> Result<MetricScores>;
}

/// Normalize answer text: lowercase, drop punctuation and articles, collapse whitespace
pub fn normalize_answer(text: &str) -> String {
    let lowered = text.to_lowercase();
    let no_punct: String = lowered.chars().filter(|c| !c.is_ascii_punctuation()).collect();
    no_punct
        .split_whitespace()
        .filter(|token| !matches!(*token, "a" | "an" | "the"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// 1.0 when normalized texts are equal
pub fn exact_match_score(prediction: &str, ground_truth: &str) -> f64 {
    if normalize_answer(prediction) == normalize_answer(ground_truth) {
        1.0
    } else {
        0.0
    }
}

/// Token-overlap F1 between normalized texts
///
/// If either side has no tokens, F1 is 1.0 only when both are empty.
pub fn f1_score(prediction: &str, ground_truth: &str) -> f64 {
    let prediction = normalize_answer(prediction);
    let ground_truth = normalize_answer(ground_truth);
    let pred_tokens: Vec<&str> = prediction.split_whitespace().collect();
    let gold_tokens: Vec<&str> = ground_truth.split_whitespace().collect();

    if pred_tokens.is_empty() || gold_tokens.is_empty() {
        return if pred_tokens == gold_tokens { 1.0 } else { 0.0 };
    }

    let mut gold_counts: HashMap<&str, usize> = HashMap::new();
    for token in &gold_tokens {
        *gold_counts.entry(token).or_insert(0) += 1;
    }
    let mut num_same = 0usize;
    for token in &pred_tokens {
        if let Some(count) = gold_counts.get_mut(token) {
            if *count > 0 {
                *count -= 1;
                num_same += 1;
            }
        }
    }

    if num_same == 0 {
        return 0.0;
    }
    let precision = num_same as f64 / pred_tokens.len() as f64;
    let recall = num_same as f64 / gold_tokens.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

/// Best score of `prediction` over all reference answers
fn max_over_ground_truths<F>(score: F, prediction: &str, ground_truths: &[String]) -> f64
where
    F: Fn(&str, &str) -> f64,
{
    ground_truths
        .iter()
        .map(|gt| score(prediction, gt))
        .fold(0.0, f64::max)
}

/// Per-example scores before aggregation
#[derive(Debug, Clone, Copy, PartialEq)]
struct ExampleScore {
    exact: f64,
    f1: f64,
    has_answer: bool,
}

/// SQuAD v1 / v2 metric
#[derive(Debug, Clone, Copy)]
pub struct SquadMetric {
    dataset: DatasetKind,
}

impl SquadMetric {
    pub fn new(dataset: DatasetKind) -> Self {
        Self { dataset }
    }

    fn score_examples(&self, predictions: &[Prediction], references: &[Reference]) -> Vec<ExampleScore> {
        let by_id: HashMap<&str, &str> = predictions
            .iter()
            .map(|p| (p.id.as_str(), p.prediction_text.as_str()))
            .collect();

        let no_answer = vec![String::new()];
        references
            .iter()
            .map(|reference| {
                let Some(prediction) = by_id.get(reference.id.as_str()) else {
                    tracing::warn!("Unanswered question {} will receive score 0", reference.id);
                    return ExampleScore {
                        exact: 0.0,
                        f1: 0.0,
                        has_answer: !reference.answers.is_empty(),
                    };
                };

                let has_answer = !reference.answers.is_empty();
                let golds = if has_answer || !self.dataset.allows_no_answer() {
                    &reference.answers.text
                } else {
                    &no_answer
                };
                ExampleScore {
                    exact: max_over_ground_truths(exact_match_score, prediction, golds),
                    f1: max_over_ground_truths(f1_score, prediction, golds),
                    has_answer,
                }
            })
            .collect()
    }
}

fn mean_percent<'a, I>(values: I) -> Option<(f64, usize)>
where
    I: Iterator<Item = &'a f64>,
{
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| (100.0 * sum / count as f64, count))
}

impl MetricService for SquadMetric {
    fn name(&self) -> &str {
        self.dataset.name()
    }

    fn compute(&self, predictions: &[Prediction], references: &[Reference]) -> Result<MetricScores> {
        if references.is_empty() {
            anyhow::bail!("No references to score");
        }
        let scores = self.score_examples(predictions, references);
        let mut out = MetricScores::new();

        match self.dataset {
            DatasetKind::Squad => {
                if let Some((exact, _)) = mean_percent(scores.iter().map(|s| &s.exact)) {
                    out.insert("exact_match".to_string(), exact);
                }
                if let Some((f1, _)) = mean_percent(scores.iter().map(|s| &s.f1)) {
                    out.insert("f1".to_string(), f1);
                }
            }
            DatasetKind::SquadV2 => {
                let groups = [
                    ("", None),
                    ("HasAns_", Some(true)),
                    ("NoAns_", Some(false)),
                ];
                for (prefix, filter) in groups {
                    let selected: Vec<&ExampleScore> = scores
                        .iter()
                        .filter(|s| filter.map_or(true, |has| s.has_answer == has))
                        .collect();
                    if let Some((exact, total)) = mean_percent(selected.iter().map(|s| &s.exact)) {
                        out.insert(format!("{}exact", prefix), exact);
                        out.insert(format!("{}total", prefix), total as f64);
                    }
                    if let Some((f1, _)) = mean_percent(selected.iter().map(|s| &s.f1)) {
                        out.insert(format!("{}f1", prefix), f1);
                    }
                }
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Answers;

    fn prediction(id: &str, text: &str) -> Prediction {
        Prediction {
            id: id.to_string(),
            prediction_text: text.to_string(),
        }
    }

    fn reference(id: &str, answers: &[&str]) -> Reference {
        Reference {
            id: id.to_string(),
            answers: Answers {
                text: answers.iter().map(|s| s.to_string()).collect(),
                answer_start: vec![0; answers.len()],
            },
        }
    }

    #[test]
    fn test_normalize_answer() {
        assert_eq!(normalize_answer("The  Denver Broncos!"), "denver broncos");
        assert_eq!(normalize_answer("an apple, a day"), "apple day");
        assert_eq!(normalize_answer("theory"), "theory");
    }

    #[test]
    fn test_exact_match_score() {
        assert_eq!(exact_match_score("Paris", "paris."), 1.0);
        assert_eq!(exact_match_score("in Paris", "paris"), 0.0);
    }

    #[test]
    fn test_f1_score() {
        // pred: [denver, broncos, team], gold: [denver, broncos]
        // precision 2/3, recall 1 -> f1 0.8
        assert!((f1_score("Denver Broncos team", "the Denver Broncos") - 0.8).abs() < 1e-12);
        assert_eq!(f1_score("Carolina", "Denver"), 0.0);
        assert_eq!(f1_score("", ""), 1.0);
        assert_eq!(f1_score("", "Denver"), 0.0);
    }

    #[test]
    fn test_f1_counts_repeated_tokens_once_each() {
        // pred: [a1, a1, b], gold: [a1, b] -> 2 common of 3 predicted
        let f1 = f1_score("x x y", "x y");
        assert!((f1 - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_squad_v1_scores() {
        let metric = SquadMetric::new(DatasetKind::Squad);
        let predictions = vec![prediction("1", "Denver Broncos"), prediction("2", "Carolina")];
        let references = vec![
            reference("1", &["Denver Broncos", "The Broncos"]),
            reference("2", &["Carolina Panthers"]),
        ];

        let scores = metric.compute(&predictions, &references).unwrap();
        assert_eq!(scores["exact_match"], 50.0);
        // example 2: precision 1, recall 0.5 -> f1 2/3
        let expected_f1 = 100.0 * (1.0 + 2.0 / 3.0) / 2.0;
        assert!((scores["f1"] - expected_f1).abs() < 1e-9);
        assert!(!scores.contains_key("exact"));
    }

    #[test]
    fn test_missing_prediction_scores_zero() {
        let metric = SquadMetric::new(DatasetKind::Squad);
        let references = vec![reference("1", &["x"]), reference("2", &["y"])];
        let scores = metric.compute(&[prediction("1", "x")], &references).unwrap();
        assert_eq!(scores["exact_match"], 50.0);
    }

    #[test]
    fn test_squad_v2_no_answer_groups() {
        let metric = SquadMetric::new(DatasetKind::SquadV2);
        let predictions = vec![prediction("1", "paris"), prediction("2", ""), prediction("3", "rome")];
        let references = vec![reference("1", &["Paris"]), reference("2", &[]), reference("3", &[])];

        let scores = metric.compute(&predictions, &references).unwrap();
        assert!((scores["exact"] - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(scores["total"], 3.0);
        assert_eq!(scores["HasAns_exact"], 100.0);
        assert_eq!(scores["HasAns_total"], 1.0);
        assert_eq!(scores["NoAns_exact"], 50.0);
        assert_eq!(scores["NoAns_total"], 2.0);
        assert!(!scores.contains_key("exact_match"));
    }

    #[test]
    fn test_no_references() {
        let metric = SquadMetric::new(DatasetKind::Squad);
        assert!(metric.compute(&[], &[]).is_err());
    }
}
