//! Examples, features and predictions
//!
//! An `Example` is one question over one context. A `Feature` is one tokenized
//! window of an example; long contexts produce several overlapping features.

use serde::{Deserialize, Serialize};

/// Reference answers of an example (SQuAD column layout)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answers {
    pub text: Vec<String>,
    /// Character offset of each answer into the context
    pub answer_start: Vec<usize>,
}

impl Answers {
    pub fn single(text: impl Into<String>, answer_start: usize) -> Self {
        Self {
            text: vec![text.into()],
            answer_start: vec![answer_start],
        }
    }

    /// Whether the example is unanswerable
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// One evaluation question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub id: String,
    #[serde(default)]
    pub question: String,
    pub context: String,
    #[serde(default)]
    pub answers: Answers,
}

impl Example {
    pub fn new(id: impl Into<String>, question: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            context: context.into(),
            answers: Answers::default(),
        }
    }

    pub fn with_answers(mut self, answers: Answers) -> Self {
        self.answers = answers;
        self
    }
}

/// One tokenized window of an example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Id of the owning example
    pub example_id: String,
    pub input_ids: Vec<i32>,
    pub attention_mask: Vec<i32>,
    pub token_type_ids: Vec<i32>,
    /// Character range in the context per token; `None` outside the context
    pub offset_mapping: Vec<Option<(usize, usize)>>,
}

impl Feature {
    /// Build a feature that carries only offsets (inputs zeroed)
    pub fn with_offsets(example_id: impl Into<String>, offset_mapping: Vec<Option<(usize, usize)>>) -> Self {
        let len = offset_mapping.len();
        Self {
            example_id: example_id.into(),
            input_ids: vec![0; len],
            attention_mask: vec![1; len],
            token_type_ids: vec![0; len],
            offset_mapping,
        }
    }

    pub fn len(&self) -> usize {
        self.offset_mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offset_mapping.is_empty()
    }

    /// Context character range of a token, if it maps into the context
    pub fn offset(&self, token: usize) -> Option<(usize, usize)> {
        self.offset_mapping.get(token).copied().flatten()
    }
}

/// Predicted answer for one example
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    /// Empty when the model abstains
    pub prediction_text: String,
}

/// Reference answers formatted for scoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub id: String,
    pub answers: Answers,
}

impl From<&Example> for Reference {
    fn from(example: &Example) -> Self {
        Self {
            id: example.id.clone(),
            answers: example.answers.clone(),
        }
    }
}

/// Substring of `text` by character (not byte) offsets, clamped to the text
pub fn slice_chars(text: &str, start: usize, end: usize) -> &str {
    if start >= end {
        return "";
    }
    let mut indices = text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len()));
    let Some(byte_start) = indices.nth(start) else {
        return "";
    };
    let byte_end = indices.nth(end - start - 1).unwrap_or(text.len());
    &text[byte_start..byte_end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_chars_ascii() {
        assert_eq!(slice_chars("the capital is paris", 15, 20), "paris");
        assert_eq!(slice_chars("abc", 0, 3), "abc");
        assert_eq!(slice_chars("abc", 2, 2), "");
        assert_eq!(slice_chars("abc", 5, 9), "");
    }

    #[test]
    fn test_slice_chars_multibyte() {
        let text = "Zürich liegt am See";
        assert_eq!(slice_chars(text, 0, 6), "Zürich");
        assert_eq!(slice_chars(text, 16, 19), "See");
        // End past the text is clamped
        assert_eq!(slice_chars(text, 16, 40), "See");
    }

    #[test]
    fn test_feature_offset_lookup() {
        let feature = Feature::with_offsets("q1", vec![None, Some((0, 3)), Some((4, 9))]);
        assert_eq!(feature.offset(0), None);
        assert_eq!(feature.offset(2), Some((4, 9)));
        assert_eq!(feature.offset(3), None);
        assert_eq!(feature.len(), 3);
    }
}
