//! Evaluation data
//!
//! Examples, their tokenized features, and the batches fed to the engine.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dataset::{load_squad, SquadOptions};
//!
//! let loader = load_squad(&SquadOptions {
//!     dataset: DatasetKind::Squad,
//!     data_dir: "data".into(),
//!     tokenizer_dir: "bert-large-uncased".into(),
//!     batch_size: 8,
//!     max_eval_samples: Some(1000),
//!     features: FeatureConfig::default(),
//! })?;
//! ```
//!
//! Performance runs do not read data; they draw `SyntheticBatches`.

pub mod loader;
pub mod squad;
pub mod synthetic;
pub mod types;

pub use loader::{validate_eval_set, DataLoader, EvalSet, FeatureSetLoader};
pub use squad::{load_squad, SquadOptions, SquadStats};
pub use synthetic::SyntheticBatches;
pub use types::{slice_chars, Answers, Example, Feature, Prediction, Reference};
