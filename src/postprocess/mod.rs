//! Logit post-processing
//!
//! - `spans` - start/end logits to character-level answer spans

pub mod spans;

pub use spans::SpanPostProcessor;
