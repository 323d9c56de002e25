//! Extractive question-answering benchmark library
//!
//! Measures answer quality (F1 / exact match) and inference latency of a
//! question-answering engine.

pub mod benchmark;
pub mod config;
pub mod dataset;
pub mod engines;
pub mod error;
pub mod executor;
pub mod postprocess;
pub mod resource_monitor;
pub mod run_log;
