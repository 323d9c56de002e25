//! QA Benchmark CLI
//!
//! Accuracy and latency benchmark for extractive question-answering engines.
//!
//! ## Quick Start
//!
//! ```bash
//! # F1 / exact match on the SQuAD validation split
//! ./qa-bench accuracy \
//!     --model ./logits/bert-large-int8.json \
//!     --dataset-name squad \
//!     --data-dir ./data \
//!     --tokenizer-dir ./bert-large-uncased \
//!     --batch-size 8
//!
//! # Latency percentiles and throughput at a fixed shape
//! ./qa-bench performance \
//!     --engine synthetic \
//!     --batch-size 1 --seq-len 384 \
//!     --iteration 100 --warm-up 10
//!
//! # Check the dataset and tokenizer without running an engine
//! ./qa-bench validate-data --data-dir ./data --tokenizer-dir ./bert-large-uncased
//! ```
//!
//! ## Configuration
//!
//! Post-processing, feature windowing and synthetic-engine settings are read
//! from `bench.toml` when present. See `bench.toml` for an example.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use qa_bench::benchmark::SquadMetric;
use qa_bench::config::{BenchConfig, DatasetKind, ModelInfo, QuantizationMode};
use qa_bench::dataset::{load_squad, squad, DataLoader, SquadOptions};
use qa_bench::engines::{EngineConfig, InferenceEngine, ReplayBackend, SyntheticBackend};
use qa_bench::executor::{Executor, PerformanceParams};
use qa_bench::postprocess::SpanPostProcessor;
use qa_bench::resource_monitor::{ResourceMonitor, ResourceUsage};
use qa_bench::run_log::RunLog;

/// Engine backend for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum EngineArg {
    /// Serve logits recorded from a compiled graph
    #[default]
    Replay,
    /// Deterministic logits derived from the input tokens
    Synthetic,
}

#[derive(Parser)]
#[command(name = "qa-bench")]
#[command(about = "Accuracy and latency benchmark for extractive QA engines")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by both workflows
#[derive(Args)]
struct RunArgs {
    /// Model artifact (logit recording for the replay engine)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Engine backend
    #[arg(short, long, value_enum, default_value = "replay")]
    engine: EngineArg,

    /// Log file for this run
    #[arg(short, long)]
    log_file: PathBuf,

    /// Batch size
    #[arg(short, long, default_value = "1")]
    batch_size: usize,

    /// Path to bench config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output file for the report (JSON)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate F1 and exact match over a labeled dataset
    Accuracy {
        #[command(flatten)]
        run: RunArgs,

        /// Cap on evaluated examples
        #[arg(long)]
        max_eval_samples: Option<usize>,

        /// Dataset: squad or squad_v2
        #[arg(long, default_value = "squad")]
        dataset_name: String,

        /// Directory holding the validation jsonl
        #[arg(long)]
        data_dir: PathBuf,

        /// Directory holding tokenizer.json
        #[arg(long)]
        tokenizer_dir: PathBuf,
    },

    /// Measure latency percentiles and throughput on synthetic batches
    Performance {
        #[command(flatten)]
        run: RunArgs,

        /// Sequence length
        #[arg(long, default_value = "384")]
        seq_len: usize,

        /// Timed iterations, including warm-up
        #[arg(long, default_value = "100")]
        iteration: usize,

        /// Leading iterations excluded from statistics
        #[arg(long, default_value = "10")]
        warm_up: usize,
    },

    /// Load a dataset and report example and feature counts
    ValidateData {
        /// Dataset: squad or squad_v2
        #[arg(long, default_value = "squad")]
        dataset_name: String,

        #[arg(long)]
        data_dir: PathBuf,

        #[arg(long)]
        tokenizer_dir: PathBuf,

        #[arg(long)]
        max_eval_samples: Option<usize>,

        /// Path to bench config file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List datasets and quantization modes
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Accuracy {
            run,
            max_eval_samples,
            dataset_name,
            data_dir,
            tokenizer_dir,
        } => {
            run_accuracy(&run, max_eval_samples, &dataset_name, data_dir, tokenizer_dir).await?;
        }

        Commands::Performance {
            run,
            seq_len,
            iteration,
            warm_up,
        } => {
            let params = PerformanceParams {
                batch_size: run.batch_size,
                seq_len,
                iteration,
                warm_up,
            };
            run_performance(&run, params).await?;
        }

        Commands::ValidateData {
            dataset_name,
            data_dir,
            tokenizer_dir,
            max_eval_samples,
            config,
        } => {
            validate_data(&dataset_name, data_dir, tokenizer_dir, max_eval_samples, config.as_deref())?;
        }

        Commands::List => list_modes(),
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<BenchConfig> {
    match path {
        Some(path) => BenchConfig::load(path),
        None => BenchConfig::load_default(),
    }
}

/// Build the engine selected on the command line
fn build_engine(run: &RunArgs, config: &BenchConfig) -> Result<Arc<dyn InferenceEngine>> {
    let engine: Arc<dyn InferenceEngine> = match run.engine {
        EngineArg::Replay => {
            let model = run
                .model
                .as_deref()
                .context("--model is required for the replay engine")?;
            Arc::new(ReplayBackend::open(model)?)
        }
        EngineArg::Synthetic => Arc::new(SyntheticBackend::from_config(&config.synthetic)),
    };
    Ok(engine)
}

/// Log engine identity and model metadata at the start of a run
fn log_engine(log: &RunLog, engine: &dyn InferenceEngine, model: &ModelInfo) {
    log.info(format!("Run {} with engine {}", log.run_id(), engine.name()));
    if let Some(name) = &model.name {
        log.info(format!("Model: {}", name));
    }
    match model.quantization {
        Some(mode) => log.info(format!("Quantization: {} - {}", mode.name(), mode.description())),
        None => log.info("Quantization: none"),
    }
}

async fn run_accuracy(
    run: &RunArgs,
    max_eval_samples: Option<usize>,
    dataset_name: &str,
    data_dir: PathBuf,
    tokenizer_dir: PathBuf,
) -> Result<()> {
    let config = load_config(run.config.as_deref())?;
    let dataset = DatasetKind::parse(dataset_name)?;
    let log = RunLog::to_file(&run.log_file)?;

    let mut monitor = ResourceMonitor::new();
    monitor.snapshot_baseline();
    let engine = build_engine(run, &config)?;
    monitor.record_engine_loaded(engine.load_duration());
    log_engine(&log, engine.as_ref(), &config.model);

    let loader = load_squad(&SquadOptions {
        dataset,
        data_dir,
        tokenizer_dir,
        batch_size: run.batch_size,
        max_eval_samples,
        features: config.features.clone(),
    })?;

    let executor = Executor::new(engine).with_postprocessor(SpanPostProcessor::new(config.postprocess));
    let metric = SquadMetric::new(dataset);

    let sampling = monitor.start_sampling();
    let result = executor.accuracy(&log, &loader, &metric).await;
    drop(sampling);
    let usage = monitor.finalize();

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            log.error(format!("Accuracy run failed: {:#}", e));
            return Err(e);
        }
    };
    log.info(usage.format_summary());

    if let Some(output) = &run.output {
        write_report(output, "accuracy", &log, executor.engine().config(), &config.model, &report, usage)?;
    }
    log.flush()
}

async fn run_performance(run: &RunArgs, params: PerformanceParams) -> Result<()> {
    let config = load_config(run.config.as_deref())?;
    let log = RunLog::to_file(&run.log_file)?;

    let mut monitor = ResourceMonitor::new();
    monitor.snapshot_baseline();
    let engine = build_engine(run, &config)?;
    monitor.record_engine_loaded(engine.load_duration());
    log_engine(&log, engine.as_ref(), &config.model);

    let executor = Executor::new(engine).with_seed(config.synthetic.seed);

    let sampling = monitor.start_sampling();
    let result = executor.performance(&log, &params).await;
    drop(sampling);
    let usage = monitor.finalize();

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            log.error(format!("Performance run failed: {:#}", e));
            return Err(e);
        }
    };
    log.info(usage.format_summary());
    println!("{}", report.latency.format_summary());

    if let Some(output) = &run.output {
        write_report(output, "performance", &log, executor.engine().config(), &config.model, &report, usage)?;
    }
    log.flush()
}

/// Save a workflow report as JSON
fn write_report<R: Serialize>(
    output: &Path,
    workflow: &str,
    log: &RunLog,
    engine: &EngineConfig,
    model: &ModelInfo,
    result: &R,
    resources: ResourceUsage,
) -> Result<()> {
    #[derive(Serialize)]
    struct ReportOutput<'a, R: Serialize> {
        timestamp: String,
        run_id: &'a str,
        workflow: &'a str,
        engine: &'a EngineConfig,
        model: &'a ModelInfo,
        result: &'a R,
        resources: ResourceUsage,
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let report = ReportOutput {
        timestamp: chrono::Utc::now().to_rfc3339(),
        run_id: log.run_id(),
        workflow,
        engine,
        model,
        result,
        resources,
    };

    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(output, &json).with_context(|| format!("Failed to write report: {:?}", output))?;
    println!("\nResults saved to {:?}", output);
    Ok(())
}

/// Load a dataset and print its shape
fn validate_data(
    dataset_name: &str,
    data_dir: PathBuf,
    tokenizer_dir: PathBuf,
    max_eval_samples: Option<usize>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let dataset = DatasetKind::parse(dataset_name)?;
    println!("Validating {} under {:?}...", dataset.name(), data_dir);

    let loader = load_squad(&SquadOptions {
        dataset,
        data_dir,
        tokenizer_dir,
        batch_size: 1,
        max_eval_samples,
        features: config.features.clone(),
    })?;

    let eval = loader.eval_set();
    let stats = squad::stats(eval.examples, eval.features);

    println!("✓ Valid dataset");
    println!("  Answer column: {}", eval.answer_column);
    println!("  Examples: {}", stats.examples);
    println!("  Features: {}", stats.features);
    println!("  Unanswerable: {}", stats.unanswerable);
    println!("  Split into multiple windows: {}", stats.windowed_examples);
    println!(
        "  Window: max_seq_length={}, doc_stride={}",
        config.features.max_seq_length, config.features.doc_stride
    );

    Ok(())
}

fn list_modes() {
    println!("DATASETS:");
    println!("─────────────────────────────────────────────────────────────────");
    for dataset in [DatasetKind::Squad, DatasetKind::SquadV2] {
        let note = if dataset.allows_no_answer() {
            "unanswerable questions allowed"
        } else {
            "every question answerable"
        };
        println!("  {:30} {}", dataset.name(), note);
    }

    println!("\nQUANTIZATION MODES:");
    println!("─────────────────────────────────────────────────────────────────");
    for mode in QuantizationMode::all() {
        println!("  {:30} {}", mode.name(), mode.description());
    }

    println!("\nCONFIGURATION:");
    println!("─────────────────────────────────────────────────────────────────");
    println!("  Runs read bench.toml when present. Example:");
    println!();
    println!("  [postprocess]");
    println!("  n_best_size = 20");
    println!("  max_answer_length = 384");
    println!();
    println!("  [model]");
    println!("  quantization = \"post_training_static_quant\"");
}
