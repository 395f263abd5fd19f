//! LLM evaluation harness
//!
//! Runs language models against registered benchmarks and reports scores.
//!
//! # Features
//!
//! - Benchmark registry with built-in GPQA, ARC and GSM8K adapters
//! - Bilingual answer extraction from free-form model output
//! - OpenAI-compatible chat endpoints, in-process custom models and a dry-run stub
//! - Resumable runs with per-subset checkpoints and atomic writes
//! - YAML/JSON task configs, single tasks or batches
//!
//! # Example
//!
//! ```no_run
//! use llm_evalkit::{config::TaskConfig, reporting::print_console_report, runner::Runner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TaskConfig::new("qwen/Qwen2-0.5B-Instruct", &["gsm8k", "arc"])
//!         .with_limit(10)
//!         .with_dry_run(true);
//!
//!     let output = Runner::new().run_task(config).await?;
//!     for results in output.into_vec() {
//!         print_console_report(&results);
//!     }
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod benchmarks;
pub mod config;
pub mod datasets;
pub mod models;
pub mod reporting;
pub mod runner;

pub use config::{ConfigError, TaskConfig};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::analysis::{Metric, ResponseParser, Score};
    pub use crate::benchmarks::{
        AdapterSettings, Benchmark, BenchmarkRegistry, DataAdapter, PromptBundle, Record,
    };
    pub use crate::config::{
        ConfigError, DatasetArgs, EvalBackend, EvalType, GenerationConfig, ModelArgs, ModelSpec,
        TaskConfig,
    };
    pub use crate::datasets::{DatasetSource, LocalDatasetSource, MemoryDatasetSource};
    pub use crate::models::{CustomModel, ModelAdapter, ModelError, ModelResult};
    pub use crate::reporting::{print_console_report, DatasetReport, EvalResults, SubsetReport};
    pub use crate::runner::{run_task, RunError, RunOutput, Runner, TaskInput};
}
