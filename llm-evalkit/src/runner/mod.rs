//! Evaluation execution engine

pub mod controller;
pub mod evaluator;
pub mod outputs;

pub use controller::{run_task, BackendRunner, RunOutput, Runner, TaskInput};
pub use evaluator::{
    ConsoleProgress, EvalOptions, EvalPhase, Evaluator, NoOpProgress, ProgressCallback,
};
pub use outputs::OutputsStructure;

use crate::config::{ConfigError, EvalBackend};
use crate::models::ModelError;

/// Error types for running tasks
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Model setup failed: {0}")]
    Model(#[from] ModelError),

    #[error("Backend {0} is not available; register a runner for it")]
    BackendUnavailable(EvalBackend),

    #[error("Backend {0} is not implemented")]
    BackendNotImplemented(EvalBackend),

    #[error("Backend failed: {0}")]
    Backend(String),
}

impl RunError {
    /// Fatal errors abort a whole batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RunError::Config(_))
    }
}
