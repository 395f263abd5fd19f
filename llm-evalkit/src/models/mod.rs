//! Model adapters: the boundary between prompts and generated text

pub mod chat;
pub mod custom;
pub mod dummy;

use std::sync::Arc;

use async_trait::async_trait;

use crate::benchmarks::PromptBundle;
pub use crate::config::{GenerationConfig, ModelArgs};

pub use chat::ChatCompletionModel;
pub use custom::{CustomModel, CustomModelAdapter};
pub use dummy::DummyChatModel;

/// Error types for model operations
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Prediction failed: {0}")]
    Predict(String),
}

pub type ModelResult<T> = Result<T, ModelError>;

/// Everything a model adapter factory needs to build an adapter.
#[derive(Debug, Clone, Default)]
pub struct ModelSettings {
    pub model_id: String,
    pub args: ModelArgs,
    pub chat_template: Option<String>,
}

/// Turns a prompt bundle into one or more completions.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Identifier used in output paths and reports
    fn model_id(&self) -> &str;

    fn revision(&self) -> &str;

    /// Generate `config.num_return_sequences` completions for `input`.
    async fn generate(
        &self,
        input: &PromptBundle,
        config: &GenerationConfig,
    ) -> ModelResult<Vec<String>>;
}

/// Builds the model adapter for a benchmark.
pub type ModelAdapterFactory =
    Arc<dyn Fn(ModelSettings) -> ModelResult<Arc<dyn ModelAdapter>> + Send + Sync>;

/// Factory for checkpoint-backed chat models served behind an OpenAI-compatible API.
pub fn chat_model_factory() -> ModelAdapterFactory {
    Arc::new(|settings: ModelSettings| {
        let model: Arc<dyn ModelAdapter> = Arc::new(ChatCompletionModel::from_settings(settings)?);
        Ok(model)
    })
}
