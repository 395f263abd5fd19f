//! User-supplied in-process models

use std::sync::Arc;

use async_trait::async_trait;

use super::{GenerationConfig, ModelAdapter, ModelResult};
use crate::benchmarks::PromptBundle;

/// A model object provided by the caller instead of a model id.
#[async_trait]
pub trait CustomModel: Send + Sync {
    fn model_id(&self) -> &str;

    /// Produce completions for the prompt turns of one example.
    async fn predict(&self, prompts: &[String], config: &GenerationConfig)
        -> ModelResult<Vec<String>>;
}

/// Adapts a [`CustomModel`] to the [`ModelAdapter`] boundary.
pub struct CustomModelAdapter {
    model: Arc<dyn CustomModel>,
}

impl CustomModelAdapter {
    pub fn new(model: Arc<dyn CustomModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl ModelAdapter for CustomModelAdapter {
    fn model_id(&self) -> &str {
        self.model.model_id()
    }

    fn revision(&self) -> &str {
        "custom"
    }

    async fn generate(
        &self,
        input: &PromptBundle,
        config: &GenerationConfig,
    ) -> ModelResult<Vec<String>> {
        self.model.predict(&input.data, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelError;

    struct Suffix;

    #[async_trait]
    impl CustomModel for Suffix {
        fn model_id(&self) -> &str {
            "suffix"
        }

        async fn predict(
            &self,
            prompts: &[String],
            _config: &GenerationConfig,
        ) -> ModelResult<Vec<String>> {
            if prompts.is_empty() {
                return Err(ModelError::Predict("no prompts".to_string()));
            }
            Ok(prompts.iter().map(|p| format!("{}: response", p)).collect())
        }
    }

    #[tokio::test]
    async fn test_adapter_forwards_prompts() {
        let adapter = CustomModelAdapter::new(Arc::new(Suffix));
        let input = PromptBundle {
            data: vec!["hello".to_string()],
            ..Default::default()
        };
        let out = adapter.generate(&input, &GenerationConfig::default()).await.unwrap();
        assert_eq!(out, vec!["hello: response".to_string()]);
        assert_eq!(adapter.model_id(), "suffix");
    }

    #[tokio::test]
    async fn test_adapter_propagates_errors() {
        let adapter = CustomModelAdapter::new(Arc::new(Suffix));
        let result = adapter
            .generate(&PromptBundle::default(), &GenerationConfig::default())
            .await;
        assert!(matches!(result, Err(ModelError::Predict(_))));
    }
}
