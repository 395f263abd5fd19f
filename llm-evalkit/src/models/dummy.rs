//! Deterministic stand-in model for dry runs

use async_trait::async_trait;
use md5::{Digest, Md5};

use super::{GenerationConfig, ModelAdapter, ModelResult};
use crate::benchmarks::PromptBundle;

const CHOICES: [&str; 4] = ["A", "B", "C", "D"];

/// Answers every prompt with one of `A`-`D`, chosen from a hash of the prompt.
#[derive(Debug, Clone, Default)]
pub struct DummyChatModel;

impl DummyChatModel {
    pub const MODEL_ID: &'static str = "dummy";
    pub const REVISION: &'static str = "v1.0.0";

    pub fn new() -> Self {
        Self
    }

    fn pick(input: &PromptBundle) -> &'static str {
        let mut hasher = Md5::new();
        for prompt in &input.data {
            hasher.update(prompt.as_bytes());
        }
        let digest = hasher.finalize();
        CHOICES[digest[0] as usize % CHOICES.len()]
    }
}

#[async_trait]
impl ModelAdapter for DummyChatModel {
    fn model_id(&self) -> &str {
        Self::MODEL_ID
    }

    fn revision(&self) -> &str {
        Self::REVISION
    }

    async fn generate(
        &self,
        input: &PromptBundle,
        config: &GenerationConfig,
    ) -> ModelResult<Vec<String>> {
        let answer = Self::pick(input).to_string();
        Ok(vec![answer; config.num_return_sequences.max(1) as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dummy_is_deterministic() {
        let model = DummyChatModel::new();
        let input = PromptBundle {
            data: vec!["Which planet is largest?".to_string()],
            ..Default::default()
        };
        let config = GenerationConfig::default();

        let first = model.generate(&input, &config).await.unwrap();
        let second = model.generate(&input, &config).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert!(CHOICES.contains(&first[0].as_str()));
        assert_eq!(model.model_id(), "dummy");
        assert_eq!(model.revision(), "v1.0.0");
    }
}
