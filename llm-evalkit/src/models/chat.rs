//! Chat completion client for checkpoints served behind an OpenAI-compatible API

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Instant;

use super::{GenerationConfig, ModelAdapter, ModelError, ModelResult, ModelSettings};
use crate::benchmarks::PromptBundle;

const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/v1";
const API_URL_ENV: &str = "EVALKIT_API_URL";
const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Chat model reached through `{api_url}/chat/completions`
pub struct ChatCompletionModel {
    model_id: String,
    revision: String,
    api_url: String,
    api_key: Option<String>,
    chat_template: Option<String>,
    http_client: Client,
}

impl ChatCompletionModel {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            revision: "master".to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            chat_template: None,
            http_client: Client::new(),
        }
    }

    /// Build from model settings, falling back to `EVALKIT_API_URL` and
    /// `OPENAI_API_KEY` for endpoint details the config leaves out.
    pub fn from_settings(settings: ModelSettings) -> ModelResult<Self> {
        if settings.model_id.trim().is_empty() {
            return Err(ModelError::Config("model id is empty".to_string()));
        }

        let api_url = settings
            .args
            .api_url
            .or_else(|| std::env::var(API_URL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_key = settings
            .args
            .api_key
            .or_else(|| std::env::var(API_KEY_ENV).ok());

        let mut model = Self::new(settings.model_id)
            .with_api_url(api_url)
            .with_revision(settings.args.revision);
        model.api_key = api_key;
        model.chat_template = settings.chat_template;
        Ok(model)
    }

    /// Set custom base URL
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    fn build_request(&self, input: &PromptBundle, config: &GenerationConfig) -> ChatRequest {
        let mut messages = Vec::with_capacity(input.data.len() + 1);
        if let Some(system) = &input.system_prompt {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        for prompt in &input.data {
            messages.push(ChatMessage {
                role: "user".to_string(),
                content: prompt.clone(),
            });
        }

        // Greedy decoding unless sampling is requested
        let (temperature, top_k) = if config.do_sample {
            (config.temperature, Some(config.top_k))
        } else {
            (0.0, None)
        };

        ChatRequest {
            model: self.model_id.clone(),
            messages,
            max_tokens: config.max_new_tokens,
            temperature,
            top_p: config.top_p,
            top_k,
            n: config.num_return_sequences.max(1),
            seed: config.seed,
            chat_template: self.chat_template.clone(),
            extra: config.extra.clone(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    /// Honored by servers that accept a per-request template (e.g. vLLM)
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_template: Option<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl ModelAdapter for ChatCompletionModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn revision(&self) -> &str {
        &self.revision
    }

    async fn generate(
        &self,
        input: &PromptBundle,
        config: &GenerationConfig,
    ) -> ModelResult<Vec<String>> {
        let start = Instant::now();
        let body = self.build_request(input, config);

        let mut request = self
            .http_client
            .post(format!("{}/chat/completions", self.api_url))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiError>(&body) {
                Ok(error) => error.error.message,
                Err(_) => format!("HTTP {}: {}", status.as_u16(), body),
            };

            if status == 401 || status == 403 {
                return Err(ModelError::Config(format!(
                    "auth error ({}): {}",
                    status.as_u16(),
                    message
                )));
            }

            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: ChatResponse = response.json().await?;
        if api_response.choices.is_empty() {
            return Err(ModelError::Parse("No choices in response".to_string()));
        }

        tracing::debug!(
            "{} answered in {}ms",
            self.model_id,
            start.elapsed().as_millis()
        );

        Ok(api_response
            .choices
            .into_iter()
            .map(|choice| choice.message.content.unwrap_or_default())
            .collect())
    }
}
