use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{AppError, AppResult};
use crate::metrics::{OperationType, PerformanceMonitor};
use crate::prompts::ChatMessage;

const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct LlmRequestConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for LlmRequestConfig {
    fn default() -> Self {
        LlmRequestConfig { model: "gpt-4o-mini".to_string(), temperature: 0.2, max_tokens: 1024 }
    }
}

/// Thin chat-completions client shared by the article analyzer (C6) and
/// relevance calculator (C7). All HTTP goes through one `reqwest::Client`
/// instance owned by `AppConfig` (§4.6 implementation note); every call has
/// an explicit deadline, surfaced as `AppError::Timeout` (§5).
pub struct LlmClient {
    client: reqwest::Client,
    api_key: Option<String>,
    metrics: std::sync::Arc<PerformanceMonitor>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    max_tokens: u32,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl LlmClient {
    pub fn new(client: reqwest::Client, api_key: Option<String>, metrics: std::sync::Arc<PerformanceMonitor>) -> Self {
        LlmClient { client, api_key, metrics }
    }

    #[instrument(skip(self, messages))]
    pub async fn complete(&self, messages: &[ChatMessage], cfg: &LlmRequestConfig) -> AppResult<String> {
        let timer = self.metrics.start_operation(OperationType::LlmCall);

        let Some(api_key) = &self.api_key else {
            // No provider configured: callers fall back to deterministic
            // defaults rather than hard-failing (mirrors the embedding
            // fallback contract in §4.1/§6.4).
            timer.complete_error("no llm provider configured".to_string());
            return Err(AppError::ProviderError("no LLM provider configured".to_string()));
        };

        let call = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(api_key)
            .json(&ChatRequest { model: &cfg.model, temperature: cfg.temperature, max_tokens: cfg.max_tokens, messages })
            .send();

        let result: AppResult<String> = async {
            let resp = tokio::time::timeout(DEFAULT_LLM_TIMEOUT, call)
                .await
                .map_err(|_| AppError::Timeout(DEFAULT_LLM_TIMEOUT))??
                .error_for_status()?;
            let parsed: ChatResponse = resp.json().await?;
            parsed
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| AppError::ParseError("empty LLM response".to_string()))
        }
        .await;

        match &result {
            Ok(_) => timer.complete_success(),
            Err(e) => timer.complete_error(e.to_string()),
        }
        result
    }
}
