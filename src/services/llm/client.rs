//! LLM Client - HTTP client for OpenAI-compatible APIs
//!
//! Uses reqwest to call chat-completion endpoints. Compatible with OpenAI,
//! Azure OpenAI, DeepSeek and other OpenAI-compatible APIs.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::models::*;
use super::LanguageModel;

/// HTTP chat-completion client.
pub struct ChatCompletionClient {
    http_client: Client,
    settings: LlmSettings,
}

impl ChatCompletionClient {
    pub fn new(settings: LlmSettings) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        Self { http_client, settings }
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionClient {
    async fn complete(&self, prompt: &str, deadline: Duration) -> Result<String, LlmError> {
        if !self.is_available() {
            return Err(LlmError::Disabled);
        }

        let chat_request = ChatCompletionRequest {
            model: self.settings.model.clone(),
            messages: vec![ChatMessage { role: "user".to_string(), content: prompt.to_string() }],
            max_tokens: Some(self.settings.max_tokens),
            temperature: Some(self.settings.temperature),
        };

        let url = format!("{}/chat/completions", self.settings.api_base.trim_end_matches('/'));

        tracing::debug!("Calling LLM API: {} with model {}", url, self.settings.model);

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.settings.api_key))
            .header("Content-Type", "application/json")
            .timeout(deadline)
            .json(&chat_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(deadline.as_secs())
                } else {
                    LlmError::ApiError(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(LlmError::RateLimited(retry_after));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::ApiError(format!("API error {}: {}", status, error_text)));
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        chat_response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| LlmError::ParseError("Empty response from LLM".to_string()))
    }

    fn is_available(&self) -> bool {
        self.settings.enabled && !self.settings.api_base.is_empty()
    }
}

/// Deterministic model for tests and offline development: replies are popped
/// from a queue; an empty queue yields an API error (exercising fallbacks).
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedModel {
    pub fn new(replies: impl IntoIterator<Item = String>) -> Self {
        Self { replies: Mutex::new(replies.into_iter().collect()) }
    }

    pub fn push(&self, reply: impl Into<String>) {
        self.replies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(reply.into());
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, _prompt: &str, _deadline: Duration) -> Result<String, LlmError> {
        self.replies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .ok_or_else(|| LlmError::ApiError("no scripted reply".to_string()))
    }

    fn is_available(&self) -> bool {
        true
    }
}
