//! OpenAI-compatible chat completions client.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{ChatRequest, TextModel};
use crate::config::OpenAiConfig;
use crate::http;

pub struct OpenAiChatClient {
    client: Client,
    endpoint: String,
    model: String,
    max_retries: usize,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl OpenAiChatClient {
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        anyhow::ensure!(!config.api_key.trim().is_empty(), "missing OpenAI API key");
        let client = http::build_client(
            Some(&config.api_key),
            Duration::from_secs(config.timeout_secs),
        )?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/chat/completions",
                config.base_url.trim_end_matches('/')
            ),
            model: config.chat_model.clone(),
            max_retries: config.max_retries.max(1),
        })
    }

    fn request_body(&self, request: &ChatRequest) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
            "stream": false
        });
        if request.json_response {
            body["response_format"] = json!({"type": "json_object"});
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }
}

#[async_trait]
impl TextModel for OpenAiChatClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let body = self.request_body(request);
        let prompt_chars: usize = request.messages.iter().map(|m| m.content.len()).sum();
        tracing::debug!(
            model = %self.model,
            messages = request.messages.len(),
            prompt_chars = prompt_chars,
            approx_tokens = prompt_chars / 4,
            "Sending chat completion"
        );

        let mut attempt = 0usize;
        let response = loop {
            let sent = self.client.post(&self.endpoint).json(&body).send().await;
            match sent {
                Ok(resp) if resp.status().is_success() => break resp,
                Ok(resp) => {
                    let status = resp.status();
                    let error = resp.text().await.unwrap_or_default();
                    if http::should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        tracing::warn!(status = %status, attempt = attempt, "Retrying chat completion");
                        tokio::time::sleep(http::retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(anyhow!("API error ({}): {}", status, error));
                }
                Err(e) => {
                    if http::is_retryable_error(&e) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        tracing::warn!(error = %e, attempt = attempt, "Retrying chat completion");
                        tokio::time::sleep(http::retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(e).with_context(|| format!("request to {} failed", self.endpoint));
                }
            }
        };

        let parsed: ChatCompletionResponse =
            http::parse_json_response(response, &self.endpoint).await?;
        if let Some(usage) = &parsed.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Chat completion usage"
            );
        }

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("chat completion returned no content"))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
