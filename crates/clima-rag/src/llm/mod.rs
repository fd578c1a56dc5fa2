//! Text model seam shared by model-based intent extraction and answer generation.

pub mod openai;
pub mod prompt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, Role};

pub use openai::OpenAiChatClient;
pub use prompt::SYSTEM_PROMPT;

/// Marker placed before the retrieved context in generation requests.
pub const CONTEXT_HEADER: &str = "CONTEXTO TÉCNICO:\n";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    /// Ask the provider for a JSON object response.
    #[serde(default)]
    pub json_response: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>, temperature: f32) -> Self {
        Self {
            messages,
            temperature,
            json_response: false,
            max_tokens: None,
        }
    }

    pub fn json(mut self) -> Self {
        self.json_response = true;
        self
    }
}

#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Generation request: system prompt, retrieved context, the most recent
/// `history_limit` messages, then the new user message.
pub fn generation_request(
    system_prompt: &str,
    context: &str,
    history: &[ChatMessage],
    user_message: &str,
    history_limit: usize,
    temperature: f32,
) -> ChatRequest {
    let recent = &history[history.len().saturating_sub(history_limit)..];

    let mut messages = Vec::with_capacity(recent.len() + 3);
    messages.push(ChatMessage::system(system_prompt));
    messages.push(ChatMessage::system(format!("{}{}", CONTEXT_HEADER, context)));
    messages.extend(recent.iter().filter(|m| m.role != Role::System).cloned());
    messages.push(ChatMessage::user(user_message));

    ChatRequest::new(messages, temperature)
}
