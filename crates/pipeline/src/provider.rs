//! The LLM capability consumed by the generation core.
//!
//! The core never knows which vendor it talks to. Infrastructure crates
//! implement [`LlmProvider`]; the composition root picks one at startup and
//! injects it as `Arc<dyn LlmProvider>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{ModelName, ProviderError};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions framing the conversation.
    System,
    /// The prompt.
    User,
    /// A previous model reply.
    Assistant,
}

/// One message in a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message author.
    pub role: ChatRole,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Everything a provider needs for one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// Model to run.
    pub model: ModelName,
    /// Conversation, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
}

/// A chat-completion endpoint.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider label for logs (e.g. `"zhipu"`).
    fn name(&self) -> &str;

    /// Runs one completion and returns the raw text of the first choice.
    ///
    /// Empty text is returned as-is; deciding whether it is usable is the
    /// caller's concern.
    async fn chat(&self, request: ChatRequest) -> Result<String, ProviderError>;
}
