//! Ollama `/api/chat` adapter.

use async_trait::async_trait;
use pipeline::{ChatMessage, ChatRequest, LlmProvider, ProviderError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{endpoint, send};

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

/// A local or remote Ollama server.
pub struct OllamaProvider {
    client: reqwest::Client,
    url: String,
}

impl OllamaProvider {
    /// Creates an adapter for the server at `base_url`.
    pub fn new(client: reqwest::Client, base_url: impl AsRef<str>) -> Self {
        Self {
            client,
            url: endpoint(base_url.as_ref(), "api/chat"),
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ProviderError> {
        let body = OllamaChatRequest {
            model: request.model.as_str(),
            messages: &request.messages,
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        debug!(model = %request.model, "sending ollama chat");
        let text = send(self.client.post(&self.url).json(&body)).await?;
        parse_chat(&text)
    }
}

pub(crate) fn parse_chat(body: &str) -> Result<String, ProviderError> {
    let response: OllamaChatResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::MalformedResponse {
            message: e.to_string(),
        })?;
    if let Some(error) = response.error {
        return Err(ProviderError::MalformedResponse { message: error });
    }
    response
        .message
        .map(|m| m.content)
        .ok_or_else(|| ProviderError::MalformedResponse {
            message: "response contains no message".into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_content_is_returned() {
        let body = r#"{"model":"qwen2.5:7b","message":{"role":"assistant","content":"好"},"done":true}"#;
        assert_eq!(parse_chat(body).unwrap(), "好");
    }

    #[test]
    fn error_field_is_surfaced() {
        let body = r#"{"error":"model 'x' not found"}"#;
        match parse_chat(body) {
            Err(ProviderError::MalformedResponse { message }) => {
                assert!(message.contains("not found"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn options_carry_token_limit() {
        let messages = vec![ChatMessage::user("hi")];
        let body = OllamaChatRequest {
            model: "qwen2.5:7b",
            messages: &messages,
            stream: false,
            options: OllamaOptions {
                temperature: 0.1,
                num_predict: 256,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 256);
    }
}
