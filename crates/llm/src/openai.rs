//! OpenAI-compatible `/chat/completions` adapter (OpenAI, Zhipu, gateways).

use async_trait::async_trait;
use pipeline::{ChatMessage, ChatRequest, LlmProvider, ProviderError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{endpoint, send};

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
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

/// Talks to any endpoint that speaks the OpenAI chat-completions format.
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    name: &'static str,
    url: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleProvider {
    /// Creates an adapter for `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(
        client: reqwest::Client,
        name: &'static str,
        base_url: impl AsRef<str>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            name,
            url: endpoint(base_url.as_ref(), "chat/completions"),
            api_key,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ProviderError> {
        let body = CompletionRequest {
            model: request.model.as_str(),
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let mut http = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        debug!(provider = self.name, model = %request.model, "sending chat completion");
        let text = send(http).await?;
        parse_completion(&text)
    }
}

/// Extracts the first choice's message text.
pub(crate) fn parse_completion(body: &str) -> Result<String, ProviderError> {
    let response: CompletionResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::MalformedResponse {
            message: e.to_string(),
        })?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::MalformedResponse {
            message: "response contains no choices".into(),
        })?;
    Ok(choice.message.content.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use pipeline::ModelName;

    use super::*;

    #[test]
    fn first_choice_content_is_returned() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"解读"}},{"index":1,"message":{"role":"assistant","content":"other"}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "解读");
    }

    #[test]
    fn null_content_is_empty_text() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "");
    }

    #[test]
    fn missing_choices_is_malformed() {
        assert!(matches!(
            parse_completion(r#"{"choices":[]}"#),
            Err(ProviderError::MalformedResponse { .. })
        ));
        assert!(matches!(
            parse_completion("<html>bad gateway</html>"),
            Err(ProviderError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn request_body_matches_the_wire_format() {
        let messages = vec![ChatMessage::user("hello")];
        let model = ModelName::new("glm-4").unwrap();
        let body = CompletionRequest {
            model: model.as_str(),
            messages: &messages,
            temperature: 0.5,
            max_tokens: 1000,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "glm-4");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
        assert_eq!(json["max_tokens"], 1000);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let provider = OpenAiCompatibleProvider::new(
            reqwest::Client::new(),
            "openai",
            "http://127.0.0.1:9",
            Some("key".into()),
        );
        let request = ChatRequest {
            model: ModelName::new("m").unwrap(),
            messages: vec![ChatMessage::user("hi")],
            temperature: 0.1,
            max_tokens: 10,
        };
        assert!(matches!(
            provider.chat(request).await,
            Err(ProviderError::Transport { .. })
        ));
    }
}
