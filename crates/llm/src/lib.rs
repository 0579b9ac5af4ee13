//! Arcana LLM provider adapters.
//!
//! Implements the [`pipeline::LlmProvider`] trait for the supported
//! chat-completion endpoints. The provider is selected once, at construction,
//! from a [`ProviderConfig`]; the engine only ever sees
//! `Arc<dyn LlmProvider>`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting and response
//! parsing live here. Rate limiting, timeouts and retries are the engine's
//! concern and are not duplicated in this crate.
//!
//! | Provider | Wire format |
//! |----------|-------------|
//! | `zhipu` | OpenAI-compatible `/chat/completions` at the BigModel endpoint |
//! | `openai` | OpenAI-compatible `/chat/completions` |
//! | `ollama` | Ollama `/api/chat`, non-streaming |

use std::sync::Arc;
use std::time::Duration;

use pipeline::{LlmProvider, ProviderError};

pub mod config;
pub mod ollama;
pub mod openai;

pub use config::{ProviderConfig, ProviderKind, ProviderSetupError};
pub use ollama::OllamaProvider;
pub use openai::OpenAiCompatibleProvider;

/// Longest response body kept in a [`ProviderError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// A configured provider.
///
/// A closed set: adding a provider means adding a variant here.
pub enum Provider {
    /// Zhipu or OpenAI.
    OpenAiCompatible(OpenAiCompatibleProvider),
    /// A local Ollama server.
    Ollama(OllamaProvider),
}

impl Provider {
    /// Builds the provider described by `config`.
    ///
    /// Fails when a required credential is missing or the HTTP client cannot
    /// be created.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderSetupError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderSetupError::Client {
                message: e.to_string(),
            })?;

        let base_url = config.resolved_base_url().to_string();
        match config.kind {
            ProviderKind::Zhipu | ProviderKind::OpenAi => {
                let api_key = config
                    .api_key
                    .clone()
                    .filter(|k| !k.trim().is_empty())
                    .ok_or(ProviderSetupError::MissingApiKey {
                        provider: config.kind,
                    })?;
                Ok(Self::OpenAiCompatible(OpenAiCompatibleProvider::new(
                    client,
                    config.kind.name(),
                    base_url,
                    Some(api_key),
                )))
            }
            ProviderKind::Ollama => Ok(Self::Ollama(OllamaProvider::new(client, base_url))),
        }
    }

    /// Wraps the provider for injection into the engine.
    pub fn into_shared(self) -> Arc<dyn LlmProvider> {
        match self {
            Self::OpenAiCompatible(p) => Arc::new(p),
            Self::Ollama(p) => Arc::new(p),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared HTTP helpers
// ---------------------------------------------------------------------------

fn transport_error(error: reqwest::Error) -> ProviderError {
    ProviderError::Transport {
        message: error.to_string(),
    }
}

/// Sends `request` and returns the body of a successful response.
async fn send(request: reqwest::RequestBuilder) -> Result<String, ProviderError> {
    let response = request.send().await.map_err(transport_error)?;
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;
    if !status.is_success() {
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body: truncate(&body, MAX_ERROR_BODY),
        });
    }
    Ok(body)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}
