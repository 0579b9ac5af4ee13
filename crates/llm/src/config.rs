//! Provider selection and credentials.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Supported provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Zhipu BigModel (GLM).
    Zhipu,
    /// OpenAI or any OpenAI-compatible gateway.
    #[serde(alias = "open_ai")]
    OpenAi,
    /// A local Ollama server.
    Ollama,
}

impl ProviderKind {
    /// Lowercase label used in configuration and logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Zhipu => "zhipu",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }

    /// Endpoint used when no base URL is configured.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Zhipu => "https://open.bigmodel.cn/api/paas/v4",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ProviderSetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zhipu" => Ok(Self::Zhipu),
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ProviderSetupError::Unsupported {
                name: other.to_string(),
            }),
        }
    }
}

/// Everything needed to construct a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Which provider to talk to.
    pub kind: ProviderKind,
    /// API key; required for `zhipu` and `openai`.
    pub api_key: Option<String>,
    /// Endpoint override.
    pub base_url: Option<String>,
}

impl ProviderConfig {
    /// A config with no credentials and the default endpoint.
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            api_key: None,
            base_url: None,
        }
    }

    /// The configured base URL, or the provider default.
    pub fn resolved_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(self.kind.default_base_url())
    }
}

/// A provider cannot be constructed from the given configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderSetupError {
    /// The provider name is not one of the supported set.
    #[error("unsupported provider '{name}' (expected zhipu, openai or ollama)")]
    Unsupported {
        /// The rejected name.
        name: String,
    },

    /// The provider needs an API key and none was configured.
    #[error("no API key configured for provider '{provider}'")]
    MissingApiKey {
        /// The provider missing its key.
        provider: ProviderKind,
    },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {message}")]
    Client {
        /// Description from the HTTP library.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!("Zhipu".parse::<ProviderKind>().unwrap(), ProviderKind::Zhipu);
        assert_eq!("OPENAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert!(matches!(
            "mistral".parse::<ProviderKind>(),
            Err(ProviderSetupError::Unsupported { .. })
        ));
    }

    #[test]
    fn blank_base_url_falls_back_to_default() {
        let mut config = ProviderConfig::new(ProviderKind::Ollama);
        config.base_url = Some("  ".into());
        assert_eq!(config.resolved_base_url(), "http://localhost:11434");

        config.base_url = Some("http://gpu-box:11434".into());
        assert_eq!(config.resolved_base_url(), "http://gpu-box:11434");
    }
}
