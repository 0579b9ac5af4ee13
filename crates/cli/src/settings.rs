//! Application configuration.
//!
//! Layered, lowest precedence first:
//!
//! 1. built-in defaults,
//! 2. `arcana.toml` in the working directory, or the file given with
//!    `--config`,
//! 3. `ARCANA__*` environment variables (`ARCANA__LLM__PROVIDER=ollama`),
//! 4. for credentials and endpoints only, the conventional provider variables
//!    (`ZHIPUAI_API_KEY`, `OPENAI_API_KEY`, `OPENAI_BASE_URL`,
//!    `OLLAMA_BASE_URL`, `OLLAMA_MODEL`) when nothing above set them.
//!
//! ## Example
//!
//! ```toml
//! [llm]
//! provider = "zhipu"
//! rate_limit_per_minute = 60
//! batch_size = 10
//!
//! [llm.zhipu]
//! model = "glm-4"
//!
//! [paths]
//! cards = "data/config_jsons/card_interpretations.json"
//! ledger = "output/card_interpretation_dimensions.json"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use engine::{GenerationSettings, RetryPolicy};
use llm::{ProviderConfig, ProviderKind};
use pipeline::{ModelName, PipelineError};
use serde::Deserialize;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "arcana.toml";

/// Longest accepted `retry.backoff_secs`.
pub const MAX_BACKOFF_SECS: f64 = 600.0;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Provider and request settings.
    pub llm: LlmSettings,
    /// Retry schedule.
    pub retry: RetrySettings,
    /// Input and output files.
    pub paths: PathSettings,
    /// Ledger metadata.
    pub ledger: LedgerSettings,
}

/// Provider and request settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// `zhipu`, `openai` or `ollama`.
    pub provider: String,
    /// Model used when the provider section does not name one.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Request budget shared by all workers; 0 disables throttling.
    pub rate_limit_per_minute: u32,
    /// Maximum concurrent requests.
    pub batch_size: usize,
    pub request_timeout_secs: u64,
    pub zhipu: ProviderSection,
    pub openai: ProviderSection,
    pub ollama: ProviderSection,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "zhipu".to_string(),
            model: None,
            temperature: 0.1,
            max_tokens: 1000,
            rate_limit_per_minute: 60,
            batch_size: 10,
            request_timeout_secs: 120,
            zhipu: ProviderSection::default(),
            openai: ProviderSection::default(),
            ollama: ProviderSection::default(),
        }
    }
}

/// Per-provider credentials and overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

/// Retry schedule.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempts per work item, including the first.
    pub max_attempts: u32,
    /// Wait after attempt `n` is `n × backoff_secs`.
    pub backoff_secs: f64,
    /// Adds up to one extra `backoff_secs` of random delay.
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_secs: 2.0,
            jitter: false,
        }
    }
}

/// Input and output files.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub cards: PathBuf,
    pub dimensions: PathBuf,
    pub prompt_template: PathBuf,
    pub ledger: PathBuf,
    pub samples_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            cards: PathBuf::from("data/config_jsons/card_interpretations.json"),
            dimensions: PathBuf::from("data/config_jsons/dimensions.json"),
            prompt_template: PathBuf::from("prompt_template.txt"),
            ledger: PathBuf::from("output/card_interpretation_dimensions.json"),
            samples_dir: PathBuf::from("output"),
        }
    }
}

impl PathSettings {
    /// Where `sample` writes its output: `<ledger stem>_sample.json` inside
    /// `samples_dir`.
    pub fn sample_file(&self) -> PathBuf {
        let stem = self
            .ledger
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ledger".to_string());
        self.samples_dir.join(format!("{stem}_sample.json"))
    }
}

/// Ledger metadata.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Written into newly created ledgers.
    pub description: String,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            description: "Tarot card interpretations by dimension".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads, applies environment fallbacks and validates.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
        };
        let mut config: Self = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("ARCANA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| PipelineError::configuration(e.to_string()))?;

        config.apply_env_fallbacks(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Fills unset credentials and endpoints from the conventional provider
    /// variables.
    pub fn apply_env_fallbacks(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fill = |slot: &mut Option<String>, name: &str| {
            if slot.as_deref().map_or(true, |v| v.trim().is_empty()) {
                if let Some(value) = lookup(name).filter(|v| !v.trim().is_empty()) {
                    *slot = Some(value);
                }
            }
        };
        fill(&mut self.llm.zhipu.api_key, "ZHIPUAI_API_KEY");
        fill(&mut self.llm.openai.api_key, "OPENAI_API_KEY");
        fill(&mut self.llm.openai.base_url, "OPENAI_BASE_URL");
        fill(&mut self.llm.ollama.base_url, "OLLAMA_BASE_URL");
        fill(&mut self.llm.ollama.model, "OLLAMA_MODEL");
    }

    /// Rejects values no run could succeed with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.provider_kind()?;
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(PipelineError::configuration(format!(
                "llm.temperature must be within 0.0..=2.0, got {}",
                self.llm.temperature
            )));
        }
        if self.llm.max_tokens == 0 {
            return Err(PipelineError::configuration("llm.max_tokens must be positive"));
        }
        if self.llm.batch_size == 0 {
            return Err(PipelineError::configuration("llm.batch_size must be positive"));
        }
        if self.llm.request_timeout_secs == 0 {
            return Err(PipelineError::configuration(
                "llm.request_timeout_secs must be positive",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(PipelineError::configuration("retry.max_attempts must be positive"));
        }
        if !(0.0..=MAX_BACKOFF_SECS).contains(&self.retry.backoff_secs) {
            return Err(PipelineError::configuration(format!(
                "retry.backoff_secs must be within 0..={MAX_BACKOFF_SECS}, got {}",
                self.retry.backoff_secs
            )));
        }
        Ok(())
    }

    /// The selected provider.
    pub fn provider_kind(&self) -> Result<ProviderKind, PipelineError> {
        self.llm
            .provider
            .parse()
            .map_err(|e: llm::ProviderSetupError| PipelineError::configuration(e.to_string()))
    }

    fn section(&self, kind: ProviderKind) -> &ProviderSection {
        match kind {
            ProviderKind::Zhipu => &self.llm.zhipu,
            ProviderKind::OpenAi => &self.llm.openai,
            ProviderKind::Ollama => &self.llm.ollama,
        }
    }

    /// Credentials and endpoint of the selected provider.
    pub fn provider_config(&self) -> Result<ProviderConfig, PipelineError> {
        let kind = self.provider_kind()?;
        let section = self.section(kind);
        Ok(ProviderConfig {
            kind,
            api_key: section.api_key.clone(),
            base_url: section.base_url.clone(),
        })
    }

    /// Model of the selected provider: the provider section wins over
    /// `llm.model`, which wins over the provider default.
    pub fn model(&self) -> Result<ModelName, PipelineError> {
        let kind = self.provider_kind()?;
        let name = self
            .section(kind)
            .model
            .as_deref()
            .or(self.llm.model.as_deref())
            .unwrap_or(match kind {
                ProviderKind::Zhipu => "glm-4",
                ProviderKind::OpenAi => "gpt-4o-mini",
                ProviderKind::Ollama => "qwen2.5:7b",
            });
        ModelName::new(name).ok_or_else(|| PipelineError::configuration("model name is blank"))
    }

    /// Request parameters for the worker.
    pub fn generation_settings(&self) -> Result<GenerationSettings, PipelineError> {
        Ok(GenerationSettings {
            model: self.model()?,
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
            call_timeout: Duration::from_secs(self.llm.request_timeout_secs),
        })
    }

    /// Retry schedule for the worker.
    pub fn retry_policy(&self) -> Result<RetryPolicy, PipelineError> {
        let backoff = Duration::try_from_secs_f64(self.retry.backoff_secs).map_err(|e| {
            PipelineError::configuration(format!(
                "retry.backoff_secs {} is not a valid duration: {e}",
                self.retry.backoff_secs
            ))
        })?;
        Ok(RetryPolicy::new(self.retry.max_attempts, backoff).with_jitter(self.retry.jitter))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.provider_kind().unwrap(), ProviderKind::Zhipu);
        assert_eq!(config.model().unwrap().as_str(), "glm-4");
        assert_eq!(config.llm.rate_limit_per_minute, 60);
        assert_eq!(config.llm.batch_size, 10);
        assert_eq!(config.retry_policy().unwrap(), RetryPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arcana.toml");
        std::fs::write(
            &path,
            r#"
            [llm]
            provider = "ollama"
            batch_size = 4

            [llm.ollama]
            model = "llama3"

            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();

        assert_eq!(config.provider_kind().unwrap(), ProviderKind::Ollama);
        assert_eq!(config.model().unwrap().as_str(), "llama3");
        assert_eq!(config.llm.batch_size, 4);
        assert_eq!(config.llm.temperature, 0.1);
        assert_eq!(config.retry_policy().unwrap().max_attempts(), 5);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn conventional_variables_fill_only_unset_slots() {
        let env: HashMap<&str, &str> = [
            ("ZHIPUAI_API_KEY", "zk"),
            ("OPENAI_API_KEY", "ok"),
            ("OLLAMA_BASE_URL", "http://gpu:11434"),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config.llm.openai.api_key = Some("from-file".into());

        config.apply_env_fallbacks(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.llm.zhipu.api_key.as_deref(), Some("zk"));
        assert_eq!(config.llm.openai.api_key.as_deref(), Some("from-file"));
        assert_eq!(config.llm.ollama.base_url.as_deref(), Some("http://gpu:11434"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = AppConfig::default();
        config.llm.provider = "mistral".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.llm.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.llm.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_backoff_is_a_configuration_error() {
        for backoff in [f64::NAN, f64::INFINITY, -1.0, 1e300] {
            let mut config = AppConfig::default();
            config.retry.backoff_secs = backoff;
            assert!(config.validate().unwrap_err().is_configuration());
            assert!(config.retry_policy().unwrap_err().is_configuration());
        }

        let mut config = AppConfig::default();
        config.retry.backoff_secs = MAX_BACKOFF_SECS;
        assert!(config.validate().is_ok());
        assert_eq!(
            config.retry_policy().unwrap().delay_after(1),
            Duration::from_secs_f64(MAX_BACKOFF_SECS)
        );
    }
}
