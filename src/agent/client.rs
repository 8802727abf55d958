//! Provider registry and factory.
//!
//! Maps provider identifiers to concrete [`ModelClient`] implementations
//! and reads each provider's credentials from the environment.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::agent::provider::ModelClient;
use crate::agent::providers::OpenAiCompatClient;
use crate::error::AgentError;

/// Known model providers, declared in fallback priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderKind {
    /// Alibaba Qwen via DashScope's OpenAI-compatible mode.
    Qwen,
    /// `OpenAI` (or any `OPENAI_BASE_URL`-compatible endpoint).
    OpenAi,
    /// Google Gemini via its OpenAI-compatible endpoint.
    Gemini,
    /// Baichuan.
    Baichuan,
    /// Self-hosted Ollama.
    Ollama,
}

impl ProviderKind {
    /// All providers in fallback priority order.
    pub const PRIORITY: [Self; 5] = [
        Self::Qwen,
        Self::OpenAi,
        Self::Gemini,
        Self::Baichuan,
        Self::Ollama,
    ];

    /// Stable identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Qwen => "qwen",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Baichuan => "baichuan",
            Self::Ollama => "ollama",
        }
    }

    /// Environment variable that holds the credential.
    ///
    /// For Ollama this is the base URL; its presence marks the provider
    /// as available.
    #[must_use]
    pub const fn credential_var(self) -> &'static str {
        match self {
            Self::Qwen => "DASHSCOPE_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Gemini => "GOOGLE_API_KEY",
            Self::Baichuan => "BAICHUAN_API_KEY",
            Self::Ollama => "OLLAMA_BASE_URL",
        }
    }

    /// Environment variable that overrides the model name.
    #[must_use]
    pub const fn model_var(self) -> &'static str {
        match self {
            Self::Qwen => "QWEN_MODEL",
            Self::OpenAi => "OPENAI_MODEL",
            Self::Gemini => "GEMINI_MODEL",
            Self::Baichuan => "BAICHUAN_MODEL",
            Self::Ollama => "OLLAMA_MODEL",
        }
    }

    /// Default model name.
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Qwen => "qwen-max",
            Self::OpenAi => "gpt-4o-mini",
            Self::Gemini => "gemini-1.5-pro-latest",
            Self::Baichuan => "Baichuan-M2",
            Self::Ollama => "gemma:latest",
        }
    }

    /// Default OpenAI-compatible API base, if the provider needs one.
    #[must_use]
    pub const fn default_base_url(self) -> Option<&'static str> {
        match self {
            Self::Qwen => Some("https://dashscope.aliyuncs.com/compatible-mode/v1"),
            Self::OpenAi => None,
            Self::Gemini => Some("https://generativelanguage.googleapis.com/v1beta/openai"),
            Self::Baichuan => Some("https://api.baichuan-ai.com/v1"),
            Self::Ollama => Some("http://localhost:11434/v1"),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "qwen" => Ok(Self::Qwen),
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            "baichuan" => Ok(Self::Baichuan),
            "ollama" => Ok(Self::Ollama),
            other => Err(AgentError::UnsupportedProvider {
                name: other.to_string(),
            }),
        }
    }
}

/// Connection settings for one provider.
///
/// Opaque to the pipeline; only the factory reads them.
#[derive(Clone)]
pub struct ProviderSettings {
    /// Which provider these settings are for.
    pub kind: ProviderKind,
    /// API key (`None` when not configured).
    pub api_key: Option<String>,
    /// API base URL.
    pub base_url: Option<String>,
    /// Model name.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
}

impl ProviderSettings {
    /// Creates settings with the provider's defaults and no credentials.
    #[must_use]
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            api_key: None,
            base_url: kind.default_base_url().map(str::to_string),
            model: kind.default_model().to_string(),
            temperature: 0.0,
        }
    }

    /// Reads settings for `kind` from the environment.
    #[must_use]
    pub fn from_env(kind: ProviderKind, temperature: f32) -> Self {
        let mut settings = Self::new(kind);
        settings.temperature = temperature;

        let credential = std::env::var(kind.credential_var())
            .ok()
            .filter(|v| !v.trim().is_empty());
        if let Ok(model) = std::env::var(kind.model_var())
            && !model.trim().is_empty()
        {
            settings = settings.model(model);
        }

        match kind {
            ProviderKind::Ollama => {
                // The base URL doubles as the availability marker.
                if let Some(base) = credential {
                    settings.base_url = Some(format!("{}/v1", base.trim_end_matches('/')));
                    settings.api_key = Some("ollama".to_string());
                }
            }
            ProviderKind::OpenAi => {
                settings.api_key = credential;
                if let Ok(base) = std::env::var("OPENAI_BASE_URL")
                    && !base.trim().is_empty()
                {
                    settings.base_url = Some(base);
                }
            }
            _ => settings.api_key = credential,
        }

        settings
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the model name.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// `true` if the provider has credentials.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("kind", &self.kind)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Creates a [`ModelClient`] for one provider.
///
/// # Errors
///
/// Returns [`AgentError::ProviderUnavailable`] if the provider has no
/// credentials configured.
pub fn create_client(settings: &ProviderSettings) -> Result<Arc<dyn ModelClient>, AgentError> {
    if !settings.is_configured() {
        return Err(AgentError::ProviderUnavailable {
            provider: settings.kind.to_string(),
            reason: format!("{} is not set", settings.kind.credential_var()),
        });
    }
    let client = OpenAiCompatClient::new(settings);
    tracing::debug!(provider = %settings.kind, model = client.model(), "model client initialised");
    Ok(Arc::new(client))
}
