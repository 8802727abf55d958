//! OpenAI-compatible chat completion client using the `async-openai` crate.
//!
//! Every supported provider (Qwen, `OpenAI`, Gemini, Baichuan, Ollama)
//! exposes an OpenAI-compatible endpoint, so one client type covers all
//! of them; only the base URL, key and model differ.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
};
use async_trait::async_trait;

use crate::agent::client::ProviderSettings;
use crate::agent::provider::ModelClient;
use crate::error::{AgentError, ProviderError};

/// Temperature sent when the configured value is zero.
///
/// Some compatible endpoints reject an exact zero.
const MIN_TEMPERATURE: f32 = 0.01;

/// Single-prompt client for an OpenAI-compatible endpoint.
pub struct OpenAiCompatClient {
    client: Client<OpenAIConfig>,
    provider: String,
    model: String,
    temperature: f32,
}

impl OpenAiCompatClient {
    /// Creates a client from provider settings.
    #[must_use]
    pub fn new(settings: &ProviderSettings) -> Self {
        let mut openai_config =
            OpenAIConfig::new().with_api_key(settings.api_key.clone().unwrap_or_default());

        if let Some(ref base_url) = settings.base_url {
            openai_config = openai_config.with_api_base(base_url.trim_end_matches('/'));
        }

        Self {
            client: Client::with_config(openai_config),
            provider: settings.kind.to_string(),
            model: settings.model.clone(),
            temperature: settings.temperature,
        }
    }

    /// Model name sent with each request.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, prompt: &str) -> CreateChatCompletionRequest {
        let message = ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(prompt.to_string()),
            name: None,
        });

        let temperature = if self.temperature <= 0.0 {
            MIN_TEMPERATURE
        } else {
            self.temperature
        };

        CreateChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![message],
            temperature: Some(temperature),
            ..Default::default()
        }
    }

    fn error(&self, cause: impl Into<String>) -> AgentError {
        AgentError::Provider(ProviderError::new(&self.provider, cause))
    }
}

impl std::fmt::Debug for OpenAiCompatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatClient")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("client", &"<async-openai::Client>")
            .finish()
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.provider
    }

    async fn invoke(&self, prompt: &str) -> Result<String, AgentError> {
        let request = self.build_request(prompt);

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| self.error(e.to_string()))?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .filter(|content| !content.trim().is_empty())
            .cloned()
            .ok_or_else(|| self.error("empty response"))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::agent::client::ProviderKind;

    fn client(temperature: f32) -> OpenAiCompatClient {
        let mut settings = ProviderSettings::new(ProviderKind::Baichuan).api_key("k");
        settings.temperature = temperature;
        OpenAiCompatClient::new(&settings)
    }

    #[test]
    fn test_build_request_single_user_message() {
        let built = client(0.3).build_request("病例");
        assert_eq!(built.model, "Baichuan-M2");
        assert_eq!(built.messages.len(), 1);
        if let ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(text),
            ..
        }) = &built.messages[0]
        {
            assert_eq!(text, "病例");
        } else {
            panic!("Expected user text message");
        }
        assert_eq!(built.temperature, Some(0.3));
    }

    #[test]
    fn test_zero_temperature_is_nudged() {
        let built = client(0.0).build_request("x");
        assert_eq!(built.temperature, Some(MIN_TEMPERATURE));
    }

    #[test]
    fn test_name_is_provider_id() {
        let c = client(0.0);
        assert_eq!(c.name(), "baichuan");
        assert!(format!("{c:?}").contains("Baichuan-M2"));
    }
}
