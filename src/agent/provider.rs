//! Pluggable model client trait.
//!
//! A [`ModelClient`] is the only I/O boundary of the pipeline: it takes a
//! fully rendered prompt and returns the model's text. Everything above it
//! (triage, dispatch, reasoning, aggregation) is provider-agnostic.

use async_trait::async_trait;

use crate::error::AgentError;

/// Trait for text-generation backends.
///
/// Implementations handle the transport layer (HTTP, SDK calls) for a
/// specific provider. [`ProviderChain`](super::ProviderChain) also
/// implements this trait, so callers never need to know whether they hold
/// a single backend or an ordered fallback chain.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Provider identifier (e.g., `"qwen"`, `"openai"`).
    fn name(&self) -> &str;

    /// Sends one prompt and returns the generated text.
    ///
    /// # Errors
    ///
    /// Single backends return [`AgentError::Provider`]; a chain returns
    /// [`AgentError::ChainExhausted`] once every backend has failed.
    async fn invoke(&self, prompt: &str) -> Result<String, AgentError>;
}
