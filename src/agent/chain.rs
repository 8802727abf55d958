//! Ordered provider fallback chain.
//!
//! A [`ProviderChain`] holds every available [`ModelClient`] with the
//! selected primary first. Invoking it tries each client in turn with the
//! same prompt and fails only when all of them fail.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::agent::client::{ProviderKind, ProviderSettings, create_client};
use crate::agent::provider::ModelClient;
use crate::error::{AgentError, ProviderError};

/// Deduplicates configuration log lines for the lifetime of the value.
///
/// Share one context (behind an [`Arc`]) across chain builds so the
/// provider-substitution message is logged once per unique configuration.
#[derive(Debug, Default)]
pub struct LoggingContext {
    logged: Mutex<HashSet<String>>,
}

impl LoggingContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `key`; returns `true` the first time it is seen.
    pub fn log_once(&self, key: &str) -> bool {
        match self.logged.lock() {
            Ok(mut logged) => logged.insert(key.to_string()),
            // A poisoned set only risks a duplicate log line.
            Err(poisoned) => poisoned.into_inner().insert(key.to_string()),
        }
    }

    /// Number of distinct keys recorded so far.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.logged.lock().map_or_else(|p| p.into_inner().len(), |l| l.len())
    }
}

/// A provider slot considered while building a chain.
///
/// `client` is `Err` when the provider could not be initialised (missing
/// credentials or a factory error).
pub struct ProviderSlot {
    /// Provider identifier.
    pub name: String,
    /// Initialised client, or why it is unavailable.
    pub client: Result<Arc<dyn ModelClient>, AgentError>,
}

impl ProviderSlot {
    /// Creates an available slot.
    pub fn available(client: Arc<dyn ModelClient>) -> Self {
        Self {
            name: client.name().to_string(),
            client: Ok(client),
        }
    }

    /// Creates an unavailable slot.
    pub fn unavailable(name: impl Into<String>, reason: AgentError) -> Self {
        Self {
            name: name.into(),
            client: Err(reason),
        }
    }
}

impl std::fmt::Debug for ProviderSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSlot")
            .field("name", &self.name)
            .field("available", &self.client.is_ok())
            .finish()
    }
}

/// Fallback chain over model providers.
pub struct ProviderChain {
    clients: Vec<Arc<dyn ModelClient>>,
}

impl ProviderChain {
    /// Creates a chain that tries `clients` in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::NoProviderAvailable`] if `clients` is empty.
    pub fn new(clients: Vec<Arc<dyn ModelClient>>) -> Result<Self, AgentError> {
        if clients.is_empty() {
            return Err(AgentError::NoProviderAvailable);
        }
        Ok(Self { clients })
    }

    /// Builds a chain from slots given in priority order.
    ///
    /// With an explicit `override_provider`, that provider must be
    /// available and becomes the primary. Otherwise `default_provider` is
    /// the primary when available; if not, the first available provider is
    /// substituted and the substitution is logged once per configuration
    /// through `logging`. The remaining available providers follow in
    /// priority order.
    ///
    /// # Errors
    ///
    /// - [`AgentError::ProviderUnavailable`] if the override is unknown or
    ///   unavailable.
    /// - [`AgentError::NoProviderAvailable`] if no slot is available.
    pub fn build(
        slots: Vec<ProviderSlot>,
        default_provider: &str,
        override_provider: Option<&str>,
        logging: &LoggingContext,
    ) -> Result<Self, AgentError> {
        let mut available: Vec<Arc<dyn ModelClient>> = Vec::with_capacity(slots.len());
        let mut unavailable: Vec<(String, AgentError)> = Vec::new();
        for slot in slots {
            match slot.client {
                Ok(client) => available.push(client),
                Err(reason) => unavailable.push((slot.name, reason)),
            }
        }

        let primary = if let Some(requested) = override_provider.map(str::trim) {
            let Some(client) = available
                .iter()
                .find(|c| c.name().eq_ignore_ascii_case(requested))
            else {
                let reason = unavailable
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(requested))
                    .map_or_else(
                        || "provider is not registered".to_string(),
                        |(_, e)| e.to_string(),
                    );
                return Err(AgentError::ProviderUnavailable {
                    provider: requested.to_string(),
                    reason,
                });
            };
            client.name().to_string()
        } else if available.iter().any(|c| c.name() == default_provider) {
            default_provider.to_string()
        } else {
            let first = available
                .first()
                .map(|c| c.name().to_string())
                .ok_or(AgentError::NoProviderAvailable)?;
            let key = format!("default={default_provider};selected={first}");
            if logging.log_once(&key) {
                tracing::info!(
                    default = default_provider,
                    provider = %first,
                    "default provider unavailable, using first available provider"
                );
            }
            first
        };

        // Stable sort keeps the priority order for everything but the primary.
        available.sort_by_key(|c| c.name() != primary);

        tracing::debug!(
            primary = %primary,
            chain = ?available.iter().map(|c| c.name().to_string()).collect::<Vec<_>>(),
            "provider chain built"
        );

        Self::new(available)
    }

    /// Builds a chain from provider credentials in the environment.
    ///
    /// # Errors
    ///
    /// See [`ProviderChain::build`].
    pub fn from_env(
        default_provider: &str,
        override_provider: Option<&str>,
        temperature: f32,
        logging: &LoggingContext,
    ) -> Result<Self, AgentError> {
        // Reject unknown identifiers before touching the environment.
        let requested = override_provider
            .map(str::parse::<ProviderKind>)
            .transpose()?;

        let slots = ProviderKind::PRIORITY
            .iter()
            .map(|&kind| {
                let settings = ProviderSettings::from_env(kind, temperature);
                match create_client(&settings) {
                    Ok(client) => ProviderSlot::available(client),
                    Err(reason) => ProviderSlot::unavailable(kind.as_str(), reason),
                }
            })
            .collect();

        Self::build(slots, default_provider, requested.map(ProviderKind::as_str), logging)
    }

    /// Name of the primary provider.
    #[must_use]
    pub fn primary(&self) -> &str {
        self.clients.first().map_or("", |c| c.name())
    }

    /// Provider names in attempt order.
    #[must_use]
    pub fn providers(&self) -> Vec<&str> {
        self.clients.iter().map(|c| c.name()).collect()
    }
}

impl std::fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderChain")
            .field("providers", &self.providers())
            .finish()
    }
}

#[async_trait]
impl ModelClient for ProviderChain {
    fn name(&self) -> &str {
        self.primary()
    }

    async fn invoke(&self, prompt: &str) -> Result<String, AgentError> {
        let mut attempts = Vec::new();

        for client in &self.clients {
            match client.invoke(prompt).await {
                Ok(text) => {
                    if !attempts.is_empty() {
                        tracing::info!(
                            provider = client.name(),
                            failed = attempts.len(),
                            "fallback provider succeeded"
                        );
                    }
                    return Ok(text);
                }
                Err(e) => {
                    let error = match e {
                        AgentError::Provider(err) => err,
                        other => ProviderError::new(client.name(), other.to_string()),
                    };
                    tracing::warn!(provider = client.name(), error = %error.cause, "provider call failed");
                    attempts.push(error);
                }
            }
        }

        Err(AgentError::ChainExhausted { attempts })
    }
}
