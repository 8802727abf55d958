//! Error types for MDT-RS.
//!
//! Errors are grouped by layer: provider boundary, agent pipeline,
//! diagnosis cache and CLI commands. [`Error`] is the top-level type
//! returned by the command layer.

use thiserror::Error;

/// Result alias used by the command layer.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Agent pipeline error.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Diagnosis cache error.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// CLI command error.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single model provider call.
///
/// This is the only error that crosses the model boundary. A
/// [`ProviderChain`](crate::agent::ProviderChain) reacts to it by
/// retrying the same prompt on the next provider.
#[derive(Debug, Clone, Error)]
#[error("provider '{provider}' failed: {cause}")]
pub struct ProviderError {
    /// Provider identifier (e.g. `"qwen"`).
    pub provider: String,
    /// Human-readable failure cause.
    pub cause: String,
}

impl ProviderError {
    /// Creates a provider error.
    pub fn new(provider: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            cause: cause.into(),
        }
    }
}

/// Errors raised by the agent pipeline.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A single provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Every provider in the chain failed for the same prompt.
    #[error("all {} providers failed: {}", attempts.len(), join_attempts(attempts))]
    ChainExhausted {
        /// One error per attempted provider, in attempt order.
        attempts: Vec<ProviderError>,
    },

    /// An explicitly requested provider could not be initialised.
    #[error("requested provider '{provider}' is unavailable: {reason}")]
    ProviderUnavailable {
        /// Requested provider identifier.
        provider: String,
        /// Why it could not be used (missing credentials, init failure).
        reason: String,
    },

    /// No provider has usable credentials.
    #[error(
        "no model provider is configured; set one of DASHSCOPE_API_KEY, OPENAI_API_KEY, \
         GOOGLE_API_KEY, BAICHUAN_API_KEY or OLLAMA_BASE_URL"
    )]
    NoProviderAvailable,

    /// Unknown provider identifier.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// The unrecognised identifier.
        name: String,
    },

    /// A tool handler rejected its arguments.
    #[error("tool '{name}' failed: {message}")]
    ToolExecution {
        /// Tool name.
        name: String,
        /// Failure description.
        message: String,
    },

    /// Invalid roster (candidate set) configuration.
    #[error("invalid roster: {message}")]
    Roster {
        /// What is wrong with the roster.
        message: String,
    },

    /// Invalid engine configuration.
    #[error("configuration error: {message}")]
    Config {
        /// What is wrong with the configuration.
        message: String,
    },

    /// Pipeline-level failure.
    #[error("orchestration error: {message}")]
    Orchestration {
        /// Failure description.
        message: String,
    },
}

fn join_attempts(attempts: &[ProviderError]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from the diagnosis cache store.
#[derive(Debug, Error)]
pub enum CacheError {
    /// SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Cache directory could not be created.
    #[error("cannot create cache directory {path}: {source}")]
    CreateDir {
        /// Directory path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The connection mutex was poisoned by a panicking writer.
    #[error("cache connection lock poisoned")]
    LockPoisoned,
}

/// Errors from CLI command execution.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Command failed to execute.
    #[error("{0}")]
    ExecutionFailed(String),

    /// Invalid command argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Output could not be formatted.
    #[error("output format error: {0}")]
    OutputFormat(String),
}
