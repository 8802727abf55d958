//! Engine configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::agent::client::ProviderKind;
use crate::error::AgentError;

/// Default maximum concurrent specialist calls.
const DEFAULT_MAX_CONCURRENCY: usize = 5;
/// Default per-specialist timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Default reasoning loop step budget.
const DEFAULT_MAX_REASONING_STEPS: usize = 2;
/// Default cache TTL in seconds.
const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
/// Default retries per specialist call (three attempts in total).
const DEFAULT_SPECIALIST_RETRIES: u32 = 2;
/// Initial retry backoff.
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(4);
/// Upper bound for a single retry backoff.
const DEFAULT_RETRY_BACKOFF_MAX: Duration = Duration::from_secs(10);
/// Application directory under the platform data dir.
const APP_DIR: &str = "mdt-rs";
/// Cache database file name.
const CACHE_FILENAME: &str = "diagnosis-cache.db";

/// Configuration for the diagnostic engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum concurrent specialist calls.
    pub max_concurrency: usize,
    /// Timeout for one specialist call, measured after a slot is acquired.
    pub per_task_timeout: Duration,
    /// Maximum model calls in the reasoning loop.
    pub max_reasoning_steps: usize,
    /// Cache entry lifetime.
    pub cache_ttl: Duration,
    /// Whether final diagnoses are read from and written to the cache.
    pub enable_cache: bool,
    /// Retries after a failed specialist call.
    pub specialist_retries: u32,
    /// First retry backoff; doubles per attempt.
    pub retry_backoff: Duration,
    /// Cap for a single retry backoff.
    pub retry_backoff_max: Duration,
    /// Provider used as primary when no override is given.
    pub default_provider: String,
    /// Sampling temperature for every provider.
    pub temperature: f32,
    /// Directory with role templates.
    ///
    /// When unset, the compiled-in roster is used.
    pub roster_dir: Option<PathBuf>,
    /// Path of the SQLite cache database.
    pub cache_path: PathBuf,
}

impl EngineConfig {
    /// Creates a new builder for `EngineConfig`.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if a value is out of range.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }

    /// Default cache location under the platform data directory.
    #[must_use]
    pub fn default_cache_path() -> PathBuf {
        dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join(CACHE_FILENAME)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            per_task_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_reasoning_steps: DEFAULT_MAX_REASONING_STEPS,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            enable_cache: true,
            specialist_retries: DEFAULT_SPECIALIST_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            retry_backoff_max: DEFAULT_RETRY_BACKOFF_MAX,
            default_provider: ProviderKind::Qwen.to_string(),
            temperature: 0.0,
            roster_dir: None,
            cache_path: Self::default_cache_path(),
        }
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    max_concurrency: Option<usize>,
    per_task_timeout: Option<Duration>,
    max_reasoning_steps: Option<usize>,
    cache_ttl: Option<Duration>,
    enable_cache: Option<bool>,
    specialist_retries: Option<u32>,
    retry_backoff: Option<Duration>,
    retry_backoff_max: Option<Duration>,
    default_provider: Option<String>,
    temperature: Option<f32>,
    roster_dir: Option<PathBuf>,
    cache_path: Option<PathBuf>,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|v| match v.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

impl EngineConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.max_concurrency.is_none() {
            self.max_concurrency = env_parse("MAX_CONCURRENT_AGENTS");
        }
        if self.per_task_timeout.is_none() {
            self.per_task_timeout = env_parse("AGENT_TIMEOUT").map(Duration::from_secs);
        }
        if self.max_reasoning_steps.is_none() {
            self.max_reasoning_steps = env_parse("MAX_REASONING_STEPS");
        }
        if self.cache_ttl.is_none() {
            self.cache_ttl = env_parse("CACHE_TTL").map(Duration::from_secs);
        }
        if self.enable_cache.is_none() {
            self.enable_cache = env_bool("ENABLE_CACHE");
        }
        if self.specialist_retries.is_none() {
            self.specialist_retries = env_parse("AGENT_RETRIES");
        }
        if self.default_provider.is_none() {
            self.default_provider = std::env::var("LLM_PROVIDER")
                .ok()
                .filter(|v| !v.trim().is_empty());
        }
        if self.temperature.is_none() {
            self.temperature = env_parse("LLM_TEMPERATURE");
        }
        if self.roster_dir.is_none() {
            self.roster_dir = std::env::var("MDT_ROSTER_DIR").ok().map(PathBuf::from);
        }
        if self.cache_path.is_none() {
            self.cache_path = std::env::var("MDT_CACHE_PATH").ok().map(PathBuf::from);
        }
        self
    }

    /// Sets the maximum concurrency.
    #[must_use]
    pub const fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    /// Sets the per-specialist timeout.
    #[must_use]
    pub const fn per_task_timeout(mut self, duration: Duration) -> Self {
        self.per_task_timeout = Some(duration);
        self
    }

    /// Sets the reasoning step budget.
    #[must_use]
    pub const fn max_reasoning_steps(mut self, n: usize) -> Self {
        self.max_reasoning_steps = Some(n);
        self
    }

    /// Sets the cache TTL.
    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Enables or disables the cache.
    #[must_use]
    pub const fn enable_cache(mut self, enabled: bool) -> Self {
        self.enable_cache = Some(enabled);
        self
    }

    /// Sets retries per specialist call.
    #[must_use]
    pub const fn specialist_retries(mut self, n: u32) -> Self {
        self.specialist_retries = Some(n);
        self
    }

    /// Sets the retry backoff (initial value and cap).
    #[must_use]
    pub const fn retry_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.retry_backoff = Some(initial);
        self.retry_backoff_max = Some(max);
        self
    }

    /// Sets the default provider.
    #[must_use]
    pub fn default_provider(mut self, provider: impl Into<String>) -> Self {
        self.default_provider = Some(provider.into());
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub const fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Sets the roster directory.
    #[must_use]
    pub fn roster_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.roster_dir = Some(dir.into());
        self
    }

    /// Sets the cache database path.
    #[must_use]
    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Builds the [`EngineConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if concurrency or the step budget is
    /// zero, the timeout is zero, or the default provider is unknown.
    pub fn build(self) -> Result<EngineConfig, AgentError> {
        let defaults = EngineConfig::default();

        let config = EngineConfig {
            max_concurrency: self.max_concurrency.unwrap_or(defaults.max_concurrency),
            per_task_timeout: self.per_task_timeout.unwrap_or(defaults.per_task_timeout),
            max_reasoning_steps: self
                .max_reasoning_steps
                .unwrap_or(defaults.max_reasoning_steps),
            cache_ttl: self.cache_ttl.unwrap_or(defaults.cache_ttl),
            enable_cache: self.enable_cache.unwrap_or(defaults.enable_cache),
            specialist_retries: self
                .specialist_retries
                .unwrap_or(defaults.specialist_retries),
            retry_backoff: self.retry_backoff.unwrap_or(defaults.retry_backoff),
            retry_backoff_max: self.retry_backoff_max.unwrap_or(defaults.retry_backoff_max),
            default_provider: self
                .default_provider
                .map(|p| p.trim().to_lowercase())
                .unwrap_or(defaults.default_provider),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            roster_dir: self.roster_dir,
            cache_path: self.cache_path.unwrap_or(defaults.cache_path),
        };

        if config.max_concurrency == 0 {
            return Err(AgentError::Config {
                message: "max_concurrency must be at least 1".to_string(),
            });
        }
        if config.max_reasoning_steps == 0 {
            return Err(AgentError::Config {
                message: "max_reasoning_steps must be at least 1".to_string(),
            });
        }
        if config.per_task_timeout.is_zero() {
            return Err(AgentError::Config {
                message: "per_task_timeout must be positive".to_string(),
            });
        }
        config
            .default_provider
            .parse::<ProviderKind>()
            .map_err(|e| AgentError::Config {
                message: e.to_string(),
            })?;

        Ok(config)
    }
}
