//! # MDT-RS
//!
//! Multidisciplinary-team diagnostic orchestration.
//!
//! A case report is triaged to a subset of specialist roles, every
//! selected specialist is consulted concurrently through a model provider
//! chain, and the opinions are combined by a bounded reasoning loop that
//! extracts a structured diagnosis (with a plain aggregation fallback).
//! Final diagnoses are cached by content hash.
//!
//! ## Architecture
//!
//! ```text
//! Report → Orchestrator
//!   ├── DiagnosisCache (content hash, TTL)
//!   ├── TriageAgent → Assignment
//!   ├── Dispatcher → N concurrent specialists (semaphore, timeout, retry)
//!   ├── ReasoningLoop → ToolExecutor (allow-listed tools)
//!   └── plain aggregation fallback
//! every model call → ProviderChain → OpenAiCompatClient per provider
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mdt_rs::agent::{EngineConfig, LoggingContext, Orchestrator, ProviderChain, RoleRegistry};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::from_env()?;
//! let chain = ProviderChain::from_env(&config.default_provider, None, config.temperature, &LoggingContext::new())?;
//! let orchestrator = Orchestrator::new(Arc::new(chain), Arc::new(RoleRegistry::defaults()), config)?;
//! let outcome = orchestrator.diagnose("胸痛两天，伴气短").await?;
//! println!("{:?}", outcome.diagnosis);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cache;
pub mod cli;
pub mod core;
pub mod error;
pub mod logging;

pub use agent::{DiagnosisOutcome, Orchestrator, ProgressEvent};
pub use cache::DiagnosisCache;
pub use error::{AgentError, CacheError, CommandError, Error, ProviderError, Result};
