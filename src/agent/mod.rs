//! Agent pipeline for MDT-RS.
//!
//! Every model call goes through [`ModelClient`]. In production that is a
//! [`ProviderChain`] over OpenAI-compatible providers; tests substitute
//! scripted clients.
//!
//! # Architecture
//!
//! ```text
//! Report → Orchestrator
//!   ├── TriageAgent (selects specialists, fails open)
//!   ├── Dispatcher → N concurrent specialist calls
//!   │   └── semaphore slot → timeout → retry with backoff
//!   ├── ReasoningLoop (ReAct steps, ToolExecutor)
//!   └── plain aggregation fallback
//! ```

pub mod chain;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod executor;
pub mod json;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod reasoning;
pub mod roster;
pub mod triage;

// Re-export key types
pub use chain::{LoggingContext, ProviderChain, ProviderSlot};
pub use client::{ProviderKind, ProviderSettings, create_client};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use dispatcher::{DispatchConfig, Dispatcher, RetryPolicy, SpecialistStream};
pub use executor::{ALLOWED_TOOLS, StructuredDiagnosisTool, ToolExecutor, ToolHandler};
pub use orchestrator::{DiagnosisOutcome, Orchestrator, ProgressEvent};
pub use provider::ModelClient;
pub use providers::OpenAiCompatClient;
pub use reasoning::{LoopExit, Phase, ReasoningLoop, ReasoningOutcome, ReasoningState};
pub use roster::{RoleRegistry, RoleSpec};
pub use triage::TriageAgent;
