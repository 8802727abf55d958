//! End-to-end diagnosis pipeline.
//!
//! Composes the cache, triage, concurrent dispatch, the reasoning loop and
//! the plain aggregation fallback. Progress is streamed to the caller as
//! [`ProgressEvent`]s; the stream always ends with one
//! [`ProgressEvent::Final`] unless the consumer goes away first.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::config::EngineConfig;
use super::dispatcher::{DispatchConfig, Dispatcher};
use super::prompt::build_aggregation_prompt;
use super::provider::ModelClient;
use super::reasoning::ReasoningLoop;
use super::roster::RoleRegistry;
use super::triage::TriageAgent;
use crate::cache::{CacheEntry, DiagnosisCache, cache_key};
use crate::core::{Assignment, CandidateSet, Report, SpecialistResult};
use crate::error::AgentError;

const EVENT_BUFFER: usize = 32;
const TRIAGE_STATUS: &str = "正在分析病例进行智能分诊...";

/// One step of progress in a diagnosis run.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// The diagnosis was served from the cache; `Final` follows.
    CacheHit,
    /// Human-readable status line.
    Status(String),
    /// Triage finished.
    Triaged {
        /// Assigned roles, in triage order.
        roles: Vec<String>,
    },
    /// One specialist finished (completion order).
    Specialist(SpecialistResult),
    /// Final diagnosis; `None` means the diagnosis is unavailable.
    Final(Option<String>),
}

/// Result of [`Orchestrator::diagnose`].
#[derive(Debug, Clone)]
pub struct DiagnosisOutcome {
    /// Final diagnosis, `None` if both reasoning and the fallback failed.
    pub diagnosis: Option<String>,
    /// Whether the diagnosis came from the cache.
    pub from_cache: bool,
    /// Roles assigned by triage (empty on a cache hit).
    pub assignment: Vec<String>,
    /// Specialist results in completion order.
    pub specialists: Vec<SpecialistResult>,
    /// Wall time of the run.
    pub elapsed: Duration,
}

impl DiagnosisOutcome {
    /// Fraction of assigned specialists that completed.
    #[must_use]
    pub fn confidence(&self) -> f64 {
        confidence(&self.specialists, self.assignment.len())
    }
}

/// Runs the diagnosis pipeline.
///
/// Cheap to clone; clones share the client, roster and cache.
#[derive(Clone)]
pub struct Orchestrator {
    client: Arc<dyn ModelClient>,
    roster: Arc<RoleRegistry>,
    candidates: CandidateSet,
    cache: Option<Arc<DiagnosisCache>>,
    config: EngineConfig,
}

impl Orchestrator {
    /// Creates an orchestrator without a cache.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Roster`] if the roster is invalid.
    pub fn new(
        client: Arc<dyn ModelClient>,
        roster: Arc<RoleRegistry>,
        config: EngineConfig,
    ) -> Result<Self, AgentError> {
        let candidates = roster.candidates()?;
        Ok(Self {
            client,
            roster,
            candidates,
            cache: None,
            config,
        })
    }

    /// Attaches a diagnosis cache. Ignored when caching is disabled in
    /// the configuration.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<DiagnosisCache>) -> Self {
        if self.config.enable_cache {
            self.cache = Some(cache);
        }
        self
    }

    /// Candidate roles offered to triage.
    #[must_use]
    pub const fn candidates(&self) -> &CandidateSet {
        &self.candidates
    }

    /// Starts a diagnosis and returns its progress stream.
    ///
    /// The pipeline runs on a spawned task; dropping the stream cancels
    /// it, including in-flight specialist calls.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Orchestration`] for a blank report.
    pub fn run(&self, report: impl Into<Report>) -> Result<ReceiverStream<ProgressEvent>, AgentError> {
        let report = non_blank(report.into())?;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let this = self.clone();

        tokio::spawn(async move {
            let watcher = tx.clone();
            tokio::select! {
                () = this.pipeline(report, tx) => {}
                () = watcher.closed() => {
                    tracing::debug!("progress consumer dropped, cancelling diagnosis");
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    /// Runs only triage.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Orchestration`] for a blank report.
    pub async fn triage(&self, report: impl Into<Report>) -> Result<Assignment, AgentError> {
        let report = non_blank(report.into())?;
        Ok(TriageAgent::new(Arc::clone(&self.client))
            .select(&report, &self.candidates)
            .await)
    }

    /// Runs the full pipeline and gathers the result.
    ///
    /// Specialist results are logged as they arrive.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Orchestration`] for a blank report, or if the
    /// pipeline stops without a final event.
    pub async fn diagnose(&self, report: impl Into<Report>) -> Result<DiagnosisOutcome, AgentError> {
        let start = Instant::now();
        let mut events = self.run(report)?;

        let mut from_cache = false;
        let mut assignment = Vec::new();
        let mut specialists = Vec::new();

        while let Some(event) = events.next().await {
            match event {
                ProgressEvent::CacheHit => from_cache = true,
                ProgressEvent::Status(text) => tracing::info!("{text}"),
                ProgressEvent::Triaged { roles } => assignment = roles,
                ProgressEvent::Specialist(result) => specialists.push(result),
                ProgressEvent::Final(diagnosis) => {
                    return Ok(DiagnosisOutcome {
                        diagnosis,
                        from_cache,
                        assignment,
                        specialists,
                        elapsed: start.elapsed(),
                    });
                }
            }
        }

        Err(AgentError::Orchestration {
            message: "diagnosis pipeline ended without a result".to_string(),
        })
    }

    async fn pipeline(self, report: Report, tx: mpsc::Sender<ProgressEvent>) {
        let start = Instant::now();
        let key = cache_key(report.as_str());

        if let Some(entry) = self.cached(&key).await {
            tracing::info!(key = %key, hits = entry.hit_count, "diagnosis served from cache");
            if tx.send(ProgressEvent::CacheHit).await.is_ok() {
                let _ = tx.send(ProgressEvent::Final(Some(entry.diagnosis))).await;
            }
            return;
        }

        if tx.send(ProgressEvent::Status(TRIAGE_STATUS.to_string())).await.is_err() {
            return;
        }

        let assignment = TriageAgent::new(Arc::clone(&self.client))
            .select(&report, &self.candidates)
            .await;
        let roles = assignment.roles().to_vec();
        let status = format!("已启动专家会诊：{}", roles.join("、"));
        if tx.send(ProgressEvent::Triaged { roles }).await.is_err()
            || tx.send(ProgressEvent::Status(status)).await.is_err()
        {
            return;
        }

        let dispatcher = Dispatcher::new(
            Arc::clone(&self.client),
            Arc::clone(&self.roster),
            DispatchConfig::from(&self.config),
        );
        let mut results = Vec::with_capacity(assignment.len());
        let mut stream = dispatcher.dispatch_all(&report, &assignment);
        while let Some(result) = stream.next().await {
            results.push(result.clone());
            if tx.send(ProgressEvent::Specialist(result)).await.is_err() {
                return;
            }
        }
        drop(stream);

        // Aggregate in assignment order, not completion order.
        let opinions: Vec<(&str, &str)> = assignment
            .roles()
            .iter()
            .filter_map(|role| {
                results
                    .iter()
                    .find(|r| &r.role == role)
                    .and_then(SpecialistResult::opinion)
                    .map(|text| (role.as_str(), text))
            })
            .collect();

        let diagnosis = self.aggregate(&opinions).await;

        if let Some(text) = &diagnosis {
            self.store(&key, text, confidence(&results, assignment.len())).await;
        }

        tracing::info!(
            specialists = assignment.len(),
            completed = opinions.len(),
            diagnosed = diagnosis.is_some(),
            elapsed_ms = start.elapsed().as_millis(),
            "diagnosis finished"
        );
        let _ = tx.send(ProgressEvent::Final(diagnosis)).await;
    }

    /// Looks up `key` on the blocking pool; rusqlite I/O stays off the workers.
    async fn cached(&self, key: &str) -> Option<CacheEntry> {
        let cache = Arc::clone(self.cache.as_ref()?);
        let key = key.to_string();
        let ttl = self.config.cache_ttl;
        tokio::task::spawn_blocking(move || cache.get(&key, ttl))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "cache lookup task failed");
                None
            })
    }

    async fn store(&self, key: &str, diagnosis: &str, confidence: f64) {
        let Some(cache) = self.cache.as_ref().map(Arc::clone) else {
            return;
        };
        let (key, diagnosis) = (key.to_string(), diagnosis.to_string());
        if let Err(e) =
            tokio::task::spawn_blocking(move || cache.set(&key, &diagnosis, confidence)).await
        {
            tracing::warn!(error = %e, "cache write task failed");
        }
    }

    async fn aggregate(&self, opinions: &[(&str, &str)]) -> Option<String> {
        let outcome = ReasoningLoop::new(Arc::clone(&self.client), self.config.max_reasoning_steps)
            .run(opinions)
            .await;
        tracing::debug!(exit = ?outcome.exit, steps = outcome.state.step, "reasoning loop ended");
        if let Some(answer) = outcome.answer {
            return Some(answer);
        }

        tracing::info!("structured reasoning produced nothing, using plain aggregation");
        let prompt = build_aggregation_prompt(self.roster.aggregation_template(), opinions);
        match self.client.invoke(&prompt).await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => {
                tracing::warn!("plain aggregation returned empty text");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "plain aggregation failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("client", &self.client.name())
            .field("candidates", &self.candidates.len())
            .field("cache", &self.cache.is_some())
            .field("config", &self.config)
            .finish()
    }
}

fn non_blank(report: Report) -> Result<Report, AgentError> {
    if report.is_blank() {
        return Err(AgentError::Orchestration {
            message: "report cannot be empty".to_string(),
        });
    }
    Ok(report)
}

#[allow(clippy::cast_precision_loss)]
fn confidence(results: &[SpecialistResult], assigned: usize) -> f64 {
    if assigned == 0 {
        return 0.0;
    }
    let completed = results.iter().filter(|r| r.is_completed()).count();
    completed as f64 / assigned as f64
}
