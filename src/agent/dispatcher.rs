//! Concurrent specialist dispatch.
//!
//! Every assigned role runs as its own task. A semaphore bounds how many
//! model calls are in flight, each call carries its own timeout, and
//! results are streamed back in completion order. A failing or slow
//! specialist only ever affects its own result.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::Stream;
use futures_util::stream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::agent::config::EngineConfig;
use crate::agent::prompt::render_specialist_prompt;
use crate::agent::provider::ModelClient;
use crate::agent::roster::RoleRegistry;
use crate::core::{Assignment, Report, SpecialistResult};
use crate::error::AgentError;

/// Stream of specialist results in completion order.
///
/// Dropping the stream aborts every task that has not finished yet.
pub type SpecialistStream = Pin<Box<dyn Stream<Item = SpecialistResult> + Send>>;

/// Exponential backoff between retries of one specialist call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Delay before the first retry.
    pub initial: Duration,
    /// Upper bound for any single delay.
    pub max: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub const NONE: Self = Self {
        retries: 0,
        initial: Duration::ZERO,
        max: Duration::ZERO,
    };

    /// Delay before retry number `attempt` (zero-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// Dispatch limits.
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    /// Maximum concurrent model calls.
    pub max_concurrency: usize,
    /// Timeout for one specialist (all retries included), measured after
    /// its slot is acquired.
    pub per_task_timeout: Duration,
    /// Retry behaviour inside the timeout budget.
    pub retry: RetryPolicy,
}

impl From<&EngineConfig> for DispatchConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
            per_task_timeout: config.per_task_timeout,
            retry: RetryPolicy {
                retries: config.specialist_retries,
                initial: config.retry_backoff,
                max: config.retry_backoff_max,
            },
        }
    }
}

/// Fans a report out to the assigned specialists.
pub struct Dispatcher {
    client: Arc<dyn ModelClient>,
    roster: Arc<RoleRegistry>,
    config: DispatchConfig,
}

impl Dispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(client: Arc<dyn ModelClient>, roster: Arc<RoleRegistry>, config: DispatchConfig) -> Self {
        Self {
            client,
            roster,
            config,
        }
    }

    /// Starts one task per assigned role and streams their results.
    ///
    /// The stream yields exactly one [`SpecialistResult`] per role in
    /// `assignment`, whether the call succeeded, failed or timed out.
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn dispatch_all(&self, report: &Report, assignment: &Assignment) -> SpecialistStream {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut roles_by_task = HashMap::with_capacity(assignment.len());

        for role in assignment.roles() {
            let sem = Arc::clone(&semaphore);
            let client = Arc::clone(&self.client);
            let prompt = render_specialist_prompt(&self.roster.template(role), report.as_str());
            let role = role.clone();
            let config = self.config;

            let handle = tasks.spawn({
                let role = role.clone();
                async move { run_specialist(role, prompt, client, sem, config).await }
            });
            roles_by_task.insert(handle.id(), role);
        }

        tracing::debug!(
            specialists = assignment.len(),
            max_concurrency = self.config.max_concurrency,
            "dispatched specialists"
        );

        Box::pin(stream::unfold(
            (tasks, roles_by_task),
            |(mut tasks, roles_by_task)| async move {
                let result = match tasks.join_next_with_id().await? {
                    Ok((_, result)) => result,
                    Err(e) => {
                        // Panicked or cancelled task: still one result for its role.
                        let role = roles_by_task.get(&e.id()).cloned().unwrap_or_default();
                        tracing::error!(role = %role, error = %e, "specialist task aborted");
                        SpecialistResult::failed(role, format!("task aborted: {e}"))
                    }
                };
                Some((result, (tasks, roles_by_task)))
            },
        ))
    }

    /// Dispatches and collects every result (completion order).
    pub async fn collect_all(&self, report: &Report, assignment: &Assignment) -> Vec<SpecialistResult> {
        use futures_util::StreamExt;
        self.dispatch_all(report, assignment).collect().await
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("client", &self.client.name())
            .field("roles", &self.roster.roles().len())
            .field("config", &self.config)
            .finish()
    }
}

async fn run_specialist(
    role: String,
    prompt: String,
    client: Arc<dyn ModelClient>,
    semaphore: Arc<Semaphore>,
    config: DispatchConfig,
) -> SpecialistResult {
    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => return SpecialistResult::failed(role, format!("semaphore closed: {e}")),
    };

    let start = Instant::now();
    tracing::debug!(role = %role, "specialist started");

    let call = invoke_with_retry(client.as_ref(), &role, &prompt, config.retry);
    let result = match tokio::time::timeout(config.per_task_timeout, call).await {
        Ok(Ok(text)) => SpecialistResult::completed(&role, text),
        Ok(Err(e)) => {
            tracing::warn!(role = %role, error = %e, "specialist failed");
            SpecialistResult::failed(&role, e.to_string())
        }
        Err(_) => {
            tracing::warn!(
                role = %role,
                timeout_secs = config.per_task_timeout.as_secs(),
                "specialist timed out"
            );
            SpecialistResult::timed_out(&role, config.per_task_timeout)
        }
    };

    let elapsed = start.elapsed();
    tracing::info!(
        role = %role,
        completed = result.is_completed(),
        elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        "specialist finished"
    );
    result.with_elapsed(elapsed)
}

async fn invoke_with_retry(
    client: &dyn ModelClient,
    role: &str,
    prompt: &str,
    retry: RetryPolicy,
) -> Result<String, AgentError> {
    let mut attempt = 0;
    loop {
        match client.invoke(prompt).await {
            Ok(text) => return Ok(text),
            Err(e) if attempt < retry.retries => {
                let delay = retry.delay(attempt);
                tracing::debug!(role, attempt = attempt + 1, delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), error = %e, "retrying specialist call");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
