//! Bounded ReAct loop that turns specialist opinions into a structured
//! diagnosis.
//!
//! Each step sends the instructions plus the current state (history, last
//! observation, specialist reports) to the model and reacts to the JSON
//! decision it returns:
//!
//! ```text
//! Init → AwaitingDecision ─┬─ final_answer ───────────────→ Done
//!                          ├─ tool call → ToolInvoked ─┬─ issues → Done
//!                          │                           └─ empty → AwaitingDecision
//!                          ├─ unparseable output ─────────→ Done (raw text)
//!                          └─ step budget exhausted ──────→ Done (None)
//! ```

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::agent::executor::ToolExecutor;
use crate::agent::json::parse_object;
use crate::agent::prompt::{build_reasoning_prompt, role_key};
use crate::agent::provider::ModelClient;
use crate::core::{Command, format_issues};

/// Loop phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No model call made yet.
    Init,
    /// Waiting for the model's next decision.
    AwaitingDecision,
    /// A tool was just executed.
    ToolInvoked,
    /// Terminal.
    Done,
}

/// One recorded decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// The model's stated thought.
    pub thought: Option<String>,
    /// Requested tool, if any.
    pub tool: Option<String>,
}

/// Mutable state of one loop run.
#[derive(Debug, Clone)]
pub struct ReasoningState {
    /// Model calls made so far.
    pub step: usize,
    /// Decisions in order.
    pub history: Vec<HistoryEntry>,
    /// Result of the most recent tool call.
    pub last_observation: Option<Command>,
    /// Current phase.
    pub phase: Phase,
}

impl ReasoningState {
    fn new() -> Self {
        Self {
            step: 0,
            history: Vec::new(),
            last_observation: None,
            phase: Phase::Init,
        }
    }

    /// State as embedded in the prompt.
    fn to_prompt_value(&self, reports: &Map<String, Value>) -> Value {
        let observation = self.last_observation.as_ref().map(|command| {
            json!({
                "tool": command.name(),
                "result": { "issues": command.issues() },
            })
        });
        json!({
            "history": self.history,
            "last_observation": observation,
            "reports": reports,
        })
    }
}

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The model returned a `final_answer`.
    FinalAnswer,
    /// A tool call produced non-empty issues.
    StructuredDiagnosis,
    /// Output could not be parsed; the raw text is the answer.
    RawText,
    /// The provider chain failed.
    ProviderFailed,
    /// The step budget ran out.
    StepsExhausted,
}

/// Result of one loop run.
#[derive(Debug, Clone)]
pub struct ReasoningOutcome {
    /// Final text, `None` when the caller must fall back.
    pub answer: Option<String>,
    /// Why the loop stopped.
    pub exit: LoopExit,
    /// State at termination.
    pub state: ReasoningState,
}

/// The reasoning loop.
pub struct ReasoningLoop {
    client: Arc<dyn ModelClient>,
    executor: ToolExecutor,
    max_steps: usize,
}

impl ReasoningLoop {
    /// Creates a loop making at most `max_steps` model calls.
    #[must_use]
    pub fn new(client: Arc<dyn ModelClient>, max_steps: usize) -> Self {
        Self {
            client,
            executor: ToolExecutor::new(),
            max_steps,
        }
    }

    /// Replaces the tool executor.
    #[must_use]
    pub fn with_executor(mut self, executor: ToolExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Runs the loop over `(role, opinion)` pairs.
    pub async fn run(&self, opinions: &[(&str, &str)]) -> ReasoningOutcome {
        let reports: Map<String, Value> = opinions
            .iter()
            .map(|(role, text)| (role_key(role).to_string(), Value::String((*text).to_string())))
            .collect();

        let mut state = ReasoningState::new();

        while state.step < self.max_steps {
            state.step += 1;
            state.phase = Phase::AwaitingDecision;
            let step = state.step;

            let prompt = build_reasoning_prompt(&state.to_prompt_value(&reports));
            let raw = match self.client.invoke(&prompt).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(step, error = %e, "reasoning call failed");
                    return Self::finish(state, None, LoopExit::ProviderFailed);
                }
            };

            let Some(decision) = parse_object(&raw) else {
                tracing::warn!(step, "reasoning output is not JSON, returning it verbatim");
                return Self::finish(state, Some(raw), LoopExit::RawText);
            };

            let thought = decision.get("thought").and_then(Value::as_str).map(str::to_string);
            let tool = decision.get("tool").and_then(Value::as_str).map(str::to_string);
            tracing::debug!(step, thought = ?thought, tool = ?tool, "reasoning decision");
            state.history.push(HistoryEntry {
                thought,
                tool: tool.clone(),
            });

            if let Some(answer) = decision
                .get("final_answer")
                .and_then(Value::as_str)
                .filter(|a| !a.trim().is_empty())
            {
                return Self::finish(state, Some(answer.to_string()), LoopExit::FinalAnswer);
            }

            if tool.as_deref() == Some(Command::STRUCTURED_DIAGNOSIS) {
                let args = decision.get("args").cloned().unwrap_or(Value::Null);
                let call = json!({ "tool": Command::STRUCTURED_DIAGNOSIS, "args": args });
                state.last_observation = self.executor.execute_value(&call);
                state.phase = Phase::ToolInvoked;

                if let Some(report) = state
                    .last_observation
                    .as_ref()
                    .and_then(|command| format_issues(command.issues()))
                {
                    tracing::info!(
                        step,
                        issues = state.last_observation.as_ref().map_or(0, |c| c.issues().len()),
                        "structured diagnosis produced"
                    );
                    return Self::finish(state, Some(report), LoopExit::StructuredDiagnosis);
                }
                tracing::debug!(step, "tool produced no issues");
            } else {
                state.last_observation = None;
            }
        }

        tracing::info!(steps = state.step, "reasoning step budget exhausted");
        Self::finish(state, None, LoopExit::StepsExhausted)
    }

    fn finish(mut state: ReasoningState, answer: Option<String>, exit: LoopExit) -> ReasoningOutcome {
        state.phase = Phase::Done;
        ReasoningOutcome {
            answer,
            exit,
            state,
        }
    }
}

impl std::fmt::Debug for ReasoningLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReasoningLoop")
            .field("client", &self.client.name())
            .field("max_steps", &self.max_steps)
            .finish()
    }
}
