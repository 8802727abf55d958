//! Triage agent.
//!
//! Narrows the full candidate roster down to the specialists relevant to
//! one report with a single model call. Triage fails open: any failure
//! assigns every candidate rather than blocking the diagnosis.

use std::sync::Arc;

use serde_json::Value;

use crate::agent::json::parse_array;
use crate::agent::prompt::build_triage_prompt;
use crate::agent::provider::ModelClient;
use crate::core::{Assignment, CandidateSet, Report};

/// Agent that selects specialists for a report.
pub struct TriageAgent {
    client: Arc<dyn ModelClient>,
}

impl TriageAgent {
    /// Creates a triage agent using `client` (usually a provider chain).
    #[must_use]
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self { client }
    }

    /// Selects the specialists for `report`.
    ///
    /// Always returns a non-empty subset of `candidates`.
    pub async fn select(&self, report: &Report, candidates: &CandidateSet) -> Assignment {
        let prompt = build_triage_prompt(report.as_str(), candidates.names());

        let raw = match self.client.invoke(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "triage call failed, assigning all candidates");
                return Assignment::full(candidates);
            }
        };

        let assignment = Self::parse_selection(&raw, candidates);
        if assignment.is_fail_open() {
            tracing::warn!(
                output = %truncate(&raw, 200),
                "triage output unusable, assigning all candidates"
            );
        } else {
            tracing::info!(roles = ?assignment.roles(), "triage selected specialists");
        }
        assignment
    }

    /// Turns raw triage output into an assignment, failing open.
    #[must_use]
    pub fn parse_selection(raw: &str, candidates: &CandidateSet) -> Assignment {
        parse_array(raw)
            .and_then(|items| {
                let names = items.iter().filter_map(Value::as_str);
                Assignment::from_selection(names, candidates)
            })
            .unwrap_or_else(|| Assignment::full(candidates))
    }
}

impl std::fmt::Debug for TriageAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriageAgent")
            .field("client", &self.client.name())
            .finish()
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
