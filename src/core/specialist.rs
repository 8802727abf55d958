//! Per-role specialist results.

use std::time::Duration;

use serde::Serialize;

/// How a specialist call ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum SpecialistOutcome {
    /// The model produced an opinion.
    Completed(String),
    /// The call exceeded the per-task timeout.
    TimedOut {
        /// The timeout that was exceeded, in milliseconds.
        ms: u64,
    },
    /// The call failed after exhausting retries and the provider chain.
    Failed(String),
}

/// Outcome of one specialist for one report.
///
/// The dispatcher produces exactly one of these per assigned role, even
/// when the call times out or fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecialistResult {
    /// Role name.
    pub role: String,
    /// Result or error placeholder.
    pub outcome: SpecialistOutcome,
    /// Wall time from slot acquisition to completion.
    #[serde(skip)]
    pub elapsed: Duration,
}

impl SpecialistResult {
    /// Creates a completed result.
    pub fn completed(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            outcome: SpecialistOutcome::Completed(text.into()),
            elapsed: Duration::ZERO,
        }
    }

    /// Creates a timeout placeholder.
    pub fn timed_out(role: impl Into<String>, timeout: Duration) -> Self {
        Self {
            role: role.into(),
            outcome: SpecialistOutcome::TimedOut {
                ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            elapsed: timeout,
        }
    }

    /// Creates a failure placeholder.
    pub fn failed(role: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            outcome: SpecialistOutcome::Failed(reason.into()),
            elapsed: Duration::ZERO,
        }
    }

    /// Sets the elapsed time.
    #[must_use]
    pub const fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// Returns the opinion text, or the placeholder string for errors.
    #[must_use]
    pub fn text(&self) -> String {
        match &self.outcome {
            SpecialistOutcome::Completed(text) => text.clone(),
            SpecialistOutcome::TimedOut { ms } => {
                format!("diagnosis timed out (> {})", seconds_label(*ms))
            }
            SpecialistOutcome::Failed(reason) => format!("diagnosis failed: {reason}"),
        }
    }

    /// Returns the opinion if the call completed with non-blank text.
    #[must_use]
    pub fn opinion(&self) -> Option<&str> {
        match &self.outcome {
            SpecialistOutcome::Completed(text) if !text.trim().is_empty() => Some(text),
            _ => None,
        }
    }

    /// `true` if the call completed.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self.outcome, SpecialistOutcome::Completed(_))
    }
}

/// Renders a millisecond duration as seconds, e.g. `30s` or `1.5s`.
#[must_use]
pub fn seconds_label(ms: u64) -> String {
    if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        let secs = format!("{}.{:03}", ms / 1000, ms % 1000);
        format!("{}s", secs.trim_end_matches('0'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_text() {
        let timeout = SpecialistResult::timed_out("B", Duration::from_secs(30));
        assert_eq!(timeout.text(), "diagnosis timed out (> 30s)");
        assert!(timeout.opinion().is_none());

        let failed = SpecialistResult::failed("C", "all 1 providers failed");
        assert_eq!(failed.text(), "diagnosis failed: all 1 providers failed");
        assert!(!failed.is_completed());
    }

    #[test]
    fn test_blank_completion_has_no_opinion() {
        let blank = SpecialistResult::completed("A", "   ");
        assert!(blank.is_completed());
        assert!(blank.opinion().is_none());
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&SpecialistResult::timed_out("B", Duration::from_secs(5)))
            .unwrap_or_default();
        assert!(json.contains("\"status\":\"timed_out\""));
        assert!(json.contains("\"ms\":5000"));
    }

    #[test]
    fn test_sub_second_timeouts_keep_precision() {
        let result = SpecialistResult::timed_out("B", Duration::from_millis(1500));
        assert_eq!(result.outcome, SpecialistOutcome::TimedOut { ms: 1500 });
        assert_eq!(result.text(), "diagnosis timed out (> 1.5s)");

        let short = SpecialistResult::timed_out("B", Duration::from_millis(250));
        assert_eq!(short.text(), "diagnosis timed out (> 0.25s)");
        assert_eq!(seconds_label(30_000), "30s");
        assert_eq!(seconds_label(1_005), "1.005s");
    }
}
