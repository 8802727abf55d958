//! Output formatting for CLI commands.

#![allow(clippy::format_push_string)]

use std::fmt::Write;

use serde::Serialize;

use crate::agent::{DiagnosisOutcome, RoleSpec};
use crate::cache::CacheStats;
use crate::core::{Assignment, SpecialistOutcome, seconds_label};

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name; anything unrecognised is text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Serialises `value` as pretty JSON with a trailing newline.
    #[must_use]
    pub fn to_json<T: Serialize + ?Sized>(self, value: &T) -> String {
        serde_json::to_string_pretty(value).map_or_else(
            |e| format!("{{\"error\": \"serialization failed: {e}\"}}\n"),
            |s| s + "\n",
        )
    }
}

/// Formats a finished diagnosis.
#[must_use]
pub fn format_outcome(outcome: &DiagnosisOutcome, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = String::new();
            if !outcome.from_cache {
                out.push_str(&format!("Specialists: {}\n", outcome.assignment.join("、")));
                for result in &outcome.specialists {
                    let status = match &result.outcome {
                        SpecialistOutcome::Completed(_) => "ok".to_string(),
                        SpecialistOutcome::TimedOut { ms } => {
                            format!("timed out after {}", seconds_label(*ms))
                        }
                        SpecialistOutcome::Failed(reason) => format!("failed: {reason}"),
                    };
                    let _ = writeln!(
                        out,
                        "  {} [{status}, {:.1}s]",
                        result.role,
                        result.elapsed.as_secs_f64()
                    );
                }
                out.push('\n');
            }
            match &outcome.diagnosis {
                Some(text) => {
                    out.push_str(text.trim_end());
                    out.push('\n');
                }
                None => out.push_str("Diagnosis unavailable.\n"),
            }
            let source = if outcome.from_cache { "cache" } else { "live" };
            let _ = writeln!(
                out,
                "\n---\nSource: {source} | Confidence: {:.2} | Time: {:.1}s",
                outcome.confidence(),
                outcome.elapsed.as_secs_f64()
            );
            out
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "diagnosis": outcome.diagnosis,
                "from_cache": outcome.from_cache,
                "assignment": outcome.assignment,
                "specialists": outcome.specialists,
                "confidence": outcome.confidence(),
                "elapsed_ms": u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
            });
            format.to_json(&json)
        }
    }
}

/// Formats a triage assignment.
#[must_use]
pub fn format_assignment(assignment: &Assignment, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = String::new();
            for role in assignment.roles() {
                out.push_str(role);
                out.push('\n');
            }
            if assignment.is_fail_open() {
                out.push_str("(triage unavailable, all specialists assigned)\n");
            }
            out
        }
        OutputFormat::Json => format.to_json(assignment),
    }
}

/// Formats the roster.
#[must_use]
pub fn format_roles(roles: &[RoleSpec], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = format!("{} specialist role(s):\n", roles.len());
            for role in roles {
                out.push_str(&format!("  {}\n", role.name));
            }
            out
        }
        OutputFormat::Json => format.to_json(roles),
    }
}

/// Formats cache statistics.
#[must_use]
pub fn format_stats(stats: &CacheStats, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!(
            "Cached diagnoses: {}\nTotal hits: {}\nAverage hits: {:.2}\n",
            stats.total_cached, stats.total_hits, stats.average_hits
        ),
        OutputFormat::Json => format.to_json(stats),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::{CandidateSet, SpecialistResult};

    #[test]
    fn test_parse() {
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("yaml"), OutputFormat::Text);
    }

    fn outcome(diagnosis: Option<&str>) -> DiagnosisOutcome {
        DiagnosisOutcome {
            diagnosis: diagnosis.map(str::to_string),
            from_cache: false,
            assignment: vec!["A".to_string(), "B".to_string()],
            specialists: vec![
                SpecialistResult::completed("A", "fine"),
                SpecialistResult::timed_out("B", Duration::from_secs(30)),
            ],
            elapsed: Duration::from_millis(1500),
        }
    }

    #[test]
    fn test_outcome_text() {
        let text = format_outcome(&outcome(Some("D")), OutputFormat::Text);
        assert!(text.contains("Specialists: A、B"));
        assert!(text.contains("B [timed out after 30s"));
        assert!(text.contains("Confidence: 0.50"));
        assert!(text.contains("\nD\n"));

        let missing = format_outcome(&outcome(None), OutputFormat::Text);
        assert!(missing.contains("Diagnosis unavailable."));
    }

    #[test]
    fn test_outcome_json() {
        let json = format_outcome(&outcome(Some("D")), OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap_or_default();
        assert_eq!(value["diagnosis"], "D");
        assert_eq!(value["elapsed_ms"], 1500);
        assert_eq!(value["specialists"][1]["outcome"]["status"], "timed_out");
    }

    #[test]
    fn test_fail_open_assignment_is_flagged() {
        let candidates = CandidateSet::new(["A", "B"]).unwrap_or_else(|_| unreachable!());
        let text = format_assignment(&Assignment::full(&candidates), OutputFormat::Text);
        assert!(text.starts_with("A\nB\n"));
        assert!(text.contains("all specialists assigned"));
    }
}
