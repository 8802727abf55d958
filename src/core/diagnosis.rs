//! Structured diagnosis types produced by the tool-call protocol.

use serde::{Deserialize, Serialize};

/// Display name used for an issue whose `name` is blank.
pub const UNNAMED_ISSUE: &str = "未命名问题";

/// One health issue identified by the team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Short issue name.
    pub name: String,
    /// Supporting reason.
    pub reason: String,
    /// Recommended follow-up.
    pub suggestion: String,
}

impl Issue {
    /// Creates an issue, trimming every field.
    pub fn new(name: &str, reason: &str, suggestion: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            reason: reason.trim().to_string(),
            suggestion: suggestion.trim().to_string(),
        }
    }
}

/// A validated tool command.
///
/// The set of commands is closed: anything that does not map onto a
/// variant is rejected before execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "args")]
pub enum Command {
    /// Normalised structured diagnosis.
    #[serde(rename = "generate_structured_diagnosis")]
    GenerateStructuredDiagnosis {
        /// Normalised issues (possibly empty).
        issues: Vec<Issue>,
    },
}

impl Command {
    /// Wire name of the structured diagnosis tool.
    pub const STRUCTURED_DIAGNOSIS: &'static str = "generate_structured_diagnosis";

    /// Tool name of this command.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::GenerateStructuredDiagnosis { .. } => Self::STRUCTURED_DIAGNOSIS,
        }
    }

    /// Issues carried by the command.
    #[must_use]
    pub fn issues(&self) -> &[Issue] {
        match self {
            Self::GenerateStructuredDiagnosis { issues } => issues,
        }
    }
}

/// Formats issues into the patient-facing report.
///
/// Each issue becomes a `#### {i}. {name}` heading followed by optional
/// `- 理由：` and `- 建议：` lines; blocks are separated by a blank line.
/// Returns `None` for an empty list.
#[must_use]
pub fn format_issues(issues: &[Issue]) -> Option<String> {
    if issues.is_empty() {
        return None;
    }

    let blocks: Vec<String> = issues
        .iter()
        .enumerate()
        .map(|(idx, issue)| {
            let name = if issue.name.is_empty() {
                UNNAMED_ISSUE
            } else {
                issue.name.as_str()
            };
            let mut lines = vec![format!("#### {}. {name}", idx + 1)];
            if !issue.reason.is_empty() {
                lines.push(format!("- 理由：{}", issue.reason));
            }
            if !issue.suggestion.is_empty() {
                lines.push(format!("- 建议：{}", issue.suggestion));
            }
            lines.join("\n")
        })
        .collect();

    Some(blocks.join("\n\n"))
}
