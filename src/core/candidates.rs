//! Case reports, candidate roles and triage assignments.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::error::AgentError;

/// An immutable case report.
///
/// The pipeline never parses the report; it is embedded verbatim in
/// prompts and hashed for the cache. Cloning is cheap so every
/// concurrent specialist task can own a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report(Arc<str>);

impl Report {
    /// Wraps report text.
    pub fn new(text: impl AsRef<str>) -> Self {
        Self(Arc::from(text.as_ref()))
    }

    /// Returns the report text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the report contains only whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for Report {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Report {
    fn from(text: String) -> Self {
        Self(Arc::from(text))
    }
}

/// Ordered set of specialist role names a report may be assigned to.
///
/// Guaranteed non-empty with unique names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateSet {
    names: Vec<String>,
}

impl CandidateSet {
    /// Builds a candidate set, preserving order.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Roster`] if `names` is empty, contains a blank
    /// name, or contains duplicates.
    pub fn new<I, S>(names: I) -> Result<Self, AgentError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(AgentError::Roster {
                message: "candidate set is empty".to_string(),
            });
        }

        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if name.trim().is_empty() {
                return Err(AgentError::Roster {
                    message: "role name cannot be blank".to_string(),
                });
            }
            if !seen.insert(name.as_str()) {
                return Err(AgentError::Roster {
                    message: format!("duplicate role name: {name}"),
                });
            }
        }

        Ok(Self { names })
    }

    /// Returns `true` if `name` is a candidate (exact match).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Role names in configured order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of candidates (always at least one).
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always `false`; present for API symmetry with collections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Roles selected for one report.
///
/// Always a non-empty subset of the [`CandidateSet`] it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    roles: Vec<String>,
    fail_open: bool,
}

impl Assignment {
    /// Assigns every candidate (the fail-open result).
    #[must_use]
    pub fn full(candidates: &CandidateSet) -> Self {
        Self {
            roles: candidates.names.clone(),
            fail_open: true,
        }
    }

    /// Filters a model selection down to known candidates.
    ///
    /// Unknown names are dropped (exact match only) and duplicates are
    /// collapsed, keeping first-appearance order. Returns `None` if
    /// nothing survives.
    #[must_use]
    pub fn from_selection<I, S>(selected: I, candidates: &CandidateSet) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut roles: Vec<String> = Vec::new();
        for name in selected {
            let name = name.as_ref();
            if candidates.contains(name) && !roles.iter().any(|r| r == name) {
                roles.push(name.to_string());
            }
        }

        if roles.is_empty() {
            None
        } else {
            Some(Self {
                roles,
                fail_open: false,
            })
        }
    }

    /// Assigned role names.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Number of assigned roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Always `false`; an assignment is never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// `true` when triage failed open and every candidate was assigned.
    #[must_use]
    pub const fn is_fail_open(&self) -> bool {
        self.fail_open
    }
}
