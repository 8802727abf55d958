//! Specialist roster: role names and their prompt templates.
//!
//! The roster is data, not code. Each role is a `{name, template}` record
//! resolved through [`RoleRegistry`]; adding a role means adding a
//! `<role>.md` file to the roster directory.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::agent::prompt::{AGGREGATION_TEMPLATE, DEFAULT_SPECIALIST_TEMPLATE};
use crate::core::CandidateSet;
use crate::error::AgentError;

/// File that overrides the plain aggregation template.
pub const AGGREGATION_FILENAME: &str = "multidisciplinary_team.md";

/// Template file extension.
const TEMPLATE_EXTENSION: &str = "md";

/// Built-in specialist roles.
pub const DEFAULT_ROLES: [&str; 13] = [
    "心脏科医生",
    "心理医生",
    "精神科医生",
    "肺科医生",
    "神经科医生",
    "内分泌科医生",
    "免疫科医生",
    "消化科医生",
    "皮肤科医生",
    "肿瘤科医生",
    "血液科医生",
    "肾脏科医生",
    "风湿科医生",
];

/// One specialist role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleSpec {
    /// Role name, also the candidate name used by triage.
    pub name: String,
    /// Prompt template with a `{medical_report}` placeholder.
    pub template: String,
}

impl RoleSpec {
    /// Creates a role with the default template.
    pub fn with_default_template(name: impl Into<String>) -> Self {
        let name = name.into();
        let template = DEFAULT_SPECIALIST_TEMPLATE.replace("{role}", &name);
        Self { name, template }
    }
}

/// Registry of specialist roles plus the team aggregation template.
#[derive(Debug, Clone)]
pub struct RoleRegistry {
    roles: Vec<RoleSpec>,
    aggregation_template: String,
}

impl RoleRegistry {
    /// Builds a registry from explicit roles.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Roster`] if `roles` is empty or has duplicate
    /// or blank names.
    pub fn new(roles: Vec<RoleSpec>, aggregation_template: impl Into<String>) -> Result<Self, AgentError> {
        // Validate through the candidate set rules.
        CandidateSet::new(roles.iter().map(|r| r.name.clone()))?;
        Ok(Self {
            roles,
            aggregation_template: aggregation_template.into(),
        })
    }

    /// Returns the compiled-in roster.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            roles: DEFAULT_ROLES
                .iter()
                .map(|name| RoleSpec::with_default_template(*name))
                .collect(),
            aggregation_template: AGGREGATION_TEMPLATE.to_string(),
        }
    }

    /// Loads a roster directory, falling back to compiled-in defaults.
    ///
    /// Every `<role>.md` file defines one role (file stem = name, contents =
    /// template), except [`AGGREGATION_FILENAME`] which overrides the
    /// aggregation template. Roles are ordered by file name. A missing
    /// directory, or one without role files, yields the default roles.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Roster`] if the directory exists but cannot be
    /// read.
    pub fn load(dir: Option<&Path>) -> Result<Self, AgentError> {
        let Some(dir) = dir.filter(|d| d.is_dir()) else {
            if let Some(missing) = dir {
                tracing::warn!(dir = %missing.display(), "roster directory not found, using defaults");
            }
            return Ok(Self::defaults());
        };

        let entries = std::fs::read_dir(dir).map_err(|e| AgentError::Roster {
            message: format!("cannot read {}: {e}", dir.display()),
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|e| e.to_str()) == Some(TEMPLATE_EXTENSION)
            })
            .collect();
        paths.sort();

        let mut roles = Vec::new();
        let mut aggregation_template = AGGREGATION_TEMPLATE.to_string();

        for path in paths {
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable template");
                    continue;
                }
            };
            if content.trim().is_empty() {
                continue;
            }

            if path.file_name().and_then(|n| n.to_str()) == Some(AGGREGATION_FILENAME) {
                aggregation_template = content;
                continue;
            }

            if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                roles.push(RoleSpec {
                    name: name.trim().to_string(),
                    template: content,
                });
            }
        }

        if roles.is_empty() {
            tracing::debug!(dir = %dir.display(), "no role templates found, using default roles");
            roles = Self::defaults().roles;
        }

        tracing::debug!(roles = roles.len(), dir = %dir.display(), "roster loaded");
        Self::new(roles, aggregation_template)
    }

    /// Writes the compiled-in roster to `dir`.
    ///
    /// Creates the directory if needed. Existing files are **not**
    /// overwritten.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if directory creation or writing fails.
    pub fn write_defaults(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let defaults = Self::defaults();

        let files = defaults
            .roles
            .iter()
            .map(|role| (format!("{}.{TEMPLATE_EXTENSION}", role.name), role.template.as_str()))
            .chain(std::iter::once((
                AGGREGATION_FILENAME.to_string(),
                defaults.aggregation_template.as_str(),
            )));

        let mut written = Vec::new();
        for (filename, content) in files {
            let path = dir.join(filename);
            if !path.exists() {
                std::fs::write(&path, content)?;
                written.push(path);
            }
        }
        Ok(written)
    }

    /// Candidate set for triage, in roster order.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Roster`] if the roster is invalid.
    pub fn candidates(&self) -> Result<CandidateSet, AgentError> {
        CandidateSet::new(self.roles.iter().map(|r| r.name.clone()))
    }

    /// Template for `role`, or the default template for unknown roles.
    #[must_use]
    pub fn template(&self, role: &str) -> String {
        self.roles
            .iter()
            .find(|r| r.name == role)
            .map_or_else(|| RoleSpec::with_default_template(role).template, |r| r.template.clone())
    }

    /// All roles.
    #[must_use]
    pub fn roles(&self) -> &[RoleSpec] {
        &self.roles
    }

    /// Plain aggregation template.
    #[must_use]
    pub fn aggregation_template(&self) -> &str {
        &self.aggregation_template
    }
}

impl Default for RoleRegistry {
    fn default() -> Self {
        Self::defaults()
    }
}
