//! Core domain types for MDT-RS.
//!
//! These types carry no I/O and are shared by the agent pipeline, the
//! diagnosis cache and the CLI.

pub mod candidates;
pub mod diagnosis;
pub mod specialist;

pub use candidates::{Assignment, CandidateSet, Report};
pub use diagnosis::{Command, Issue, UNNAMED_ISSUE, format_issues};
pub use specialist::{SpecialistOutcome, SpecialistResult, seconds_label};
