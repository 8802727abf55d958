//! CLI layer for MDT-RS.
//!
//! Provides the command-line interface using clap, with commands for
//! diagnosing reports, inspecting the roster and maintaining the cache.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{CacheCommands, Cli, Commands};
