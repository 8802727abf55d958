//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::agent::EngineConfig;

/// MDT-RS: multidisciplinary-team diagnosis from the command line.
///
/// Triage a case report, consult the selected specialists concurrently
/// and combine their opinions into one diagnosis.
#[derive(Parser, Debug)]
#[command(name = "mdt-rs")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the diagnosis cache database.
    ///
    /// Defaults to `mdt-rs/diagnosis-cache.db` under the user data directory.
    #[arg(long, env = "MDT_CACHE_PATH", global = true)]
    pub cache_path: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a full multidisciplinary diagnosis.
    ///
    /// Reads the report from FILE, or from stdin when FILE is omitted.
    #[command(after_help = r#"Examples:
  mdt-rs diagnose report.txt                   # Use the default provider chain
  mdt-rs diagnose report.txt --provider ollama # Force one provider
  cat report.txt | mdt-rs diagnose --no-cache  # Read stdin, skip the cache
  mdt-rs --format json diagnose report.txt | jq .diagnosis
"#)]
    Diagnose {
        /// Report file (stdin when omitted).
        file: Option<PathBuf>,

        /// Use only this provider (qwen, openai, gemini, baichuan, ollama).
        #[arg(short, long)]
        provider: Option<String>,

        /// Maximum concurrent specialist calls.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Per-specialist timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Maximum reasoning steps.
        #[arg(long)]
        max_steps: Option<usize>,

        /// Do not read or write the diagnosis cache.
        #[arg(long)]
        no_cache: bool,

        /// Directory of role templates.
        #[arg(long, env = "MDT_ROSTER_DIR")]
        roster_dir: Option<PathBuf>,
    },

    /// Select the specialists for a report without consulting them.
    Triage {
        /// Report file (stdin when omitted).
        file: Option<PathBuf>,

        /// Use only this provider.
        #[arg(short, long)]
        provider: Option<String>,

        /// Directory of role templates.
        #[arg(long, env = "MDT_ROSTER_DIR")]
        roster_dir: Option<PathBuf>,
    },

    /// List the specialist roster.
    Roles {
        /// Directory of role templates.
        #[arg(long, env = "MDT_ROSTER_DIR")]
        roster_dir: Option<PathBuf>,
    },

    /// Write the default role templates to a directory for editing.
    ///
    /// Existing files are left untouched.
    InitRoster {
        /// Target directory.
        #[arg(default_value = "roster")]
        dir: PathBuf,
    },

    /// Diagnosis cache maintenance.
    #[command(subcommand)]
    Cache(CacheCommands),
}

/// Cache subcommands.
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache statistics.
    Stats,

    /// Delete every cached diagnosis.
    Clear,

    /// Delete cached diagnoses older than the TTL.
    Prune {
        /// TTL in seconds (defaults to `CACHE_TTL`, or 3600).
        #[arg(long)]
        ttl: Option<u64>,
    },
}

impl Cli {
    /// Returns the cache path, falling back to the default location.
    #[must_use]
    pub fn get_cache_path(&self) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(EngineConfig::default_cache_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_diagnose_flags() {
        let cli = Cli::try_parse_from([
            "mdt-rs",
            "--format",
            "json",
            "diagnose",
            "r.txt",
            "--provider",
            "ollama",
            "--concurrency",
            "2",
            "--timeout",
            "10",
            "--no-cache",
        ])
        .unwrap_or_else(|e| unreachable!("{e}"));

        assert_eq!(cli.format, "json");
        match cli.command {
            Commands::Diagnose {
                file,
                provider,
                concurrency,
                timeout,
                no_cache,
                ..
            } => {
                assert_eq!(file, Some(PathBuf::from("r.txt")));
                assert_eq!(provider.as_deref(), Some("ollama"));
                assert_eq!(concurrency, Some(2));
                assert_eq!(timeout, Some(10));
                assert!(no_cache);
            }
            other => unreachable!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cache_subcommands() {
        let cli = Cli::try_parse_from(["mdt-rs", "cache", "prune", "--ttl", "60"])
            .unwrap_or_else(|e| unreachable!("{e}"));
        assert!(matches!(
            cli.command,
            Commands::Cache(CacheCommands::Prune { ttl: Some(60) })
        ));
    }

    #[test]
    fn test_custom_cache_path() {
        let cli = Cli::try_parse_from(["mdt-rs", "--cache-path", "/tmp/c.db", "cache", "stats"])
            .unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(cli.get_cache_path(), PathBuf::from("/tmp/c.db"));
    }
}
