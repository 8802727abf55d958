//! CLI command implementations.
//!
//! Contains the business logic for each CLI command.

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::format_push_string)]

use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{
    EngineConfig, EngineConfigBuilder, LoggingContext, Orchestrator, ProviderChain, RoleRegistry,
};
use crate::cache::DiagnosisCache;
use crate::cli::output::{
    OutputFormat, format_assignment, format_outcome, format_roles, format_stats,
};
use crate::cli::parser::{CacheCommands, Cli, Commands};
use crate::error::{CommandError, Result};

/// Overrides for the diagnose command.
#[derive(Debug, Clone, Default)]
pub struct DiagnoseParams<'a> {
    /// Report file; stdin when `None`.
    pub file: Option<&'a Path>,
    /// Provider override.
    pub provider: Option<&'a str>,
    /// Maximum concurrent specialist calls.
    pub concurrency: Option<usize>,
    /// Per-specialist timeout in seconds.
    pub timeout: Option<u64>,
    /// Reasoning step budget.
    pub max_steps: Option<usize>,
    /// Skip the diagnosis cache.
    pub no_cache: bool,
    /// Role template directory.
    pub roster_dir: Option<&'a Path>,
}

/// Executes the CLI command.
///
/// # Returns
///
/// Result with output string on success.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let cache_path = cli.get_cache_path();

    match &cli.command {
        Commands::Diagnose {
            file,
            provider,
            concurrency,
            timeout,
            max_steps,
            no_cache,
            roster_dir,
        } => {
            let params = DiagnoseParams {
                file: file.as_deref(),
                provider: provider.as_deref(),
                concurrency: *concurrency,
                timeout: *timeout,
                max_steps: *max_steps,
                no_cache: *no_cache,
                roster_dir: roster_dir.as_deref(),
            };
            cmd_diagnose(&params, &cache_path, format)
        }
        Commands::Triage {
            file,
            provider,
            roster_dir,
        } => cmd_triage(
            file.as_deref(),
            provider.as_deref(),
            roster_dir.as_deref(),
            format,
        ),
        Commands::Roles { roster_dir } => cmd_roles(roster_dir.as_deref(), format),
        Commands::InitRoster { dir } => cmd_init_roster(dir, format),
        Commands::Cache(cmd) => cmd_cache(cmd, &cache_path, format),
    }
}

fn cmd_diagnose(params: &DiagnoseParams<'_>, cache_path: &Path, format: OutputFormat) -> Result<String> {
    let report = read_report(params.file)?;

    let mut builder = EngineConfig::builder().from_env().cache_path(cache_path);
    if let Some(n) = params.concurrency {
        builder = builder.max_concurrency(n);
    }
    if let Some(secs) = params.timeout {
        builder = builder.per_task_timeout(Duration::from_secs(secs));
    }
    if let Some(n) = params.max_steps {
        builder = builder.max_reasoning_steps(n);
    }
    if params.no_cache {
        builder = builder.enable_cache(false);
    }
    let config = with_roster_dir(builder, params.roster_dir).build()?;

    let orchestrator = build_orchestrator(&config, params.provider)?;
    let orchestrator = if config.enable_cache {
        match DiagnosisCache::open(&config.cache_path) {
            Ok(cache) => orchestrator.with_cache(Arc::new(cache)),
            Err(e) => {
                tracing::warn!(path = %config.cache_path.display(), error = %e, "cache unavailable, continuing without it");
                orchestrator
            }
        }
    } else {
        orchestrator
    };

    let outcome = runtime()?.block_on(orchestrator.diagnose(report))?;
    Ok(format_outcome(&outcome, format))
}

fn cmd_triage(
    file: Option<&Path>,
    provider: Option<&str>,
    roster_dir: Option<&Path>,
    format: OutputFormat,
) -> Result<String> {
    let report = read_report(file)?;
    let config = with_roster_dir(EngineConfig::builder().from_env(), roster_dir).build()?;
    let orchestrator = build_orchestrator(&config, provider)?;

    let assignment = runtime()?.block_on(orchestrator.triage(report))?;
    Ok(format_assignment(&assignment, format))
}

fn cmd_roles(roster_dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let roster = RoleRegistry::load(roster_dir)?;
    Ok(format_roles(roster.roles(), format))
}

fn cmd_init_roster(dir: &Path, format: OutputFormat) -> Result<String> {
    let written = RoleRegistry::write_defaults(dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write role templates: {e}"))
    })?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                return Ok(format!("All role templates already exist in: {}\n", dir.display()));
            }
            let mut output = format!(
                "Wrote {} role template(s) to: {}\n",
                written.len(),
                dir.display()
            );
            for path in &written {
                output.push_str(&format!(
                    "  {}\n",
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("unknown")
                ));
            }
            output.push_str("\nEdit these files, then pass --roster-dir to use them.\n");
            Ok(output)
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "directory": dir.to_string_lossy(),
                "written": written.iter().map(|p| p.to_string_lossy().into_owned()).collect::<Vec<_>>(),
                "count": written.len(),
            });
            Ok(format.to_json(&json))
        }
    }
}

fn cmd_cache(cmd: &CacheCommands, cache_path: &Path, format: OutputFormat) -> Result<String> {
    let cache = DiagnosisCache::open(cache_path)?;

    match cmd {
        CacheCommands::Stats => Ok(format_stats(&cache.try_stats()?, format)),
        CacheCommands::Clear => {
            let removed = cache.try_clear_all()?;
            Ok(removed_message("Cleared", removed, format))
        }
        CacheCommands::Prune { ttl } => {
            let ttl = match ttl {
                Some(secs) => Duration::from_secs(*secs),
                None => EngineConfig::builder().from_env().build()?.cache_ttl,
            };
            let removed = cache.try_clear_expired(ttl)?;
            Ok(removed_message("Pruned", removed, format))
        }
    }
}

fn removed_message(verb: &str, removed: usize, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!("{verb} {removed} cached diagnosis(es).\n"),
        OutputFormat::Json => format.to_json(&serde_json::json!({ "removed": removed })),
    }
}

fn with_roster_dir(builder: EngineConfigBuilder, dir: Option<&Path>) -> EngineConfigBuilder {
    match dir {
        Some(dir) => builder.roster_dir(dir),
        None => builder,
    }
}

fn build_orchestrator(config: &EngineConfig, provider: Option<&str>) -> Result<Orchestrator> {
    let roster = RoleRegistry::load(config.roster_dir.as_deref())?;
    let chain = ProviderChain::from_env(
        &config.default_provider,
        provider,
        config.temperature,
        &LoggingContext::new(),
    )?;
    tracing::info!(providers = ?chain.providers(), "provider chain ready");
    Ok(Orchestrator::new(Arc::new(chain), Arc::new(roster), config.clone())?)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}")).into()
    })
}

/// Reads the report from `file`, or stdin when `None`.
fn read_report(file: Option<&Path>) -> Result<String> {
    let text = match file {
        Some(path) => std::fs::read_to_string(path).map_err(|e| {
            CommandError::InvalidArgument(format!("cannot read {}: {e}", path.display()))
        })?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    if text.trim().is_empty() {
        return Err(CommandError::InvalidArgument("report is empty".to_string()).into());
    }
    Ok(text)
}
