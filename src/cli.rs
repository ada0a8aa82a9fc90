//! Command-line interface module for tidywatch.
//!
//! This module handles all CLI-related functionality including:
//! - Argument parsing
//! - Config loading with command-line overrides
//! - Logging setup for the long-running commands
//! - Dispatch to the engine, the history report and the config check

use crate::config::{ConfigError, EngineConfig};
use crate::engine::Engine;
use crate::history::HistoryStore;
use crate::logging::init_logging;
use crate::output::{FolderStatus, OutputFormatter};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

/// Watch folders and sort new files into category subfolders.
#[derive(Debug, Parser)]
#[command(name = "tidywatch", version, about)]
pub struct Cli {
    /// Path to the configuration file (JSON, or TOML with a .toml extension).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the log file location.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Override the history file location.
    #[arg(long, global = true)]
    pub history_file: Option<PathBuf>,

    /// Only write to the log file, not to stderr.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Command to execute. Defaults to `run`.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Represents a CLI command to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Sweep every enabled folder, then watch them until interrupted.
    Run,
    /// Sweep every enabled folder once and exit.
    Sweep,
    /// Show the history of moved files.
    History {
        /// Show only the most recent N records.
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Validate the configuration and list monitored folders.
    Check,
}

/// Runs the CLI application and returns the process exit code.
///
/// Exit codes: 0 on success or clean shutdown, 1 when configuration is
/// invalid, logging cannot start, or no folder could be watched.
pub fn run_cli(cli: Cli) -> ExitCode {
    let command = cli.command.unwrap_or(Command::Run);
    let result = match command {
        Command::Run => run_engine(&cli, false),
        Command::Sweep => run_engine(&cli, true),
        Command::History { limit } => show_history(&cli, limit),
        Command::Check => check_config(&cli),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            OutputFormatter::error(&message);
            ExitCode::FAILURE
        }
    }
}

/// Loads the configuration and applies command-line path overrides.
fn load_config(cli: &Cli) -> Result<EngineConfig, ConfigError> {
    let mut config = EngineConfig::load(cli.config.as_deref())?;
    if let Some(path) = &cli.log_file {
        config.engine.log_file = Some(path.clone());
    }
    if let Some(path) = &cli.history_file {
        config.engine.history_file = Some(path.clone());
    }
    Ok(config)
}

/// Starts logging, then runs the engine (or only its startup sweep).
///
/// Once logging is up, every failure is also written to the log as a
/// critical error, since the log is the only place a background run
/// reports to.
fn run_engine(cli: &Cli, sweep_only: bool) -> Result<(), String> {
    let config = load_config(cli).map_err(|e| format!("Error loading configuration: {}", e))?;
    let log_path = config
        .engine
        .log_path()
        .map_err(|e| format!("Error locating log file: {}", e))?;
    init_logging(&log_path, !cli.quiet).map_err(|e| format!("Error starting logging: {}", e))?;

    let result = start_engine(config, sweep_only);
    if let Err(message) = &result {
        error!(critical = true, "A fatal error occurred during startup: {}", message);
    }
    result
}

fn start_engine(config: EngineConfig, sweep_only: bool) -> Result<(), String> {
    let engine = Engine::new(config).map_err(|e| e.to_string())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Error starting runtime: {}", e))?;

    if sweep_only {
        let report = runtime
            .block_on(engine.sweep_all())
            .map_err(|e| e.to_string())?;
        OutputFormatter::success(&format!(
            "Sweep complete: {} moved, {} skipped, {} still being written, {} failed",
            report.moved, report.skipped, report.deferred, report.failed
        ));
        return Ok(());
    }

    runtime
        .block_on(engine.run())
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Prints the history document.
fn show_history(cli: &Cli, limit: Option<usize>) -> Result<(), String> {
    let path = match &cli.history_file {
        Some(path) => path.clone(),
        None => load_config(cli)
            .and_then(|config| config.engine.history_path())
            .map_err(|e| format!("Error locating history file: {}", e))?,
    };

    let records = HistoryStore::new(&path)
        .load()
        .map_err(|e| format!("Error reading history: {}", e))?;

    OutputFormatter::info(&format!("History file: {}", path.display()));
    OutputFormatter::history(&records, limit);
    Ok(())
}

/// Validates the configuration and lists the monitored folders.
fn check_config(cli: &Cli) -> Result<(), String> {
    let config = load_config(cli).map_err(|e| format!("Error loading configuration: {}", e))?;
    let engine_settings = &config.engine;

    engine_settings
        .compile_ignore_patterns()
        .map_err(|e| e.to_string())?;
    engine_settings.stability_wait().map_err(|e| e.to_string())?;
    engine_settings.retry_delay().map_err(|e| e.to_string())?;

    let table = config.category_table();
    OutputFormatter::header("CATEGORIES");
    for name in table.category_names() {
        println!("  {} → {}", name, table.subfolder_for(name));
    }

    let statuses: Vec<FolderStatus> = config
        .monitored_folders
        .iter()
        .map(|folder| {
            let resolved = folder.resolve_path();
            let exists = resolved.as_ref().is_ok_and(|path| path.is_dir());
            FolderStatus {
                name: folder.display_name().to_string(),
                path: resolved
                    .map(|path| path.display().to_string())
                    .map_err(|e| e.to_string()),
                enabled: folder.enabled,
                exists,
            }
        })
        .collect();
    OutputFormatter::folders(&statuses);

    let watchable = statuses.iter().filter(|s| s.enabled && s.exists).count();
    if watchable == 0 {
        OutputFormatter::warning("No enabled folder exists; the engine would not start.");
    } else {
        OutputFormatter::success(&format!(
            "Configuration is valid; {} folder{} would be watched.",
            watchable,
            if watchable == 1 { "" } else { "s" }
        ));
    }
    Ok(())
}
