//! Baton - coding agent pipeline controller
//!
//! CLI entry point: runs the planner → implementer → tester → reviewer
//! pipeline and manages its status file.

// Allow multiple crate versions from dependencies (can't easily control)
#![allow(clippy::multiple_crate_versions)]

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use baton::agent::config::{PipelineConfig, CONFIG_FILE};
use baton::cli::{print_history, print_pass_outcome, print_status};
use baton::log::HistoryLog;
use baton::pipeline::PipelineController;
use baton::process::ProcessRunner;
use baton::status::{Role, StatusStore};

/// Coding agent pipeline controller
///
/// Drives external coding agents through plan, implement, test and review
/// for one task at a time, resuming from the persisted status file.
#[derive(Parser, Debug)]
#[command(name = "baton", version, about)]
struct Cli {
    /// Path to the configuration file (defaults apply when it is missing)
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Debug-level diagnostics (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the status file and run passes until interrupted
    Run,
    /// Run a single pass for the current task and exit
    Once,
    /// Show the current status
    Status,
    /// Set a new task and reset every role to pending
    Task {
        /// Task description
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Reset roles to pending (all roles when none are given)
    Reset {
        /// Roles to reset
        roles: Vec<Role>,
    },
    /// Write a configuration file with every default spelled out
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Show recent agent invocations
    History {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    baton::logging::init(cli.verbose);

    match cli.command {
        Command::Init { force } => init_config(&cli.config, force),
        command => dispatch(&cli.config, command).await,
    }
}

async fn dispatch(config_path: &Path, command: Command) -> Result<()> {
    let config = PipelineConfig::load_or_default(config_path)
        .with_context(|| format!("Failed to load config from '{}'", config_path.display()))?;
    let store = StatusStore::new(config.status_file());

    match command {
        Command::Run => run_pipeline(config, true).await,
        Command::Once => run_pipeline(config, false).await,
        Command::Status => {
            print_status(&store.read()?);
            Ok(())
        }
        Command::Task { text } => {
            let task = text.join(" ");
            if task.trim().is_empty() {
                bail!("Task cannot be empty");
            }
            let record = store.set_task(&task)?;
            info!(task = %record.task, "task set");
            print_status(&record);
            Ok(())
        }
        Command::Reset { roles } => {
            let roles = if roles.is_empty() {
                Role::ALL.to_vec()
            } else {
                roles
            };
            let record = store.reset(&roles)?;
            print_status(&record);
            Ok(())
        }
        Command::History { limit } => {
            let history = HistoryLog::new(config.log_dir());
            let records = history
                .tail(limit)
                .with_context(|| format!("Failed to read {}", history.path().display()))?;
            print_history(&records);
            Ok(())
        }
        Command::Init { force } => init_config(config_path, force),
    }
}

/// Run the controller loop, or one pass, until done or interrupted.
async fn run_pipeline(config: PipelineConfig, forever: bool) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(forward_shutdown_signals(shutdown_tx));

    let runner = ProcessRunner::new(config.project_root())
        .with_log_dir(config.log_dir())
        .with_console_mirror(true)
        .with_shutdown(shutdown_rx);
    let mut controller = PipelineController::new(config, runner);

    let result = if forever {
        controller.run().await
    } else {
        run_single_pass(&controller).await
    };

    // Best effort: the status file may be the reason we are exiting
    if let Ok(record) = controller.store().read() {
        print_status(&record);
    }
    result.map_err(Into::into)
}

async fn run_single_pass(controller: &PipelineController) -> baton::Result<()> {
    let record = controller.store().read()?;
    if !record.has_task() {
        warn!("no task set; use `baton task <text>` first");
        return Ok(());
    }
    if record.all_done() {
        info!("all roles already done for this task");
        return Ok(());
    }
    match controller.run_pass().await {
        Ok(outcome) => {
            print_pass_outcome(&outcome);
            Ok(())
        }
        Err(baton::PipelineError::Interrupted) => {
            warn!("pass interrupted");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Set the shutdown flag on Ctrl+C or SIGTERM.
async fn forward_shutdown_signals(shutdown: watch::Sender<bool>) {
    #[cfg(unix)]
    let mut sigterm =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => Some(signal),
            Err(e) => {
                warn!(err = %e, "cannot listen for SIGTERM");
                None
            }
        };

    #[cfg(unix)]
    let sigterm_future = async {
        match sigterm.as_mut() {
            Some(signal) => {
                signal.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nInterrupted, stopping after terminating the running agent...");
        }
        () = sigterm_future => {
            info!("received SIGTERM");
        }
    }
    let _ = shutdown.send(true);
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    let text = PipelineConfig::default().to_toml()?;
    std::fs::write(path, text)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    eprintln!("Wrote {}", path.display());
    Ok(())
}
