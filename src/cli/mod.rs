//! Command-line interface for steward.
//!
//! Provides commands for executing plans, checking run status, listing
//! runs, resuming interrupted runs and inspecting event logs.

use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config;
use crate::core::{CheckpointStore, Orchestrator, RunPlan};
use crate::domain::{Event, Run, RunStatus};

/// steward - Event-sourced hierarchical run supervisor
#[derive(Parser, Debug)]
#[command(name = "steward")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a plan
    Run {
        /// Plan name (will look for plans/<name>.yaml)
        plan_name: String,

        /// Request file (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Read the request from stdin
        #[arg(long)]
        stdin: bool,
    },

    /// Check the status of a run
    Status {
        /// Run ID (UUID)
        run_id: String,
    },

    /// List recent runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Resume an interrupted run
    Resume {
        /// Run ID to resume
        run_id: String,

        /// Plan name (defaults to the plan recorded at run start)
        #[arg(short, long)]
        plan: Option<String>,
    },

    /// Print a run's event log
    Events {
        /// Run ID (UUID)
        run_id: String,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                plan_name,
                input,
                stdin,
            } => execute_run(&plan_name, input, stdin).await,
            Commands::Status { run_id } => show_status(&run_id).await,
            Commands::Runs { limit } => list_runs(limit).await,
            Commands::Resume { run_id, plan } => resume_run(&run_id, plan).await,
            Commands::Events { run_id } => show_events(&run_id).await,
            Commands::Config => show_config().await,
        }
    }
}

/// Execute a plan with the given request
async fn execute_run(plan_name: &str, input_file: Option<PathBuf>, use_stdin: bool) -> Result<()> {
    let plan = load_plan(plan_name)?;

    let request = if let Some(path) = input_file {
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?
    } else if use_stdin {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        buffer
    } else {
        anyhow::bail!("No request provided. Use --input <file> or --stdin");
    };

    if request.trim().is_empty() {
        anyhow::bail!("Request is empty");
    }

    let orchestrator = build_orchestrator(&plan)?;
    let run = orchestrator.run(&request).await?;

    report_run(&run)
}

/// Resume an interrupted run
async fn resume_run(run_id_str: &str, plan_name: Option<String>) -> Result<()> {
    let run_id = parse_run_id(run_id_str)?;

    // The plan is not persisted with the run; reload it by the name
    // recorded in the checkpoint header unless overridden.
    let plan_name = match plan_name {
        Some(name) => name,
        None => {
            let store = CheckpointStore::open(run_id).await?;
            store
                .load_header()
                .await?
                .with_context(|| format!("No checkpoint found for run {}", run_id))?
                .plan_name
        }
    };

    let plan = load_plan(&plan_name)?;
    let orchestrator = build_orchestrator(&plan)?;
    let run = orchestrator.resume(run_id).await?;

    report_run(&run)
}

/// Show the status of a run
async fn show_status(run_id_str: &str) -> Result<()> {
    let run_id = parse_run_id(run_id_str)?;

    let store = CheckpointStore::open(run_id).await?;
    let run = store
        .load_run()
        .await?
        .with_context(|| format!("No checkpoint found for run {}", run_id))?;

    println!("Run ID: {}", run.id);
    println!("Plan: {}", run.plan_name);
    println!("Status: {}", status_label(&run.status));
    println!("Next step: {:?}", run.target);
    println!("Started: {}", run.started_at);
    if let Some(completed) = run.completed_at {
        println!("Completed: {}", completed);
    }

    if !run.domain_results.is_empty() {
        println!("\nDomain results:");
        let mut names: Vec<&String> = run.domain_results.keys().collect();
        names.sort();
        for name in names {
            let result = &run.domain_results[name];
            let clean = result.stages.iter().filter(|s| s.success).count();
            println!(
                "  {}: attempt {}, {}/{} stages ok",
                name,
                result.attempt,
                clean,
                result.stages.len()
            );
        }
    }

    if !run.retry_counts.is_empty() {
        println!("\nRetries consumed:");
        let mut names: Vec<&String> = run.retry_counts.keys().collect();
        names.sort();
        for name in names {
            println!("  {}: {}", name, run.retry_counts[name]);
        }
    }

    Ok(())
}

/// List recent runs
async fn list_runs(limit: usize) -> Result<()> {
    let run_ids = CheckpointStore::list_runs().await?;

    if run_ids.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    println!("{:<38} {:<20} {:<12}", "RUN ID", "PLAN", "STATUS");
    println!("{}", "-".repeat(72));

    let mut shown = 0;
    for run_id in run_ids {
        if shown >= limit {
            break;
        }

        let store = CheckpointStore::open(run_id).await?;
        let Some(run) = store.load_run().await? else {
            continue;
        };

        println!(
            "{:<38} {:<20} {:<12}",
            run.id,
            run.plan_name,
            status_label(&run.status)
        );
        shown += 1;
    }

    Ok(())
}

/// Print a run's event log
async fn show_events(run_id_str: &str) -> Result<()> {
    let run_id = parse_run_id(run_id_str)?;

    let store = CheckpointStore::open(run_id).await?;
    let events = store.replay().await?;

    if events.is_empty() {
        println!("No events recorded for run {}", run_id);
        return Ok(());
    }

    for event in events {
        println!("{}", format_event(&event));
    }

    Ok(())
}

/// Show the resolved configuration (for debugging)
async fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home: {}", cfg.home.display());
    println!("  Runs: {}", cfg.home.join("runs").display());
    println!();
    println!("Defaults:");
    println!("  Max retries:   {}", cfg.defaults.max_retries);
    println!("  Stage timeout: {}s", cfg.defaults.stage_timeout_seconds);

    Ok(())
}

/// Build the orchestrator for a plan, with checkpoints under the
/// configured home and live event printing to stderr
fn build_orchestrator(plan: &RunPlan) -> Result<Orchestrator> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            eprintln!("{}", format_event(&event));
        }
    });

    Ok(Orchestrator::from_plan(plan)?
        .with_checkpoint_base(config::runs_dir()?)
        .with_event_stream(tx))
}

/// Print the terminal outcome of a run
fn report_run(run: &Run) -> Result<()> {
    match &run.status {
        RunStatus::Succeeded => {
            if let Some(ref output) = run.final_output {
                println!("{}", output);
            }
            eprintln!("\n[Run {} completed successfully]", run.id);
            Ok(())
        }
        RunStatus::Failed { domain } => {
            if let Some(ref output) = run.final_output {
                eprintln!("{}", output);
            }
            eprintln!(
                "\n[Run {} failed{}]",
                run.id,
                domain
                    .as_ref()
                    .map(|d| format!(" in domain '{}'", d))
                    .unwrap_or_default()
            );
            std::process::exit(1);
        }
        RunStatus::Running => {
            eprintln!("\n[Run {} ended while still marked running]", run.id);
            std::process::exit(1);
        }
    }
}

/// Load a plan by name
fn load_plan(name: &str) -> Result<RunPlan> {
    let plan_path = PathBuf::from("plans").join(format!("{}.yaml", name));

    if !plan_path.exists() {
        // Try the current directory
        let alt_path = PathBuf::from(format!("{}.yaml", name));
        if alt_path.exists() {
            let plan = RunPlan::from_file(&alt_path)?;
            plan.validate()?;
            return Ok(plan);
        }

        anyhow::bail!(
            "Plan '{}' not found. Looked for:\n  - {}\n  - {}",
            name,
            plan_path.display(),
            alt_path.display()
        );
    }

    let plan = RunPlan::from_file(&plan_path)?;
    plan.validate()?;
    Ok(plan)
}

fn parse_run_id(run_id_str: &str) -> Result<Uuid> {
    Uuid::parse_str(run_id_str).with_context(|| format!("Invalid run ID: {}", run_id_str))
}

fn status_label(status: &RunStatus) -> String {
    match status {
        RunStatus::Running => "running".to_string(),
        RunStatus::Succeeded => "succeeded".to_string(),
        RunStatus::Failed { .. } => "failed".to_string(),
    }
}

fn format_event(event: &Event) -> String {
    let scope = match (&event.domain, &event.stage) {
        (Some(domain), Some(stage)) => format!("{}/{}", domain, stage),
        (Some(domain), None) => domain.clone(),
        _ => "run".to_string(),
    };

    // Terminal events carry the full report; keep the stream line bounded
    format!(
        "{} [{}] {}",
        event.timestamp.format("%H:%M:%S"),
        scope,
        crate::domain::excerpt(&event.message)
    )
}
