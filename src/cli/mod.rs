//! Command-line interface for the connector.
//!
//! Provides commands for running the workflow, checking status, listing
//! runs, resuming failed runs, probing credentials and showing the resolved
//! configuration.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use crate::config::credentials::{TOKEN_ENV, USERNAME_ENV};
use crate::config::{self, credentials::WorkflowArgs};
use crate::core::{GitHubActivities, GitHubWorkflow, LocalEngine, Orchestrator, OutputSink};
use crate::domain::{Run, RunState, StepKind};

/// github-connector - Durable GitHub profile and repository harvester
#[derive(Parser, Debug)]
#[command(name = "github-connector")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Credential overrides; absent values fall back to the environment
#[derive(Args, Debug, Clone, Default)]
pub struct CredentialArgs {
    /// Account to harvest (defaults to $GITHUB_USERNAME)
    #[arg(short, long)]
    pub username: Option<String>,

    /// Personal access token (defaults to $GITHUB_PAT)
    #[arg(long)]
    pub pat: Option<String>,
}

impl From<CredentialArgs> for WorkflowArgs {
    fn from(args: CredentialArgs) -> Self {
        WorkflowArgs::new(args.username, args.pat)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the connector workflow
    Run {
        #[command(flatten)]
        credentials: CredentialArgs,
    },

    /// Resume a failed run, skipping steps that already completed
    Resume {
        /// Run ID to resume
        run_id: String,

        #[command(flatten)]
        credentials: CredentialArgs,
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

    /// Validate credentials without fetching anything else
    Preflight {
        #[command(flatten)]
        credentials: CredentialArgs,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run { credentials } => run_workflow(credentials.into()).await,
            Commands::Resume {
                run_id,
                credentials,
            } => resume_run(&run_id, credentials.into()).await,
            Commands::Status { run_id } => show_status(&run_id).await,
            Commands::Runs { limit } => list_runs(limit).await,
            Commands::Preflight { credentials } => preflight(credentials.into()).await,
            Commands::Config => show_config(),
        }
    }
}

fn orchestrator() -> Result<Orchestrator> {
    Ok(Orchestrator::new(config::config()?.clone()))
}

fn parse_run_id(run_id_str: &str) -> Result<Uuid> {
    Uuid::parse_str(run_id_str).with_context(|| format!("Invalid run ID: {}", run_id_str))
}

/// Run the workflow and print the summary
async fn run_workflow(args: WorkflowArgs) -> Result<()> {
    let run = orchestrator()?.run_workflow(&args).await?;
    report(&run, "completed successfully")
}

/// Resume a failed run
async fn resume_run(run_id_str: &str, args: WorkflowArgs) -> Result<()> {
    let run_id = parse_run_id(run_id_str)?;
    let run = orchestrator()?.resume_run(run_id, &args).await?;
    report(&run, "resumed and completed successfully")
}

fn report(run: &Run, success: &str) -> Result<()> {
    match &run.state {
        RunState::Completed => {
            if let Some(ref summary) = run.summary {
                println!("{}", serde_json::to_string_pretty(summary)?);
            }
            eprintln!("\n[Run {} {}]", run.id, success);
        }
        RunState::Failed { kind, error } => {
            eprintln!("\n[Run {} failed ({}): {}]", run.id, kind, error);
            std::process::exit(1);
        }
        _ => {
            eprintln!("\n[Run {} in state: {:?}]", run.id, run.state);
        }
    }

    Ok(())
}

/// Show the status of a run
async fn show_status(run_id_str: &str) -> Result<()> {
    let run_id = parse_run_id(run_id_str)?;
    let run = orchestrator()?.get_run_status(run_id).await?;

    println!("Run ID: {}", run.id);
    println!("Workflow: {}", run.workflow_name);
    if let Some(ref username) = run.username {
        println!("Username: {}", username);
    }
    println!("State: {:?}", run.state);
    println!("Started: {}", run.started_at);
    if let Some(completed) = run.completed_at {
        println!("Completed: {}", completed);
    }
    println!("\nStep statuses:");
    for step in StepKind::WORKFLOW {
        let status = run.step_statuses.get(step.name()).copied().unwrap_or_default();
        println!("  {}: {:?}", step, status);
    }
    if let Some(ref summary) = run.summary {
        println!("\nSummary:\n{}", serde_json::to_string_pretty(summary)?);
    }

    Ok(())
}

/// List recent runs
async fn list_runs(limit: usize) -> Result<()> {
    let runs = orchestrator()?.list_runs(limit).await?;

    if runs.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    println!("{:<38} {:<20} {:<18}", "RUN ID", "USERNAME", "STATE");
    println!("{}", "-".repeat(78));

    for run in runs {
        let state_str = match &run.state {
            RunState::Start => "start",
            RunState::PreflightPending => "preflight",
            RunState::PreflightDone => "preflight-done",
            RunState::FetchingParallel => "fetching",
            RunState::Aggregating => "aggregating",
            RunState::Completed => "completed",
            RunState::Failed { .. } => "failed",
        };
        println!(
            "{:<38} {:<20} {:<18}",
            run.id,
            run.username.as_deref().unwrap_or("-"),
            state_str
        );
    }

    Ok(())
}

/// Run only the credential probe, with the workflow's retry policy
async fn preflight(args: WorkflowArgs) -> Result<()> {
    let cfg = config::config()?;
    let activities = GitHubActivities::new(cfg.client.clone(), OutputSink::new(&cfg.output_dir));
    let workflow = GitHubWorkflow::new(
        std::sync::Arc::new(activities),
        LocalEngine::new(),
        cfg.policy.clone(),
    );

    workflow
        .run_step::<_, ()>(StepKind::PreflightCheck, &args)
        .await
        .context("Preflight check failed")?;

    println!("Preflight check passed");
    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
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
    println!("  Home (journal): {}", cfg.home.display());
    println!("  Runs:           {}", cfg.runs_dir().display());
    println!("  Artifacts:      {}", cfg.output_dir.display());
    println!();
    println!("API:");
    println!("  Base URL:  {}", cfg.client.base_url);
    println!("  Timeout:   {}s", cfg.client.timeout_seconds);
    println!("  Max pages: {}", cfg.client.max_pages);
    println!();
    println!("Workflow policy:");
    println!("{}", serde_yaml::to_string(&cfg.policy)?);
    println!("Credentials:");
    for name in [USERNAME_ENV, TOKEN_ENV] {
        let state = if std::env::var(name).map(|v| !v.is_empty()).unwrap_or(false) {
            "set"
        } else {
            "missing"
        };
        println!("  {}: {}", name, state);
    }

    Ok(())
}
