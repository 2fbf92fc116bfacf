//! Run lifecycle around the connector workflow.
//!
//! Opens the run journal, drives the workflow through a journaling engine,
//! and records the run's outcome. Resuming a run replays its journal so
//! completed steps are not executed again.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::config::credentials::{resolve_credentials, WorkflowArgs};
use crate::config::ResolvedConfig;
use crate::domain::{Event, EventType, Run, RunState, StepStatus, SummaryStatistics, WORKFLOW_NAME};

use super::activities::GitHubActivities;
use super::artifacts::OutputSink;
use super::engine::LocalEngine;
use super::event_store::EventStore;
use super::workflow::{GitHubWorkflow, WorkflowError};

/// Starts, resumes and inspects workflow runs
pub struct Orchestrator {
    config: ResolvedConfig,
}

impl Orchestrator {
    pub fn new(config: ResolvedConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    fn activities(&self) -> Arc<GitHubActivities> {
        Arc::new(GitHubActivities::new(
            self.config.client.clone(),
            OutputSink::new(&self.config.output_dir),
        ))
    }

    /// Start a new run
    #[instrument(skip(self, args), fields(username = ?args.username))]
    pub async fn run_workflow(&self, args: &WorkflowArgs) -> Result<Run> {
        let run_id = Uuid::new_v4();
        info!(%run_id, "Starting workflow run");

        let store = Arc::new(EventStore::open(&self.config.runs_dir(), run_id).await?);

        // The token is never journaled
        let (username, _) = resolve_credentials(args);
        let start_event = Event::new(
            run_id,
            None,
            EventType::RunStarted,
            format!("{}:start", run_id),
            format!("Workflow '{}' started", WORKFLOW_NAME),
            StepStatus::Running,
        )
        .with_output(json!({
            "username": username,
            "requested_username": args.username,
        }));
        store.append(&start_event).await?;

        self.drive(store, args).await
    }

    /// Resume a previously failed or interrupted run.
    ///
    /// Without a username override the run's originally requested username
    /// is reused, so step inputs (and their idempotency keys) match the
    /// journal.
    #[instrument(skip(self, overrides), fields(run_id = %run_id))]
    pub async fn resume_run(&self, run_id: Uuid, overrides: &WorkflowArgs) -> Result<Run> {
        info!("Resuming run");

        let store = Arc::new(EventStore::open(&self.config.runs_dir(), run_id).await?);
        let events = store.replay().await?;

        if events.is_empty() {
            anyhow::bail!("No events found for run {}", run_id);
        }

        let run = Run::from_events(&events).context("Failed to reconstruct run state")?;
        if run.state == RunState::Completed {
            info!("Run already completed, nothing to resume");
            return Ok(run);
        }

        let resumes = events
            .iter()
            .filter(|e| e.event_type == EventType::RunResumed)
            .count();
        let resume_event = Event::new(
            run_id,
            None,
            EventType::RunResumed,
            format!("{}:resume:{}", run_id, resumes + 1),
            format!("Workflow '{}' resumed", WORKFLOW_NAME),
            StepStatus::Running,
        );
        store.append(&resume_event).await?;

        let requested = events
            .iter()
            .find(|e| e.event_type == EventType::RunStarted)
            .and_then(|e| e.output.as_ref())
            .and_then(|o| o.get("requested_username"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let args = WorkflowArgs::new(
            overrides.username.clone().or(requested),
            overrides.pat.clone(),
        );

        self.drive(store, &args).await
    }

    async fn drive(&self, store: Arc<EventStore>, args: &WorkflowArgs) -> Result<Run> {
        let run_id = store.run_id();
        let engine = LocalEngine::with_journal(Arc::clone(&store));
        let workflow = GitHubWorkflow::new(self.activities(), engine, self.config.policy.clone());

        match workflow.run(args).await {
            Ok(stats) => self.complete_run(&store, stats).await?,
            Err(e) => self.handle_run_failure(&store, &e).await?,
        }

        self.get_run_status(run_id).await
    }

    /// Record a run failure; artifacts already written stay on disk
    async fn handle_run_failure(&self, store: &EventStore, error: &WorkflowError) -> Result<()> {
        let error_msg = error.to_string();
        error!(kind = error.kind(), %error_msg, "Run failed");

        let event = Event::new(
            store.run_id(),
            error.step().map(|s| s.name().to_string()),
            EventType::RunFailed,
            format!("{}:complete", store.run_id()),
            format!("Run failed: {}", error_msg),
            StepStatus::Failed,
        )
        .with_error(error.kind(), error_msg);
        store.append(&event).await?;

        Ok(())
    }

    async fn complete_run(&self, store: &EventStore, stats: SummaryStatistics) -> Result<()> {
        info!(run_id = %store.run_id(), "Run completed successfully");

        let event = Event::new(
            store.run_id(),
            None,
            EventType::RunCompleted,
            format!("{}:complete", store.run_id()),
            format!("Workflow '{}' completed", WORKFLOW_NAME),
            StepStatus::Completed,
        )
        .with_output(serde_json::to_value(stats).context("Failed to encode summary")?);
        store.append(&event).await?;

        Ok(())
    }

    /// Get status of a run by ID
    pub async fn get_run_status(&self, run_id: Uuid) -> Result<Run> {
        let store = EventStore::open(&self.config.runs_dir(), run_id).await?;
        let events = store.replay().await?;

        if events.is_empty() {
            anyhow::bail!("Run {} not found", run_id);
        }

        Run::from_events(&events).context("Failed to reconstruct run state")
    }

    /// List recent runs, most recent first
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<Run>> {
        let run_ids = EventStore::list_runs(&self.config.runs_dir()).await?;
        let mut runs = Vec::new();

        for run_id in run_ids {
            if let Ok(run) = self.get_run_status(run_id).await {
                runs.push(run);
            }
        }

        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);

        Ok(runs)
    }
}
