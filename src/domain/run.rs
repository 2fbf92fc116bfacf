//! Run state and reconstruction from events.
//!
//! A Run represents a single execution of the connector workflow for one
//! account.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{Event, EventType, StepStatus};
use super::stats::SummaryStatistics;
use super::step::StepKind;

/// Name under which runs of the connector workflow are recorded
pub const WORKFLOW_NAME: &str = "github_connector";

/// A workflow execution run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Name of the workflow being executed
    pub workflow_name: String,

    /// Account the run was started for, when given explicitly
    pub username: Option<String>,

    /// Current state of the run
    pub state: RunState,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run finished (if applicable)
    pub completed_at: Option<DateTime<Utc>>,

    /// Status of each step (step_name -> status)
    pub step_statuses: HashMap<String, StepStatus>,

    /// Final output of a completed run
    pub summary: Option<SummaryStatistics>,
}

impl Run {
    /// Create a new run
    pub fn new(id: Uuid, username: Option<String>) -> Self {
        Self {
            id,
            workflow_name: WORKFLOW_NAME.to_string(),
            username,
            state: RunState::Start,
            started_at: Utc::now(),
            completed_at: None,
            step_statuses: HashMap::new(),
            summary: None,
        }
    }

    /// Reconstruct run state from a sequence of events
    pub fn from_events(events: &[Event]) -> Option<Self> {
        let first_event = events.first()?;

        let mut run = Self::new(first_event.run_id, None);
        run.started_at = first_event.timestamp;

        for event in events {
            run.apply_event(event);
        }

        Some(run)
    }

    /// Apply a single event to update run state
    pub fn apply_event(&mut self, event: &Event) {
        let step = event.step_id.as_deref().and_then(StepKind::from_name);

        match event.event_type {
            EventType::RunStarted => {
                self.state = RunState::Start;
                self.started_at = event.timestamp;
                self.username = event
                    .output
                    .as_ref()
                    .and_then(|o| o.get("username"))
                    .and_then(|u| u.as_str())
                    .map(str::to_string);
            }
            EventType::RunResumed => {
                self.state = RunState::Start;
                self.completed_at = None;
            }
            EventType::RunCompleted => {
                self.state = RunState::Completed;
                self.completed_at = Some(event.timestamp);
                self.summary = event
                    .output
                    .clone()
                    .and_then(|o| serde_json::from_value(o).ok());
            }
            EventType::RunFailed => {
                self.state = RunState::Failed {
                    kind: event.error_kind.clone().unwrap_or_default(),
                    error: event.error.clone().unwrap_or_default(),
                };
                self.completed_at = Some(event.timestamp);
            }
            EventType::StepStarted | EventType::StepRetrying => {
                self.set_step_status(event, StepStatus::Running);
                if let Some(step) = step {
                    self.state.advance(RunState::on_step_started(step));
                }
            }
            EventType::StepCompleted | EventType::StepSkipped => {
                let status = if event.event_type == EventType::StepSkipped {
                    StepStatus::Skipped
                } else {
                    StepStatus::Completed
                };
                self.set_step_status(event, status);
                if let Some(step) = step {
                    self.state.advance(RunState::on_step_completed(step));
                }
            }
            EventType::StepFailed => {
                self.set_step_status(event, StepStatus::Failed);
            }
        }
    }

    fn set_step_status(&mut self, event: &Event, status: StepStatus) {
        if let Some(ref step_id) = event.step_id {
            self.step_statuses.insert(step_id.clone(), status);
        }
    }

    /// Check if the run is still in progress
    pub fn is_running(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Check if a specific step is completed (or was satisfied from the journal)
    pub fn is_step_completed(&self, step_name: &str) -> bool {
        matches!(
            self.step_statuses.get(step_name),
            Some(StepStatus::Completed | StepStatus::Skipped)
        )
    }
}

/// State of a workflow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunState {
    /// Created, nothing invoked yet
    #[default]
    Start,

    /// Credential probe in flight
    PreflightPending,

    /// Credential probe succeeded
    PreflightDone,

    /// Profile and repository retrieval in flight
    FetchingParallel,

    /// Aggregation in flight
    Aggregating,

    /// Completed successfully
    Completed,

    /// Failed with the terminal error
    Failed { kind: String, error: String },
}

impl RunState {
    fn rank(&self) -> u8 {
        match self {
            Self::Start => 0,
            Self::PreflightPending => 1,
            Self::PreflightDone => 2,
            Self::FetchingParallel => 3,
            Self::Aggregating => 4,
            Self::Completed => 5,
            Self::Failed { .. } => 6,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }

    /// Move forward to `next`. Never moves backwards or out of a terminal state.
    pub fn advance(&mut self, next: RunState) {
        if !self.is_terminal() && next.rank() > self.rank() {
            *self = next;
        }
    }

    fn on_step_started(step: StepKind) -> Self {
        match step {
            StepKind::PreflightCheck => Self::PreflightPending,
            StepKind::RetrieveUserProfile
            | StepKind::RetrieveRepositories
            | StepKind::ExtractKeywords => Self::FetchingParallel,
            StepKind::ComputeSummaryStats => Self::Aggregating,
        }
    }

    fn on_step_completed(step: StepKind) -> Self {
        match step {
            StepKind::PreflightCheck => Self::PreflightDone,
            other => Self::on_step_started(other),
        }
    }
}
