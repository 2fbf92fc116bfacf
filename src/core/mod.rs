//! Core orchestration logic.
//!
//! This module contains:
//! - Activities: the workflow's steps and their production implementation
//! - Artifacts: JSON outputs persisted by the steps
//! - Engine: retry, timeout and heartbeat enforcement per step
//! - EventStore: Append-only run journal
//! - Policy: retry and timeout declarations
//! - Workflow: step sequencing and fan-out/fan-in
//! - Orchestrator: run lifecycle around the workflow

pub mod activities;
pub mod artifacts;
pub mod engine;
pub mod event_store;
pub mod orchestrator;
pub mod policy;
pub mod workflow;

// Re-export commonly used types
pub use activities::{Activities, GitHubActivities, StepError};
pub use artifacts::{
    ArtifactError, OutputSink, REPOSITORIES_ARTIFACT, SUMMARY_STATS_ARTIFACT,
    USER_PROFILE_ARTIFACT,
};
pub use engine::{
    step_fn, ActivityContext, AttemptError, EngineError, LocalEngine, StepEngine, StepFn,
    StepInput,
};
pub use event_store::{generate_idempotency_key, hash_input, EventStore};
pub use orchestrator::Orchestrator;
pub use policy::{RetryPolicy, StepOptions, WorkflowPolicy};
pub use workflow::{GitHubWorkflow, WorkflowError};
