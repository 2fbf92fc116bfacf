//! github-connector - Durable GitHub profile and repository harvester
//!
//! Retrieves a GitHub account's public profile and repository listing,
//! normalizes both into stable shapes, and computes summary statistics,
//! orchestrated as a multi-step workflow with retries, timeouts and
//! resumable runs.
//!
//! # Architecture
//!
//! - Preflight validates credentials before any heavy work
//! - Profile and repository retrieval run concurrently
//! - Aggregation runs once both fetches have succeeded
//! - Every step goes through a [`core::StepEngine`]; the bundled
//!   [`core::LocalEngine`] journals attempts as events so failed runs can be
//!   resumed from the last completed step
//!
//! # Modules
//!
//! - `adapters`: GitHub REST API client
//! - `core`: Steps, execution engine, workflow and run journal
//! - `domain`: Data structures (UserProfile, RepositoryRecord, Event, Run)
//! - `config`: Configuration file, environment and credentials
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Harvest an account (falls back to $GITHUB_USERNAME / $GITHUB_PAT)
//! github-connector run --username octocat
//!
//! # Check run status
//! github-connector status <run-id>
//!
//! # Resume a failed run
//! github-connector resume <run-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{ClientConfig, ClientError, GitHubClient};
pub use config::credentials::{resolve_credentials, Credentials, WorkflowArgs};
pub use crate::core::{Activities, GitHubActivities, GitHubWorkflow, LocalEngine, Orchestrator};
pub use domain::{
    RawData, RepositoryCollection, RepositoryRecord, Run, RunState, SummaryStatistics,
    UserProfile,
};
