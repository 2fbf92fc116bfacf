//! The connector workflow.
//!
//! Preflight gates the run, profile and repository retrieval fan out
//! concurrently, and aggregation fans them back in. The workflow declares
//! per-step policy and hands every invocation to a [`StepEngine`]; it holds
//! no business logic of its own.

use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::config::credentials::WorkflowArgs;
use crate::domain::{RawData, RepositoryCollection, RunState, StepKind, SummaryStatistics, UserProfile};

use super::activities::Activities;
use super::engine::{step_fn, ActivityContext, EngineError, StepEngine, StepFn, StepInput};
use super::policy::{StepOptions, WorkflowPolicy};

/// Why a run did not complete
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Failed to encode input for step '{step}': {source}")]
    Encode {
        step: StepKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("Step '{step}' returned an unexpected payload: {source}")]
    Decode {
        step: StepKind,
        #[source]
        source: serde_json::Error,
    },
}

impl WorkflowError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Engine(e) => e.kind(),
            Self::Encode { .. } => "encode",
            Self::Decode { .. } => "decode",
        }
    }

    /// Step the run failed on, when known
    pub fn step(&self) -> Option<StepKind> {
        match self {
            Self::Engine(EngineError::StepFailed { step, .. }) => Some(*step),
            Self::Engine(EngineError::Journal(_)) => None,
            Self::Encode { step, .. } | Self::Decode { step, .. } => Some(*step),
        }
    }
}

/// Orchestrates one account's harvest
pub struct GitHubWorkflow<A, E> {
    activities: Arc<A>,
    engine: E,
    policy: WorkflowPolicy,
    state: Mutex<RunState>,
}

impl<A, E> GitHubWorkflow<A, E>
where
    A: Activities + 'static,
    E: StepEngine,
{
    pub fn new(activities: Arc<A>, engine: E, policy: WorkflowPolicy) -> Self {
        Self {
            activities,
            engine,
            policy,
            state: Mutex::new(RunState::Start),
        }
    }

    /// Steps the workflow invokes, in order
    pub fn steps() -> [StepKind; 4] {
        StepKind::WORKFLOW
    }

    pub fn state(&self) -> RunState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn transition(&self, next: RunState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let before = state.clone();
        state.advance(next);
        if *state != before {
            let after = state.clone();
            info!(from = ?before, to = ?after, "Workflow state changed");
        }
    }

    /// Policy declared for a step
    pub fn options_for(&self, step: StepKind) -> StepOptions {
        match step {
            StepKind::PreflightCheck => self.policy.preflight_options(),
            _ => self.policy.step_options(),
        }
    }

    /// Run the workflow to completion
    #[instrument(skip(self, args), fields(username = ?args.username))]
    pub async fn run(&self, args: &WorkflowArgs) -> Result<SummaryStatistics, WorkflowError> {
        match self.execute(args).await {
            Ok(stats) => {
                self.transition(RunState::Completed);
                info!(?stats, "Workflow completed");
                Ok(stats)
            }
            Err(e) => {
                error!(kind = e.kind(), step = ?e.step(), error = %e, "Workflow failed");
                self.transition(RunState::Failed {
                    kind: e.kind().to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn execute(&self, args: &WorkflowArgs) -> Result<SummaryStatistics, WorkflowError> {
        self.transition(RunState::PreflightPending);
        self.run_args_step::<()>(StepKind::PreflightCheck, args).await?;
        self.transition(RunState::PreflightDone);

        // Both fetches must succeed; the first permanent failure drops the other.
        self.transition(RunState::FetchingParallel);
        let (user_data, repo_data) = tokio::try_join!(
            self.run_args_step::<UserProfile>(StepKind::RetrieveUserProfile, args),
            self.run_args_step::<RepositoryCollection>(StepKind::RetrieveRepositories, args),
        )?;

        self.transition(RunState::Aggregating);
        let raw = RawData {
            user_data,
            repo_data,
        };
        self.run_step(StepKind::ComputeSummaryStats, &raw).await
    }

    /// Invoke a single step through the engine under its declared policy
    pub async fn run_step<I, O>(&self, step: StepKind, input: &I) -> Result<O, WorkflowError>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let input = encode(step, input)?;
        self.invoke(step, StepInput::new(input)).await
    }

    /// Invoke a step that takes the run arguments. The token is left out of
    /// the journal key so a resume may supply it differently.
    async fn run_args_step<O>(&self, step: StepKind, args: &WorkflowArgs) -> Result<O, WorkflowError>
    where
        O: DeserializeOwned,
    {
        let input = StepInput::keyed_by(encode(step, args)?, encode(step, &args.without_secrets())?);
        self.invoke(step, input).await
    }

    async fn invoke<O>(&self, step: StepKind, input: StepInput) -> Result<O, WorkflowError>
    where
        O: DeserializeOwned,
    {
        let options = self.options_for(step);

        let output = self
            .engine
            .execute_step(step, self.step_fn(step), input, &options)
            .await?;

        serde_json::from_value(output).map_err(|source| WorkflowError::Decode { step, source })
    }

    fn step_fn(&self, step: StepKind) -> StepFn {
        let activities = Arc::clone(&self.activities);

        match step {
            StepKind::PreflightCheck => step_fn(move |ctx: ActivityContext, args: WorkflowArgs| {
                let activities = Arc::clone(&activities);
                async move { activities.preflight_check(&ctx, &args).await }
            }),
            StepKind::RetrieveUserProfile => {
                step_fn(move |ctx: ActivityContext, args: WorkflowArgs| {
                    let activities = Arc::clone(&activities);
                    async move { activities.retrieve_user_profile(&ctx, &args).await }
                })
            }
            StepKind::RetrieveRepositories => {
                step_fn(move |ctx: ActivityContext, args: WorkflowArgs| {
                    let activities = Arc::clone(&activities);
                    async move { activities.retrieve_repositories(&ctx, &args).await }
                })
            }
            StepKind::ExtractKeywords => {
                step_fn(move |ctx: ActivityContext, repos: RepositoryCollection| {
                    let activities = Arc::clone(&activities);
                    async move { activities.extract_keywords(&ctx, repos).await }
                })
            }
            StepKind::ComputeSummaryStats => step_fn(move |ctx: ActivityContext, raw: RawData| {
                let activities = Arc::clone(&activities);
                async move { activities.compute_summary_stats(&ctx, &raw).await }
            }),
        }
    }
}

fn encode<I: Serialize + ?Sized>(step: StepKind, input: &I) -> Result<serde_json::Value, WorkflowError> {
    serde_json::to_value(input).map_err(|source| WorkflowError::Encode { step, source })
}
