//! The workflow's steps.
//!
//! Each step is a unit of work with its own retry and timeout contract. The
//! [`Activities`] trait is the seam the workflow calls through;
//! [`GitHubActivities`] is the production implementation backed by the
//! GitHub client and the artifact sink.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, instrument};

use crate::adapters::{ClientConfig, ClientError, GitHubClient};
use crate::config::credentials::{resolve_credentials, CredentialError, Credentials, WorkflowArgs};
use crate::domain::{RawData, RepositoryCollection, SummaryStatistics, UserProfile};

use super::artifacts::{
    ArtifactError, OutputSink, REPOSITORIES_ARTIFACT, SUMMARY_STATS_ARTIFACT,
    USER_PROFILE_ARTIFACT,
};
use super::engine::ActivityContext;

/// Failure of a single step attempt
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] CredentialError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("Invalid step input: {0}")]
    InvalidInput(#[source] serde_json::Error),

    #[error("Failed to encode step output: {0}")]
    Encode(#[source] serde_json::Error),
}

impl StepError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Client(e) => e.kind(),
            Self::Artifact(_) => "persistence",
            Self::InvalidInput(_) => "invalid_input",
            Self::Encode(_) => "encode",
        }
    }

    /// Configuration and payload errors fail the step immediately
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Configuration(_) | Self::InvalidInput(_) | Self::Encode(_) => false,
            Self::Client(e) => e.is_retryable(),
            Self::Artifact(ArtifactError::Write { .. }) => true,
            Self::Artifact(ArtifactError::Serialize { .. }) => false,
        }
    }
}

/// The steps of the connector workflow
#[async_trait]
pub trait Activities: Send + Sync {
    /// Fail fast when credentials are missing or rejected. Probes the
    /// profile endpoint once and discards the result.
    async fn preflight_check(
        &self,
        ctx: &ActivityContext,
        args: &WorkflowArgs,
    ) -> Result<(), StepError>;

    async fn retrieve_user_profile(
        &self,
        ctx: &ActivityContext,
        args: &WorkflowArgs,
    ) -> Result<UserProfile, StepError>;

    async fn retrieve_repositories(
        &self,
        ctx: &ActivityContext,
        args: &WorkflowArgs,
    ) -> Result<RepositoryCollection, StepError>;

    /// Legacy tagging step. Tags are no longer computed; the listing passes
    /// through unchanged.
    async fn extract_keywords(
        &self,
        _ctx: &ActivityContext,
        repositories: RepositoryCollection,
    ) -> Result<RepositoryCollection, StepError> {
        Ok(repositories)
    }

    /// Aggregate statistics. No network I/O.
    async fn compute_summary_stats(
        &self,
        ctx: &ActivityContext,
        raw: &RawData,
    ) -> Result<SummaryStatistics, StepError>;
}

/// Steps backed by the GitHub REST API, persisting into an output directory
#[derive(Debug, Clone)]
pub struct GitHubActivities {
    client_config: ClientConfig,
    sink: OutputSink,
}

impl GitHubActivities {
    pub fn new(client_config: ClientConfig, sink: OutputSink) -> Self {
        Self {
            client_config,
            sink,
        }
    }

    /// Every attempt gets its own client and HTTP session
    fn client(&self, token: Option<String>) -> GitHubClient {
        GitHubClient::with_config(self.client_config.clone(), token)
    }

    /// Username is required for any fetch; the token is optional
    fn resolve(args: &WorkflowArgs) -> Result<(String, Option<String>), StepError> {
        let (username, token) = resolve_credentials(args);
        let username = username.ok_or(CredentialError::MissingUsername)?;
        Ok((username, token))
    }
}

#[async_trait]
impl Activities for GitHubActivities {
    #[instrument(skip_all, fields(attempt = ctx.attempt()))]
    async fn preflight_check(
        &self,
        ctx: &ActivityContext,
        args: &WorkflowArgs,
    ) -> Result<(), StepError> {
        let creds = Credentials::require(args)?;
        info!(username = %creds.username, "Credentials resolved, probing profile endpoint");

        self.client(Some(creds.token))
            .fetch_user_profile(&creds.username)
            .await?;
        ctx.heartbeat();

        info!(username = %creds.username, "Preflight check passed");
        Ok(())
    }

    #[instrument(skip_all, fields(attempt = ctx.attempt()))]
    async fn retrieve_user_profile(
        &self,
        ctx: &ActivityContext,
        args: &WorkflowArgs,
    ) -> Result<UserProfile, StepError> {
        let (username, token) = Self::resolve(args)?;

        let profile = self.client(token).fetch_user_profile(&username).await?;
        ctx.heartbeat();

        let path = self.sink.write_json(USER_PROFILE_ARTIFACT, &profile).await?;
        info!(%username, path = %path.display(), "User profile saved");

        Ok(profile)
    }

    #[instrument(skip_all, fields(attempt = ctx.attempt()))]
    async fn retrieve_repositories(
        &self,
        ctx: &ActivityContext,
        args: &WorkflowArgs,
    ) -> Result<RepositoryCollection, StepError> {
        let (username, token) = Self::resolve(args)?;

        let repositories = self
            .client(token)
            .fetch_all_repositories_with(&username, |_, _| ctx.heartbeat())
            .await?;

        let path = self
            .sink
            .write_json(REPOSITORIES_ARTIFACT, &repositories)
            .await?;
        info!(
            %username,
            count = repositories.len(),
            path = %path.display(),
            "Repositories saved"
        );

        Ok(repositories)
    }

    #[instrument(skip_all, fields(attempt = ctx.attempt()))]
    async fn compute_summary_stats(
        &self,
        ctx: &ActivityContext,
        raw: &RawData,
    ) -> Result<SummaryStatistics, StepError> {
        let stats = SummaryStatistics::from(raw);
        ctx.heartbeat();

        let path = self.sink.write_json(SUMMARY_STATS_ARTIFACT, &stats).await?;
        info!(
            total_public_repos = stats.total_public_repos,
            path = %path.display(),
            "Summary statistics saved"
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RepositoryRecord, StepKind};
    use serde_json::json;
    use tempfile::TempDir;

    fn offline_activities(dir: &std::path::Path) -> GitHubActivities {
        let config = ClientConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        GitHubActivities::new(config, OutputSink::new(dir))
    }

    #[test]
    fn test_retryability_classification() {
        assert!(!StepError::Configuration(CredentialError::MissingToken).is_retryable());
        assert!(StepError::Client(ClientError::RemoteHttp {
            path: "/users/x".to_string(),
            page: Some(2),
            status: 500,
            body: String::new(),
        })
        .is_retryable());
        assert!(!StepError::Client(ClientError::PaginationLimitExceeded {
            username: "x".to_string(),
            limit: 1,
        })
        .is_retryable());
    }

    #[tokio::test]
    async fn test_keyword_extraction_is_passthrough() {
        let temp = TempDir::new().unwrap();
        let activities = offline_activities(temp.path());
        let repos = vec![RepositoryRecord {
            name: Some("hello-world".to_string()),
            ..Default::default()
        }];

        let out = activities
            .extract_keywords(&ActivityContext::detached(StepKind::ExtractKeywords), repos.clone())
            .await
            .unwrap();

        assert_eq!(out, repos);
    }

    #[tokio::test]
    async fn test_summary_stats_are_persisted() {
        let temp = TempDir::new().unwrap();
        let activities = offline_activities(temp.path());
        let profile = UserProfile::from_json(&json!({
            "login": "octocat",
            "followers": 10,
            "following": 3,
            "public_gists": 2
        }));
        let raw = RawData {
            user_data: profile,
            repo_data: vec![RepositoryRecord::default(); 3],
        };

        let ctx = ActivityContext::detached(StepKind::ComputeSummaryStats);
        let stats = activities.compute_summary_stats(&ctx, &raw).await.unwrap();

        assert_eq!(stats.total_public_repos, 3);
        assert_eq!(ctx.heartbeats(), 1);

        let written: SummaryStatistics = serde_json::from_str(
            &std::fs::read_to_string(temp.path().join(SUMMARY_STATS_ARTIFACT)).unwrap(),
        )
        .unwrap();
        assert_eq!(written, stats);
    }
}
