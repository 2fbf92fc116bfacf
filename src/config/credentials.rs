//! Credential resolution for GitHub API calls.
//!
//! Resolution order: explicit workflow arguments first, then the process
//! environment. The environment is read on every call, never cached, so
//! overrides made after startup (tests, long-lived workers) are honored.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable holding the account to harvest
pub const USERNAME_ENV: &str = "GITHUB_USERNAME";

/// Environment variable holding the personal access token
pub const TOKEN_ENV: &str = "GITHUB_PAT";

/// Variables a worker expects to find at startup
pub const REQUIRED_ENV_VARS: [&str; 2] = [USERNAME_ENV, TOKEN_ENV];

/// Inbound run configuration. Absent values fall back to the environment.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pat: Option<String>,
}

impl WorkflowArgs {
    pub fn new(username: Option<String>, pat: Option<String>) -> Self {
        Self { username, pat }
    }

    pub fn for_user(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            pat: None,
        }
    }

    /// The same arguments with the token removed
    pub fn without_secrets(&self) -> Self {
        Self {
            username: self.username.clone(),
            pat: None,
        }
    }
}

impl fmt::Debug for WorkflowArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowArgs")
            .field("username", &self.username)
            .field("pat", &self.pat.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Missing pieces of the credential pair
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("Personal access token is missing (pass a pat or set GITHUB_PAT)")]
    MissingToken,

    #[error("GitHub username is missing (pass a username or set GITHUB_USERNAME)")]
    MissingUsername,
}

/// A fully resolved credential pair
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Resolve both halves, failing if either is absent
    pub fn require(args: &WorkflowArgs) -> Result<Self, CredentialError> {
        let (username, token) = resolve_credentials(args);
        let token = token.ok_or(CredentialError::MissingToken)?;
        let username = username.ok_or(CredentialError::MissingUsername)?;
        Ok(Self { username, token })
    }
}

/// Resolve username and token, preferring explicit arguments over the
/// environment. Empty strings count as absent.
pub fn resolve_credentials(args: &WorkflowArgs) -> (Option<String>, Option<String>) {
    let username = non_empty(args.username.clone()).or_else(|| env_var(USERNAME_ENV));
    let token = non_empty(args.pat.clone()).or_else(|| env_var(TOKEN_ENV));
    (username, token)
}

/// Names of required variables that are unset or empty
pub fn missing_env_vars() -> Vec<&'static str> {
    REQUIRED_ENV_VARS
        .into_iter()
        .filter(|name| env_var(name).is_none())
        .collect()
}

fn env_var(name: &str) -> Option<String> {
    non_empty(std::env::var(name).ok())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
