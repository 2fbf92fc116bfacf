//! GitHub REST API client for profile and repository metadata.
//!
//! One authenticated HTTP session is built lazily on first use and reused
//! for every call made through the same client instance.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::repository::RawRepository;
use crate::domain::{RepositoryCollection, RepositoryRecord, UserProfile};

/// Public GitHub API endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Media type requested from the API
pub const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

/// Repositories requested per page
pub const PER_PAGE: u32 = 100;

/// GitHub rejects requests without a User-Agent
const USER_AGENT: &str = concat!("github-connector/", env!("CARGO_PKG_VERSION"));

/// Connection settings for the GitHub client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// API endpoint (overridable for GitHub Enterprise or tests)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Upper bound on repository pages fetched for one account
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_timeout_seconds() -> u64 {
    30
}
fn default_max_pages() -> u32 {
    1000
} // 100k repositories

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
            max_pages: default_max_pages(),
        }
    }
}

/// Errors raised while talking to the GitHub API
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("Personal access token contains characters not allowed in a header")]
    InvalidToken,

    #[error("Transport error on GET {path}{}: {source}", page_suffix(.page))]
    Transport {
        path: String,
        page: Option<u32>,
        #[source]
        source: reqwest::Error,
    },

    #[error("GitHub returned HTTP {status} for GET {path}{}: {body}", page_suffix(.page))]
    RemoteHttp {
        path: String,
        page: Option<u32>,
        status: u16,
        body: String,
    },

    #[error("Unexpected payload from GET {path}{}: {source}", page_suffix(.page))]
    Decode {
        path: String,
        page: Option<u32>,
        #[source]
        source: serde_json::Error,
    },

    #[error("Repository listing for '{username}' did not end within {limit} non-empty pages")]
    PaginationLimitExceeded { username: String, limit: u32 },
}

fn page_suffix(page: &Option<u32>) -> String {
    page.map(|p| format!(" (page {})", p)).unwrap_or_default()
}

impl ClientError {
    /// Short classification used in journals and run reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Build(_) | Self::InvalidToken => "client_setup",
            Self::Transport { .. } => "transport",
            Self::RemoteHttp { .. } => "remote_http",
            Self::Decode { .. } => "decode",
            Self::PaginationLimitExceeded { .. } => "pagination_limit_exceeded",
        }
    }

    /// Whether a fresh attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::RemoteHttp { .. } | Self::Decode { .. }
        )
    }

    /// HTTP status of a non-2xx response
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::RemoteHttp { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Repository page the failure happened on
    pub fn page(&self) -> Option<u32> {
        match self {
            Self::Transport { page, .. }
            | Self::RemoteHttp { page, .. }
            | Self::Decode { page, .. } => *page,
            _ => None,
        }
    }
}

/// Thin client over the GitHub REST API
pub struct GitHubClient {
    config: ClientConfig,
    /// Personal access token (never logged)
    token: Option<String>,
    /// Lazily built HTTP session
    http: OnceLock<reqwest::Client>,
}

impl GitHubClient {
    /// Create a client against the public API
    pub fn new(token: Option<String>) -> Self {
        Self::with_config(ClientConfig::default(), token)
    }

    /// Create a client with explicit connection settings
    pub fn with_config(config: ClientConfig, token: Option<String>) -> Self {
        Self {
            config,
            token: token.filter(|t| !t.is_empty()),
            http: OnceLock::new(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the HTTP session, building it on first use
    fn http(&self) -> Result<&reqwest::Client, ClientError> {
        if let Some(client) = self.http.get() {
            return Ok(client);
        }

        let client = self.build_http()?;
        Ok(self.http.get_or_init(|| client))
    }

    fn build_http(&self) -> Result<reqwest::Client, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));

        match self.token {
            Some(ref token) => {
                info!("Configuring GitHub client with personal access token");
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|_| ClientError::InvalidToken)?;
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            None => {
                warn!("GitHub client is not authenticated; rate limits will be lower");
            }
        }

        reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .build()
            .map_err(ClientError::Build)
    }

    /// Build API URL
    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Issue a GET and decode the JSON body, failing on any non-2xx status
    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
        page: Option<u32>,
    ) -> Result<Value, ClientError> {
        let http = self.http()?;
        let transport = |source| ClientError::Transport {
            path: path.to_string(),
            page,
            source,
        };

        let response = http
            .get(self.api_url(path))
            .query(query)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        if !status.is_success() {
            return Err(ClientError::RemoteHttp {
                path: path.to_string(),
                page,
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|source| ClientError::Decode {
            path: path.to_string(),
            page,
            source,
        })
    }

    /// Retrieve and normalize the profile of a user or organization
    #[instrument(skip(self))]
    pub async fn fetch_user_profile(&self, username: &str) -> Result<UserProfile, ClientError> {
        let path = format!("/users/{}", username);

        match self.get_json(&path, &[], None).await {
            Ok(user_json) => {
                debug!("Fetched raw user data");
                Ok(UserProfile::from_json(&user_json))
            }
            Err(e) => {
                error!(kind = e.kind(), status = ?e.status_code(), error = %e, "Failed to fetch user profile");
                Err(e)
            }
        }
    }

    /// Retrieve every public repository of an account
    pub async fn fetch_all_repositories(
        &self,
        username: &str,
    ) -> Result<RepositoryCollection, ClientError> {
        self.fetch_all_repositories_with(username, |_, _| {}).await
    }

    /// Retrieve every public repository, calling `on_page(page, items)` after
    /// each non-empty page.
    ///
    /// Pages are requested sequentially until one comes back empty. Any
    /// failing page aborts the whole listing; nothing partial is returned.
    #[instrument(skip(self, on_page))]
    pub async fn fetch_all_repositories_with<F>(
        &self,
        username: &str,
        mut on_page: F,
    ) -> Result<RepositoryCollection, ClientError>
    where
        F: FnMut(u32, usize) + Send,
    {
        let path = format!("/users/{}/repos", username);
        let mut repositories: RepositoryCollection = Vec::new();
        let mut page = 1u32;

        loop {
            let query = [("page", page.to_string()), ("per_page", PER_PAGE.to_string())];
            let body = match self.get_json(&path, &query, Some(page)).await {
                Ok(body) => body,
                Err(e) => {
                    error!(page, kind = e.kind(), status = ?e.status_code(), error = %e, "Repository page failed");
                    return Err(e);
                }
            };

            let items: Vec<RawRepository> =
                serde_json::from_value(body).map_err(|source| ClientError::Decode {
                    path: path.clone(),
                    page: Some(page),
                    source,
                })?;

            if items.is_empty() {
                break;
            }

            // The cap counts non-empty pages; one past it only confirms the end
            if page > self.config.max_pages {
                error!(limit = self.config.max_pages, "Repository listing never ended");
                return Err(ClientError::PaginationLimitExceeded {
                    username: username.to_string(),
                    limit: self.config.max_pages,
                });
            }

            debug!(page, items = items.len(), "Fetched repository page");
            on_page(page, items.len());
            repositories.extend(items.into_iter().map(RepositoryRecord::from));
            page += 1;
        }

        info!(
            repositories = repositories.len(),
            pages = page,
            "Finished fetching all repositories"
        );
        Ok(repositories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url() {
        let client = GitHubClient::with_config(
            ClientConfig {
                base_url: "http://127.0.0.1:1234/".to_string(),
                ..Default::default()
            },
            None,
        );
        assert_eq!(client.api_url("/users/octocat"), "http://127.0.0.1:1234/users/octocat");

        let client = GitHubClient::new(None);
        assert_eq!(
            client.api_url("/users/octocat/repos"),
            "https://api.github.com/users/octocat/repos"
        );
    }

    #[test]
    fn test_empty_token_is_unauthenticated() {
        assert!(!GitHubClient::new(Some(String::new())).is_authenticated());
        assert!(!GitHubClient::new(None).is_authenticated());
        assert!(GitHubClient::new(Some("ghp_x".to_string())).is_authenticated());
    }

    #[test]
    fn test_session_is_built_once() {
        let client = GitHubClient::new(Some("ghp_x".to_string()));
        let first = client.http().unwrap() as *const reqwest::Client;
        let second = client.http().unwrap() as *const reqwest::Client;
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_token_rejected() {
        let client = GitHubClient::new(Some("bad\ntoken".to_string()));
        assert!(matches!(client.http(), Err(ClientError::InvalidToken)));
    }

    #[test]
    fn test_error_classification() {
        let err = ClientError::RemoteHttp {
            path: "/users/x/repos".to_string(),
            page: Some(2),
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.kind(), "remote_http");
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), Some(500));
        assert_eq!(err.page(), Some(2));
        assert_eq!(
            err.to_string(),
            "GitHub returned HTTP 500 for GET /users/x/repos (page 2): boom"
        );

        let err = ClientError::PaginationLimitExceeded {
            username: "x".to_string(),
            limit: 3,
        };
        assert!(!err.is_retryable());
        assert_eq!(err.page(), None);
    }

    #[test]
    fn test_client_config_defaults() {
        let config: ClientConfig = serde_yaml::from_str("max_pages: 5").unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout_seconds, 30);
        assert_eq!(config.max_pages, 5);
    }
}
