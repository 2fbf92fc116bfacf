//! Adapters for external systems.
//!
//! The connector talks to exactly one remote service: the GitHub REST API.

pub mod github;

// Re-export the GitHub client
pub use github::{ClientConfig, ClientError, GitHubClient, DEFAULT_BASE_URL, PER_PAGE};
