//! Named units of work in the connector workflow.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed set of steps the workflow can invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Credential probe
    PreflightCheck,
    /// Profile retrieval
    RetrieveUserProfile,
    /// Paginated repository retrieval
    RetrieveRepositories,
    /// Legacy tagging step, now a passthrough
    ExtractKeywords,
    /// Aggregation over the fetched data
    ComputeSummaryStats,
}

impl StepKind {
    /// Steps the workflow runs, in invocation order.
    /// `ExtractKeywords` is not part of it.
    pub const WORKFLOW: [StepKind; 4] = [
        StepKind::PreflightCheck,
        StepKind::RetrieveUserProfile,
        StepKind::RetrieveRepositories,
        StepKind::ComputeSummaryStats,
    ];

    /// Stable name used in journals and logs
    pub fn name(self) -> &'static str {
        match self {
            Self::PreflightCheck => "preflight_check",
            Self::RetrieveUserProfile => "retrieve_user_profile",
            Self::RetrieveRepositories => "retrieve_repositories",
            Self::ExtractKeywords => "extract_keywords",
            Self::ComputeSummaryStats => "compute_summary_stats",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            Self::PreflightCheck,
            Self::RetrieveUserProfile,
            Self::RetrieveRepositories,
            Self::ExtractKeywords,
            Self::ComputeSummaryStats,
        ]
        .into_iter()
        .find(|step| step.name() == name)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
