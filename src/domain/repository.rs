//! Normalized repository records.

use serde::{Deserialize, Serialize};

/// One public repository, as listed by `/users/{username}/repos`.
///
/// Field presence mirrors upstream: anything GitHub omits or nulls stays
/// `None`. No sentinels are substituted here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub name: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub star_count: Option<u64>,
    pub fork_count: Option<u64>,
    pub issue_count: Option<u64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub url: Option<String>,
}

/// Ordered repositories of one account, in API page order
pub type RepositoryCollection = Vec<RepositoryRecord>;

/// Wire shape of a repository item. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawRepository {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    stargazers_count: Option<u64>,
    #[serde(default)]
    forks_count: Option<u64>,
    #[serde(default)]
    open_issues_count: Option<u64>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
}

impl From<RawRepository> for RepositoryRecord {
    fn from(raw: RawRepository) -> Self {
        Self {
            name: raw.name,
            description: raw.description,
            language: raw.language,
            star_count: raw.stargazers_count,
            fork_count: raw.forks_count,
            issue_count: raw.open_issues_count,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            url: raw.html_url,
        }
    }
}
