//! Aggregate statistics over a fetched profile and its repositories.

use serde::{Deserialize, Serialize};

use super::profile::UserProfile;
use super::repository::RepositoryRecord;

/// Input bundle for the aggregation step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawData {
    pub user_data: UserProfile,
    pub repo_data: Vec<RepositoryRecord>,
}

/// Summary counts for one account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    pub total_public_repos: u64,
    pub total_followers: u64,
    pub total_following: u64,
    pub total_public_gists: u64,
}

impl SummaryStatistics {
    /// Compute statistics from a profile and its repository listing.
    ///
    /// The repository count is the length of the fetched listing, not the
    /// profile's self-reported `public_repos`.
    pub fn aggregate(profile: &UserProfile, repositories: &[RepositoryRecord]) -> Self {
        Self {
            total_public_repos: repositories.len() as u64,
            total_followers: profile.followers,
            total_following: profile.following,
            total_public_gists: profile.public_gists,
        }
    }
}

impl From<&RawData> for SummaryStatistics {
    fn from(raw: &RawData) -> Self {
        Self::aggregate(&raw.user_data, &raw.repo_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_aggregate_counts_fetched_repositories() {
        let profile = UserProfile::from_json(&json!({
            "followers": 10,
            "following": 3,
            "public_gists": 2,
            "public_repos": 99
        }));
        let repos = vec![
            RepositoryRecord::default(),
            RepositoryRecord {
                name: Some("b".into()),
                star_count: Some(1000),
                ..Default::default()
            },
            RepositoryRecord::default(),
        ];

        let stats = SummaryStatistics::aggregate(&profile, &repos);

        assert_eq!(
            stats,
            SummaryStatistics {
                total_public_repos: 3,
                total_followers: 10,
                total_following: 3,
                total_public_gists: 2,
            }
        );
    }

    #[test]
    fn test_aggregate_empty_listing() {
        let profile = UserProfile::from_json(&json!({}));
        let stats = SummaryStatistics::aggregate(&profile, &[]);

        assert_eq!(stats.total_public_repos, 0);
        assert_eq!(stats.total_followers, 0);
    }
}
