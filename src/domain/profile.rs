//! Normalized GitHub account profile.
//!
//! The upstream `/users/{username}` payload is loosely typed: almost every
//! field may be missing or `null`. Normalization maps it onto a shape where
//! every field is present, substituting sentinels for absent data.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Placeholder for missing string fields
pub const NOT_AVAILABLE: &str = "N/A";

/// Placeholder for a missing biography
pub const NO_BIO: &str = "No bio provided.";

/// Profile of a GitHub user or organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub node_id: String,
    pub profile_url: String,
    pub avatar_url: String,
    #[serde(rename = "type")]
    pub account_type: String,
    pub company: String,
    pub location: String,
    pub email: String,
    pub blog: String,
    pub twitter_username: String,
    pub created_at: String,
    pub followers_url: String,
    pub following_url: String,
    pub bio: String,
    pub followers: u64,
    pub following: u64,
    pub public_repos: u64,
    pub public_gists: u64,
}

impl UserProfile {
    /// Normalize a raw user payload.
    ///
    /// Total over any JSON value: non-objects, missing keys, `null`, empty
    /// strings and values of the wrong type all fall back to the sentinels.
    /// `name` falls back to `login` before the sentinel.
    pub fn from_json(raw: &Value) -> Self {
        let name = text(raw, "name")
            .or_else(|| text(raw, "login"))
            .unwrap_or(NOT_AVAILABLE)
            .to_string();

        Self {
            name,
            node_id: text_or_na(raw, "node_id"),
            profile_url: text_or_na(raw, "html_url"),
            avatar_url: text_or_na(raw, "avatar_url"),
            account_type: text_or_na(raw, "type"),
            company: text_or_na(raw, "company"),
            location: text_or_na(raw, "location"),
            email: text_or_na(raw, "email"),
            blog: text_or_na(raw, "blog"),
            twitter_username: text_or_na(raw, "twitter_username"),
            created_at: text_or_na(raw, "created_at"),
            followers_url: text_or_na(raw, "followers_url"),
            following_url: text_or_na(raw, "following_url"),
            bio: text(raw, "bio").unwrap_or(NO_BIO).to_string(),
            followers: count(raw, "followers"),
            following: count(raw, "following"),
            public_repos: count(raw, "public_repos"),
            public_gists: count(raw, "public_gists"),
        }
    }
}

fn text<'a>(raw: &'a Value, key: &str) -> Option<&'a str> {
    raw.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn text_or_na(raw: &Value, key: &str) -> String {
    text(raw, key).unwrap_or(NOT_AVAILABLE).to_string()
}

fn count(raw: &Value, key: &str) -> u64 {
    raw.get(key).and_then(Value::as_u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_payload() {
        let raw = json!({
            "login": "octocat",
            "name": "The Octocat",
            "node_id": "MDQ6VXNlcjU4MzIzMQ==",
            "html_url": "https://github.com/octocat",
            "avatar_url": "https://avatars.githubusercontent.com/u/583231",
            "type": "User",
            "company": "@github",
            "location": "San Francisco",
            "email": null,
            "blog": "https://github.blog",
            "twitter_username": null,
            "created_at": "2011-01-25T18:44:36Z",
            "followers_url": "https://api.github.com/users/octocat/followers",
            "following_url": "https://api.github.com/users/octocat/following{/other_user}",
            "bio": null,
            "followers": 20000,
            "following": 9,
            "public_repos": 8,
            "public_gists": 8
        });

        let profile = UserProfile::from_json(&raw);

        assert_eq!(profile.name, "The Octocat");
        assert_eq!(profile.profile_url, "https://github.com/octocat");
        assert_eq!(profile.account_type, "User");
        assert_eq!(profile.email, NOT_AVAILABLE);
        assert_eq!(profile.twitter_username, NOT_AVAILABLE);
        assert_eq!(profile.bio, NO_BIO);
        assert_eq!(profile.followers, 20000);
        assert_eq!(profile.public_gists, 8);
    }

    #[test]
    fn test_name_falls_back_to_login() {
        let profile = UserProfile::from_json(&json!({ "login": "ghost", "name": "" }));
        assert_eq!(profile.name, "ghost");

        let profile = UserProfile::from_json(&json!({ "name": null }));
        assert_eq!(profile.name, NOT_AVAILABLE);
    }

    #[test]
    fn test_normalization_is_total() {
        let inputs = [
            json!({}),
            json!(null),
            json!([1, 2, 3]),
            json!("not an object"),
            json!({ "followers": "many", "following": -4, "public_repos": 1.5 }),
            json!({ "bio": 42, "company": {}, "email": [] }),
        ];

        for raw in &inputs {
            let profile = UserProfile::from_json(raw);
            assert_eq!(profile.node_id, NOT_AVAILABLE, "input: {raw}");
            assert_eq!(profile.company, NOT_AVAILABLE, "input: {raw}");
            assert_eq!(profile.bio, NO_BIO, "input: {raw}");
            assert_eq!(profile.followers, 0, "input: {raw}");
            assert_eq!(profile.following, 0, "input: {raw}");
            assert_eq!(profile.public_repos, 0, "input: {raw}");
            assert_eq!(profile.public_gists, 0, "input: {raw}");
        }
    }

    #[test]
    fn test_type_field_serializes_as_type() {
        let profile = UserProfile::from_json(&json!({ "type": "Organization" }));
        let value = serde_json::to_value(&profile).unwrap();

        assert_eq!(value["type"], "Organization");
        assert!(value.get("account_type").is_none());
    }
}
