//! GitHub Client Integration Tests
//!
//! Exercises profile retrieval and repository pagination against a stub
//! HTTP server.

use github_connector::adapters::{ClientConfig, ClientError, GitHubClient};
use github_connector::domain::{NOT_AVAILABLE, NO_BIO};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};

fn client_for(server: &ServerGuard, token: Option<&str>) -> GitHubClient {
    GitHubClient::with_config(
        ClientConfig {
            base_url: server.url(),
            ..Default::default()
        },
        token.map(str::to_string),
    )
}

/// A page of `count` repositories, named `repo-{offset + i}`
fn repo_page(offset: usize, count: usize) -> String {
    let items: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "name": format!("repo-{}", offset + i),
                "description": null,
                "language": "Rust",
                "stargazers_count": i,
                "forks_count": 0,
                "open_issues_count": 1,
                "created_at": "2020-01-01T00:00:00Z",
                "updated_at": "2024-01-01T00:00:00Z",
                "html_url": format!("https://github.com/octocat/repo-{}", offset + i)
            })
        })
        .collect();
    Value::Array(items).to_string()
}

async fn mock_page(server: &mut ServerGuard, page: u32, status: usize, body: String) -> Mock {
    server
        .mock("GET", "/users/octocat/repos")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("page".into(), page.to_string()),
            Matcher::UrlEncoded("per_page".into(), "100".into()),
        ]))
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .expect(1)
        .create_async()
        .await
}

#[tokio::test]
async fn test_profile_normalization_applies_sentinels() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/users/octocat")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "login": "octocat",
                "name": null,
                "bio": "",
                "type": "User",
                "html_url": "https://github.com/octocat",
                "followers": 10,
                "following": 3
            })
            .to_string(),
        )
        .create_async()
        .await;

    let profile = client_for(&server, None)
        .fetch_user_profile("octocat")
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(profile.name, "octocat");
    assert_eq!(profile.bio, NO_BIO);
    assert_eq!(profile.company, NOT_AVAILABLE);
    assert_eq!(profile.profile_url, "https://github.com/octocat");
    assert_eq!(profile.account_type, "User");
    assert_eq!(profile.followers, 10);
    assert_eq!(profile.public_gists, 0);
}

#[tokio::test]
async fn test_profile_http_error() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/users/ghost")
        .with_status(404)
        .with_body(r#"{"message":"Not Found"}"#)
        .create_async()
        .await;

    let err = client_for(&server, None)
        .fetch_user_profile("ghost")
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), Some(404));
    assert!(matches!(err, ClientError::RemoteHttp { ref body, .. } if body.contains("Not Found")));
}

#[tokio::test]
async fn test_pagination_stops_on_empty_page() {
    let mut server = Server::new_async().await;
    let pages = [
        mock_page(&mut server, 1, 200, repo_page(0, 100)).await,
        mock_page(&mut server, 2, 200, repo_page(100, 100)).await,
        mock_page(&mut server, 3, 200, repo_page(200, 37)).await,
        mock_page(&mut server, 4, 200, "[]".to_string()).await,
    ];

    let mut seen = Vec::new();
    let repos = client_for(&server, None)
        .fetch_all_repositories_with("octocat", |page, items| seen.push((page, items)))
        .await
        .unwrap();

    for mock in &pages {
        mock.assert_async().await;
    }
    assert_eq!(repos.len(), 237);
    assert_eq!(repos[0].name.as_deref(), Some("repo-0"));
    assert_eq!(repos[236].name.as_deref(), Some("repo-236"));
    assert_eq!(repos[0].description, None);
    assert_eq!(repos[0].issue_count, Some(1));
    assert_eq!(
        repos[5].url.as_deref(),
        Some("https://github.com/octocat/repo-5")
    );
    assert_eq!(seen, vec![(1, 100), (2, 100), (3, 37)]);
}

#[tokio::test]
async fn test_failing_page_aborts_listing() {
    let mut server = Server::new_async().await;
    let first = mock_page(&mut server, 1, 200, repo_page(0, 100)).await;
    let second = mock_page(&mut server, 2, 500, "server error".to_string()).await;
    let third = server
        .mock("GET", "/users/octocat/repos")
        .match_query(Matcher::UrlEncoded("page".into(), "3".into()))
        .with_status(200)
        .with_body("[]")
        .expect(0)
        .create_async()
        .await;

    let err = client_for(&server, None)
        .fetch_all_repositories("octocat")
        .await
        .unwrap_err();

    first.assert_async().await;
    second.assert_async().await;
    third.assert_async().await;
    assert_eq!(err.status_code(), Some(500));
    assert_eq!(err.page(), Some(2));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_sends_bearer_token_and_accept_header() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/users/octocat")
        .match_header("authorization", "Bearer ghp_test")
        .match_header("accept", "application/vnd.github.v3+json")
        .with_status(200)
        .with_body(r#"{"login":"octocat"}"#)
        .create_async()
        .await;

    let client = client_for(&server, Some("ghp_test"));
    assert!(client.is_authenticated());
    client.fetch_user_profile("octocat").await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_unauthenticated_requests_omit_authorization() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/users/octocat")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body(r#"{"login":"octocat"}"#)
        .create_async()
        .await;

    let client = client_for(&server, None);
    assert!(!client.is_authenticated());
    client.fetch_user_profile("octocat").await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_session_reused_across_calls() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/users/octocat")
        .with_status(200)
        .with_body(r#"{"login":"octocat"}"#)
        .expect(2)
        .create_async()
        .await;

    let client = client_for(&server, None);
    client.fetch_user_profile("octocat").await.unwrap();
    client.fetch_user_profile("octocat").await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_page_cap_reports_limit() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/users/octocat/repos")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(repo_page(0, 1))
        .expect(4)
        .create_async()
        .await;

    let client = GitHubClient::with_config(
        ClientConfig {
            base_url: server.url(),
            max_pages: 3,
            ..Default::default()
        },
        None,
    );

    let err = client.fetch_all_repositories("octocat").await.unwrap_err();

    assert!(matches!(
        err,
        ClientError::PaginationLimitExceeded { limit: 3, .. }
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_listing_of_exactly_max_pages_completes() {
    let mut server = Server::new_async().await;
    let mocks = vec![
        mock_page(&mut server, 1, 200, repo_page(0, 100)).await,
        mock_page(&mut server, 2, 200, repo_page(100, 100)).await,
        mock_page(&mut server, 3, 200, "[]".to_string()).await,
    ];

    let client = GitHubClient::with_config(
        ClientConfig {
            base_url: server.url(),
            max_pages: 2,
            ..Default::default()
        },
        None,
    );

    let repos = client.fetch_all_repositories("octocat").await.unwrap();

    for mock in &mocks {
        mock.assert_async().await;
    }
    assert_eq!(repos.len(), 200);
}

#[tokio::test]
async fn test_malformed_page_is_decode_error() {
    let mut server = Server::new_async().await;
    mock_page(&mut server, 1, 200, r#"{"not":"a list"}"#.to_string()).await;

    let err = client_for(&server, None)
        .fetch_all_repositories("octocat")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "decode");
    assert_eq!(err.page(), Some(1));
}
