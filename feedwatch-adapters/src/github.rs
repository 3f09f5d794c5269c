//! Tracking issues via the GitHub REST API.
//!
//! ## Example
//!
//! ```rust,no_run
//! use feedwatch_adapters::github::{GitHubIssues, IssueTracker, NewIssue};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let issues = GitHubIssues::builder()
//!         .repository("octo/alerts")
//!         .token(std::env::var("GITHUB_TOKEN")?)
//!         .build()?;
//!
//!     let open = issues.open_issues().await?;
//!     if !open.iter().any(|i| i.title == "Release 2.1.0") {
//!         issues.create_issue(&NewIssue::new("Release 2.1.0", "New release")).await?;
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::AdapterError;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const PAGE_SIZE: usize = 100;
const MAX_PAGES: u32 = 10;

/// An issue as returned by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssueRef {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// Payload for creating an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assignees: Vec<String>,
}

impl NewIssue {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            assignees: Vec::new(),
        }
    }

    pub fn with_assignees(mut self, assignees: Vec<String>) -> Self {
        self.assignees = assignees;
        self
    }
}

/// A tracking system that can list open issues and open new ones.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Currently open issues.
    async fn open_issues(&self) -> Result<Vec<IssueRef>, AdapterError>;

    /// Create an issue.
    async fn create_issue(&self, issue: &NewIssue) -> Result<IssueRef, AdapterError>;
}

/// GitHub Issues client for one repository.
#[derive(Debug, Clone)]
pub struct GitHubIssues {
    client: Client,
    api_url: String,
    repository: String,
    token: Option<String>,
}

impl GitHubIssues {
    /// Create a new builder for configuring the client.
    pub fn builder() -> GitHubIssuesBuilder {
        GitHubIssuesBuilder::default()
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    fn issues_url(&self) -> String {
        format!(
            "{}/repos/{}/issues",
            self.api_url.trim_end_matches('/'),
            self.repository
        )
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, AdapterError> {
        let token = self
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AdapterError::Config("GITHUB_TOKEN is not set".to_string()))?;

        Ok(request
            .header(reqwest::header::AUTHORIZATION, format!("token {}", token))
            .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json"))
    }

    fn rejected_token(&self, status: StatusCode) -> AdapterError {
        AdapterError::Config(format!(
            "GitHub rejected the token for {} (status {})",
            self.repository, status
        ))
    }
}

fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// An entry of the open-issue listing.
#[derive(Deserialize)]
struct ListedIssue {
    #[serde(flatten)]
    issue: IssueRef,
    #[serde(default)]
    pull_request: Option<serde::de::IgnoredAny>,
}

#[async_trait]
impl IssueTracker for GitHubIssues {
    async fn open_issues(&self) -> Result<Vec<IssueRef>, AdapterError> {
        let url = self.issues_url();
        let mut issues = Vec::new();

        for page in 1..=MAX_PAGES {
            let request = self.client.get(&url).query(&[
                ("state", "open".to_string()),
                ("per_page", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ]);
            let response = self.authorized(request)?.send().await?;

            let status = response.status();
            if is_auth_failure(status) {
                return Err(self.rejected_token(status));
            }
            if !status.is_success() {
                return Err(AdapterError::Notify(format!(
                    "listing issues of {} returned status {}",
                    self.repository, status
                )));
            }

            let batch: Vec<ListedIssue> = response
                .json()
                .await
                .map_err(|e| AdapterError::Notify(format!("invalid issue list: {}", e)))?;
            let short_page = batch.len() < PAGE_SIZE;
            // The issues endpoint also lists pull requests.
            issues.extend(
                batch
                    .into_iter()
                    .filter(|listed| listed.pull_request.is_none())
                    .map(|listed| listed.issue),
            );
            if short_page {
                break;
            }
        }

        debug!(repository = %self.repository, count = issues.len(), "Fetched open issues");
        Ok(issues)
    }

    async fn create_issue(&self, issue: &NewIssue) -> Result<IssueRef, AdapterError> {
        let request = self.client.post(self.issues_url()).json(issue);
        let response = self.authorized(request)?.send().await?;

        let status = response.status();
        if is_auth_failure(status) {
            return Err(self.rejected_token(status));
        }
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Notify(format!(
                "creating issue in {} returned status {}: {}",
                self.repository, status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AdapterError::Notify(format!("invalid create response: {}", e)))
    }
}

/// Builder for GitHubIssues.
#[derive(Debug, Default)]
pub struct GitHubIssuesBuilder {
    client: Option<Client>,
    api_url: Option<String>,
    repository: Option<String>,
    token: Option<String>,
}

impl GitHubIssuesBuilder {
    /// Reuse an existing HTTP client (e.g. the feed session).
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the API base URL (default: `https://api.github.com`).
    pub fn api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    /// Set the `owner/name` repository issues are filed in.
    pub fn repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    /// Set the API token. Without one, every call fails with a config error.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Optional variant of [`token`](Self::token).
    pub fn maybe_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<GitHubIssues, AdapterError> {
        let repository = self
            .repository
            .filter(|r| r.contains('/'))
            .ok_or_else(|| AdapterError::Config("issue repository must be 'owner/name'".into()))?;

        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .user_agent(crate::transport::default_user_agent())
                .build()
                .map_err(|e| AdapterError::Http(e.to_string()))?,
        };

        Ok(GitHubIssues {
            client,
            api_url: self.api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            repository,
            token: self.token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_server::{response, MockServer};

    #[test]
    fn test_builder_defaults() {
        let issues = GitHubIssues::builder()
            .repository("traktuner/actions")
            .build()
            .unwrap();
        assert_eq!(issues.api_url, DEFAULT_API_URL);
        assert_eq!(
            issues.issues_url(),
            "https://api.github.com/repos/traktuner/actions/issues"
        );
        assert!(issues.token.is_none());
    }

    #[test]
    fn test_builder_rejects_bad_repository() {
        assert!(matches!(
            GitHubIssues::builder().repository("actions").build(),
            Err(AdapterError::Config(_))
        ));
        assert!(GitHubIssues::builder().build().is_err());
    }

    #[test]
    fn test_enterprise_api_url() {
        let issues = GitHubIssues::builder()
            .api_url("https://ghe.local/api/v3/")
            .repository("ops/alerts")
            .build()
            .unwrap();
        assert_eq!(issues.issues_url(), "https://ghe.local/api/v3/repos/ops/alerts/issues");
    }

    #[tokio::test]
    async fn test_missing_token_is_config_error() {
        let issues = GitHubIssues::builder()
            .repository("ops/alerts")
            .maybe_token(Some(String::new()))
            .build()
            .unwrap();

        let err = issues.open_issues().await.unwrap_err();
        assert!(err.is_config());
    }

    fn issue_json(number: u64, title: &str) -> serde_json::Value {
        serde_json::json!({
            "number": number,
            "title": title,
            "html_url": format!("https://github.com/ops/alerts/issues/{}", number),
            "state": "open"
        })
    }

    fn client_for(server: &MockServer) -> GitHubIssues {
        GitHubIssues::builder()
            .api_url(server.base_url.clone())
            .repository("ops/alerts")
            .token("t0ken")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_issues_pages_until_short_page() {
        let full: Vec<_> = (1..=100).map(|n| issue_json(n, &format!("Issue {}", n))).collect();
        let mut pull = issue_json(102, "New version detected for Drive: 2.1.0");
        pull["pull_request"] = serde_json::json!({"url": "https://api.github.com/pulls/102"});
        let last = vec![issue_json(101, "Issue 101"), pull];

        let server = MockServer::start(vec![
            response(200, &serde_json::Value::from(full).to_string()),
            response(200, &serde_json::Value::from(last).to_string()),
        ])
        .await;

        let issues = client_for(&server).open_issues().await.unwrap();

        assert_eq!(issues.len(), 101);
        assert!(issues.iter().all(|i| i.number != 102));

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].starts_with("GET /repos/ops/alerts/issues?state=open&per_page=100&page=1 "));
        assert!(requests[1].contains("page=2 "));
    }

    #[tokio::test]
    async fn test_rejected_token_is_config_error() {
        let server = MockServer::start(vec![
            response(401, r#"{"message": "Bad credentials"}"#),
            response(403, r#"{"message": "Forbidden"}"#),
        ])
        .await;
        let issues = client_for(&server);

        assert!(issues.open_issues().await.unwrap_err().is_config());
        let err = issues
            .create_issue(&NewIssue::new("T", "B"))
            .await
            .unwrap_err();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_create_issue() {
        let server = MockServer::start(vec![
            response(201, &issue_json(7, "New version detected for Drive: 2.1.0").to_string()),
            response(422, r#"{"message": "Validation Failed"}"#),
        ])
        .await;
        let issues = client_for(&server);

        let created = issues
            .create_issue(&NewIssue::new("New version detected for Drive: 2.1.0", "body"))
            .await
            .unwrap();
        assert_eq!(created.number, 7);
        assert!(server.requests()[0].starts_with("POST /repos/ops/alerts/issues "));

        let err = issues
            .create_issue(&NewIssue::new("T", "B"))
            .await
            .unwrap_err();
        match err {
            AdapterError::Notify(msg) => assert!(msg.contains("422") && msg.contains("Validation Failed")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_new_issue_serialization() {
        let issue = NewIssue::new("New version", "body");
        assert_eq!(
            serde_json::to_value(&issue).unwrap(),
            serde_json::json!({"title": "New version", "body": "body"})
        );

        let assigned = issue.with_assignees(vec!["traktuner".into()]);
        assert_eq!(
            serde_json::to_value(&assigned).unwrap()["assignees"],
            serde_json::json!(["traktuner"])
        );
    }

    #[test]
    fn test_issue_ref_deserialization() {
        let issue: IssueRef = serde_json::from_str(
            r#"{"number": 42, "title": "T", "html_url": "https://github.com/o/r/issues/42", "state": "open"}"#,
        )
        .unwrap();
        assert_eq!(issue.number, 42);
        assert_eq!(issue.title, "T");
    }
}
