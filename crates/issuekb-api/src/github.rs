use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

const GITHUB_API_BASE: &str = "https://api.github.com";

/// Default per-request timeout. A page that takes longer aborts the crawl.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum GitHubError {
    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Repository not found: {0}")]
    NotFound(String),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    ParseError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GitHubError>;

/// Which issues to list, mirrors the `state` query parameter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateFilter {
    #[default]
    All,
    Open,
    Closed,
}

impl StateFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateFilter::All => "all",
            StateFilter::Open => "open",
            StateFilter::Closed => "closed",
        }
    }
}

impl std::fmt::Display for StateFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GitHub REST client, scoped to the issues listing
pub struct GitHubClient {
    client: reqwest::Client,
    token: Option<String>,
    base_url: String,
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Result<Self> {
        Self::with_base_url(token, GITHUB_API_BASE.to_string(), DEFAULT_TIMEOUT)
    }

    /// For GitHub Enterprise or a local test server
    pub fn with_base_url(
        token: Option<String>,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("IssueKB/0.1.0"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            token: token.filter(|t| !t.trim().is_empty()),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Issues endpoint for `owner/name`
    pub fn issues_url(&self, repo: &str) -> String {
        format!("{}/repos/{}/issues", self.base_url, repo)
    }

    /// Fetch one page of the issues listing, newest first.
    ///
    /// GitHub answers `422` once `page` runs past the end of the listing; that
    /// comes back as an empty page rather than an error. Pull requests are
    /// included here, callers filter them with [`GitHubIssue::is_pull_request`].
    pub async fn list_issues_page(
        &self,
        repo: &str,
        state: StateFilter,
        per_page: u32,
        page: u32,
    ) -> Result<Vec<GitHubIssue>> {
        let url = self.issues_url(repo);

        let mut request = self.client.get(&url).query(&[
            ("state", state.as_str()),
            ("per_page", &per_page.to_string()),
            ("page", &page.to_string()),
            ("sort", "created"),
            ("direction", "desc"),
        ]);

        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        debug!("GET {} page={} per_page={}", url, page, per_page);
        let response = request.send().await?;
        let status = response.status();

        match classify_status(status, repo)? {
            PageStatus::EndOfListing => {
                info!("Reached the last page of issues for {}", repo);
                return Ok(Vec::new());
            }
            PageStatus::Failed => {
                let body = response.text().await.unwrap_or_default();
                return Err(GitHubError::RequestFailed(format!(
                    "Status {}: {}",
                    status, body
                )));
            }
            PageStatus::Issues => {}
        }

        let bytes = response.bytes().await?;
        let issues: Vec<GitHubIssue> = serde_json::from_slice(&bytes)?;
        Ok(issues)
    }
}

/// How a listing response should be read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageStatus {
    /// Body is a JSON array of issues
    Issues,
    /// Paged past the end
    EndOfListing,
    /// Some other failure, the body holds the message
    Failed,
}

fn classify_status(status: StatusCode, repo: &str) -> Result<PageStatus> {
    match status {
        StatusCode::UNPROCESSABLE_ENTITY => Ok(PageStatus::EndOfListing),
        StatusCode::NOT_FOUND => Err(GitHubError::NotFound(repo.to_string())),
        StatusCode::UNAUTHORIZED => Err(GitHubError::AuthRequired),
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            Err(GitHubError::RateLimitExceeded)
        }
        s if s.is_success() => Ok(PageStatus::Issues),
        _ => Ok(PageStatus::Failed),
    }
}

/// Issue object as returned by `GET /repos/{repo}/issues`.
///
/// Only the fields the pipeline reads are typed; everything else is kept in
/// `extra` so the raw dump round-trips without losing data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GitHubIssue {
    pub id: u64,
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: IssueState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub user: Option<GitHubUser>,
    #[serde(default)]
    pub comments: u32,
    #[serde(default)]
    pub labels: Vec<GitHubLabel>,
    /// Present only on pull requests, which GitHub lists alongside issues
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl GitHubIssue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    pub fn author_login(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.login.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl std::fmt::Display for IssueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueState::Open => write!(f, "open"),
            IssueState::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GitHubUser {
    pub login: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GitHubLabel {
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
