// GitHub provider - bridges the API client with the IssuePageSource trait
use async_trait::async_trait;
use issuekb_api::{GitHubClient, GitHubError, GitHubIssue, StateFilter};

use crate::{config::Config, crawler::IssuePageSource, Error, Result};

/// Wrapper around GitHubClient bound to one repository
pub struct GitHubIssueSource {
    client: GitHubClient,
    repo: String,
}

impl GitHubIssueSource {
    pub fn new(client: GitHubClient, repo: impl Into<String>) -> Self {
        Self {
            client,
            repo: repo.into(),
        }
    }

    /// Build the client from the `github` and `crawler` config groups
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = GitHubClient::with_base_url(
            config.github.access_token.clone(),
            config.github.api_url.clone(),
            config.crawler.timeout(),
        )
        .map_err(|e| Error::ApiError(e.to_string()))?;

        Ok(Self::new(client, config.github.repo.clone()))
    }
}

#[async_trait]
impl IssuePageSource for GitHubIssueSource {
    async fn fetch_page(
        &self,
        state: StateFilter,
        per_page: u32,
        page: u32,
    ) -> std::result::Result<Vec<GitHubIssue>, GitHubError> {
        self.client
            .list_issues_page(&self.repo, state, per_page, page)
            .await
    }
}
