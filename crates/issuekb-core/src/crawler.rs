use async_trait::async_trait;
use issuekb_api::{GitHubError, GitHubIssue, StateFilter};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::CrawlerConfig;
use crate::storage;

/// One page of the issue listing at a time
///
/// GitHub implements this in `providers::github`; tests swap in a mock so the
/// paging loop can be exercised without a network.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IssuePageSource: Send + Sync {
    async fn fetch_page(
        &self,
        state: StateFilter,
        per_page: u32,
        page: u32,
    ) -> std::result::Result<Vec<GitHubIssue>, GitHubError>;
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub state: StateFilter,
    pub per_page: u32,
    pub page_delay: Duration,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self::from(&CrawlerConfig::default())
    }
}

impl From<&CrawlerConfig> for CrawlOptions {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            state: config.state,
            per_page: config.per_page,
            page_delay: config.page_delay(),
        }
    }
}

/// Pages through the issue listing and keeps the real issues
pub struct Crawler<S> {
    source: S,
    options: CrawlOptions,
}

impl<S: IssuePageSource> Crawler<S> {
    pub fn new(source: S, options: CrawlOptions) -> Self {
        Self { source, options }
    }

    /// Fetch every page until the listing runs out.
    ///
    /// Stops after a short page (fewer than `per_page` entries) or an empty
    /// one. A failed page ends the crawl: the error is logged and the issues
    /// collected so far are returned. Pull requests are dropped.
    pub async fn fetch_issues(&self) -> Vec<GitHubIssue> {
        let per_page = self.options.per_page;
        let mut issues = Vec::new();
        let mut page = 1u32;

        loop {
            let batch = match self
                .source
                .fetch_page(self.options.state, per_page, page)
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(
                        "Error fetching issues page {}: {}. Keeping {} issues fetched so far",
                        page,
                        e,
                        issues.len()
                    );
                    break;
                }
            };

            if batch.is_empty() {
                debug!("Page {} is empty, done", page);
                break;
            }

            let page_len = batch.len();
            let before = issues.len();
            issues.extend(batch.into_iter().filter(|issue| !issue.is_pull_request()));
            info!("Fetched page {} with {} issues", page, issues.len() - before);

            if page_len < per_page as usize {
                break;
            }

            page += 1;
            tokio::time::sleep(self.options.page_delay).await;
        }

        issues
    }

    /// Crawl and persist the result as a JSON array at `raw_path`
    pub async fn run(&self, raw_path: &Path) -> crate::Result<Vec<GitHubIssue>> {
        info!("Starting to fetch issues");
        let issues = self.fetch_issues().await;
        save_raw_issues(&issues, raw_path)?;
        Ok(issues)
    }
}

pub fn save_raw_issues(issues: &[GitHubIssue], path: &Path) -> crate::Result<()> {
    storage::save_json(issues, path)?;
    info!("Saved {} issues to {}", issues.len(), path.display());
    Ok(())
}

pub fn load_raw_issues(path: &Path) -> crate::Result<Vec<GitHubIssue>> {
    let issues: Vec<GitHubIssue> = storage::load_json(path)?;
    info!("Loaded {} raw issues from {}", issues.len(), path.display());
    Ok(issues)
}
