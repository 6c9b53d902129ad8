// Page sources for the crawler
pub mod github;

pub use github::GitHubIssueSource;
