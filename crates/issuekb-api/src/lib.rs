// API client for the issue tracker
pub mod github;

// Re-export common types
pub use github::{
    GitHubClient, GitHubError, GitHubIssue, GitHubLabel, GitHubUser, IssueState, StateFilter,
};
