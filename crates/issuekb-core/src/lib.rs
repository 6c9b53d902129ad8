// Pipeline glue: configuration, crawling and text processing
pub mod config;
pub mod crawler;
pub mod error;
pub mod models;
pub mod processor;
pub mod providers;
pub mod storage;

pub use config::{ClusterMethod, Config};
pub use crawler::{CrawlOptions, Crawler, IssuePageSource};
pub use error::Error;
pub use issuekb_api::GitHubIssue;
pub use models::IssueRecord;
pub use providers::GitHubIssueSource;

/// Result type alias because typing Result<T, Error> everywhere is tedious
pub type Result<T> = std::result::Result<T, Error>;
