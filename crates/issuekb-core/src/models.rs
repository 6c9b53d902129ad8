use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub use issuekb_api::IssueState;

/// Author handle used when GitHub reports no user (deleted accounts, ghosts)
pub const UNKNOWN_AUTHOR: &str = "unknown";

/// One cleaned issue - a row of the processed table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub id: u64,
    pub number: u64,
    pub title: String,
    /// Body as written, markdown and all
    pub body: String,
    /// Normalized `title + body`, the text that gets embedded
    pub cleaned_content: String,
    pub state: IssueState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: String,
    pub comments: u32,
    pub labels: BTreeSet<String>,
}
