use issuekb_api::GitHubIssue;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::models::{IssueRecord, UNKNOWN_AUTHOR};
use crate::storage;

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"http\S+").unwrap());
static HTML_TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<.*?>").unwrap());
static PUNCTUATION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[[:punct:]]").unwrap());
static DIGITS_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());
static WHITESPACE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Normalize issue text for embedding.
///
/// Lowercases, drops URLs and HTML tags, turns ASCII punctuation and digit
/// runs into spaces, then collapses whitespace. Running it twice gives the
/// same result as running it once.
pub fn clean_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let text = text.to_lowercase();
    let text = URL_PATTERN.replace_all(&text, "");
    let text = HTML_TAG_PATTERN.replace_all(&text, "");
    // removing a tag can glue a URL back together ("ht<b>tp://")
    let text = URL_PATTERN.replace_all(&text, "");
    let text = PUNCTUATION_PATTERN.replace_all(&text, " ");
    let text = DIGITS_PATTERN.replace_all(&text, " ");
    let text = WHITESPACE_PATTERN.replace_all(&text, " ");

    text.trim().to_string()
}

/// Turn one crawled issue into a row, or `None` if nothing is left after cleaning
pub fn process_issue(issue: &GitHubIssue) -> Option<IssueRecord> {
    let body = issue.body.clone().unwrap_or_default();
    let cleaned_content = clean_text(&format!("{} {}", issue.title, body));

    if cleaned_content.is_empty() {
        debug!("Dropping issue #{}: no text after cleaning", issue.number);
        return None;
    }

    Some(IssueRecord {
        id: issue.id,
        number: issue.number,
        title: issue.title.clone(),
        body,
        cleaned_content,
        state: issue.state,
        created_at: issue.created_at,
        updated_at: issue.updated_at,
        author: issue
            .author_login()
            .unwrap_or(UNKNOWN_AUTHOR)
            .to_string(),
        comments: issue.comments,
        labels: issue.labels.iter().map(|label| label.name.clone()).collect(),
    })
}

/// Build the processed table, keeping crawl order
pub fn preprocess_issues(raw_issues: &[GitHubIssue]) -> Vec<IssueRecord> {
    let records: Vec<IssueRecord> = raw_issues.iter().filter_map(process_issue).collect();
    info!(
        "Processed {} issues ({} dropped as empty)",
        records.len(),
        raw_issues.len() - records.len()
    );
    records
}

pub fn save_records(records: &[IssueRecord], path: &Path) -> crate::Result<()> {
    storage::save_msgpack(records, path)?;
    info!("Saved {} processed issues to {}", records.len(), path.display());
    Ok(())
}

pub fn load_records(path: &Path) -> crate::Result<Vec<IssueRecord>> {
    let records: Vec<IssueRecord> = storage::load_msgpack(path)?;
    info!("Loaded {} processed issues from {}", records.len(), path.display());
    Ok(records)
}
