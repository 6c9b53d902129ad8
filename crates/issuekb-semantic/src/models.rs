use chrono::{DateTime, Utc};
use issuekb_core::models::{IssueRecord, IssueState};
use issuekb_core::storage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::error::{Result, SemanticError};

/// Longest body preview shown in a search result, in characters
pub const PREVIEW_CHARS: usize = 200;

/// Dense vectors, one row per issue, all of the same dimension
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMatrix {
    dimension: usize,
    rows: Vec<Vec<f32>>,
    /// Encoder that produced the rows, saved with them
    #[serde(default)]
    model_name: Option<String>,
}

impl EmbeddingMatrix {
    /// An empty matrix that will hold vectors of `dimension`
    pub fn empty(dimension: usize) -> Self {
        Self {
            dimension,
            rows: Vec::new(),
            model_name: None,
        }
    }

    /// Build from rows, taking the dimension from the first one
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let dimension = rows.first().map(Vec::len).unwrap_or(0);
        Self::with_dimension(dimension, rows)
    }

    pub fn with_dimension(dimension: usize, rows: Vec<Vec<f32>>) -> Result<Self> {
        if let Some(bad) = rows.iter().find(|row| row.len() != dimension) {
            return Err(SemanticError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }
        Ok(Self {
            dimension,
            rows,
            model_name: None,
        })
    }

    /// Record the model the rows came from
    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = Some(model_name.into());
        self
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&[f32]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    /// Persist as a MessagePack blob. `f32` values are stored bit for bit.
    pub fn save(&self, path: &Path) -> Result<()> {
        storage::save_msgpack(self, path)?;
        info!(
            "Saved {} embeddings ({} dims) to {}",
            self.len(),
            self.dimension,
            path.display()
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw: EmbeddingMatrix = storage::load_msgpack(path)?;
        // re-validate, the blob could come from anywhere
        let mut matrix = Self::with_dimension(raw.dimension, raw.rows)?;
        matrix.model_name = raw.model_name;
        info!(
            "Loaded {} embeddings from {}",
            matrix.len(),
            path.display()
        );
        Ok(matrix)
    }
}

/// Cluster assignment for one issue
///
/// Density clustering leaves sparse points unassigned; they get `Noise`
/// rather than a magic negative id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClusterLabel {
    Cluster(u32),
    Noise,
}

impl ClusterLabel {
    pub fn is_noise(&self) -> bool {
        matches!(self, ClusterLabel::Noise)
    }
}

impl std::fmt::Display for ClusterLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterLabel::Cluster(id) => write!(f, "{}", id),
            ClusterLabel::Noise => write!(f, "noise"),
        }
    }
}

impl FromStr for ClusterLabel {
    type Err = SemanticError;

    /// Accepts a cluster id, `noise`, or the conventional `-1`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("noise") || s == "-1" {
            return Ok(ClusterLabel::Noise);
        }
        s.parse::<u32>()
            .map(ClusterLabel::Cluster)
            .map_err(|_| SemanticError::InvalidArgument(format!("Invalid cluster label: {}", s)))
    }
}

/// The searchable knowledge base: issues, their embeddings and cluster labels
///
/// Row `i` of every part describes the same issue. The constructors refuse
/// anything else.
#[derive(Debug, Clone)]
pub struct Corpus {
    model_name: String,
    records: Vec<IssueRecord>,
    embeddings: EmbeddingMatrix,
    labels: Option<Vec<ClusterLabel>>,
}

impl Corpus {
    /// `model_name` is the encoder that produced `embeddings`. A matrix that
    /// records a different model is rejected.
    pub fn new(
        model_name: impl Into<String>,
        records: Vec<IssueRecord>,
        embeddings: EmbeddingMatrix,
    ) -> Result<Self> {
        let model_name = model_name.into();
        if let Some(stored) = embeddings.model_name() {
            if stored != model_name {
                return Err(SemanticError::ConfigError(format!(
                    "Embeddings were produced by '{}', not '{}'",
                    stored, model_name
                )));
            }
        }

        if records.len() != embeddings.len() {
            return Err(SemanticError::ShapeMismatch {
                what: "embeddings",
                expected: records.len(),
                actual: embeddings.len(),
            });
        }

        Ok(Self {
            model_name,
            records,
            embeddings,
            labels: None,
        })
    }

    /// Attach cluster labels, one per record
    pub fn with_labels(mut self, labels: Vec<ClusterLabel>) -> Result<Self> {
        if labels.len() != self.records.len() {
            return Err(SemanticError::ShapeMismatch {
                what: "cluster labels",
                expected: self.records.len(),
                actual: labels.len(),
            });
        }
        self.labels = Some(labels);
        Ok(self)
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn records(&self) -> &[IssueRecord] {
        &self.records
    }

    pub fn embeddings(&self) -> &EmbeddingMatrix {
        &self.embeddings
    }

    pub fn label(&self, index: usize) -> Option<ClusterLabel> {
        self.labels.as_ref().and_then(|labels| labels.get(index).copied())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One ranked hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub issue_number: u64,
    pub title: String,
    /// First 200 characters of the body, `...` appended when cut
    pub body_preview: String,
    /// Cosine similarity to the query, always > 0
    pub similarity: f32,
    /// `None` when the corpus was never clustered
    pub cluster: Option<ClusterLabel>,
    pub state: IssueState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: String,
}

impl SearchResult {
    pub fn from_record(
        record: &IssueRecord,
        similarity: f32,
        cluster: Option<ClusterLabel>,
    ) -> Self {
        Self {
            issue_number: record.number,
            title: record.title.clone(),
            body_preview: body_preview(&record.body),
            similarity,
            cluster,
            state: record.state,
            created_at: record.created_at,
            updated_at: record.updated_at,
            author: record.author.clone(),
        }
    }
}

/// Cut `body` to [`PREVIEW_CHARS`] characters, marking the cut with `...`
pub fn body_preview(body: &str) -> String {
    match body.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_preview() {
        assert_eq!(body_preview("short"), "short");

        let exact = "a".repeat(PREVIEW_CHARS);
        assert_eq!(body_preview(&exact), exact);

        let long = "é".repeat(PREVIEW_CHARS + 1);
        let preview = body_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
    }

    #[test]
    fn test_matrix_rejects_ragged_rows() {
        let err = EmbeddingMatrix::from_rows(vec![vec![1.0, 0.0], vec![1.0]]).unwrap_err();
        assert!(matches!(
            err,
            SemanticError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
        assert_eq!(EmbeddingMatrix::from_rows(Vec::new()).unwrap().len(), 0);
    }

    #[test]
    fn test_cluster_label_parse_and_order() {
        assert_eq!("3".parse::<ClusterLabel>().unwrap(), ClusterLabel::Cluster(3));
        assert_eq!("noise".parse::<ClusterLabel>().unwrap(), ClusterLabel::Noise);
        assert_eq!("-1".parse::<ClusterLabel>().unwrap(), ClusterLabel::Noise);
        assert!("-2".parse::<ClusterLabel>().is_err());

        assert!(ClusterLabel::Cluster(u32::MAX) < ClusterLabel::Noise);
        assert_eq!(ClusterLabel::Noise.to_string(), "noise");
    }
}
