use crate::embeddings::{cosine_similarity, TextEncoder};
use crate::error::{Result, SemanticError};
use crate::models::{ClusterLabel, Corpus, SearchResult};
use issuekb_core::models::IssueRecord;
use issuekb_core::processor::clean_text;
use std::sync::Arc;
use tracing::debug;

/// Semantic search engine
///
/// Brute-force cosine ranking over the whole corpus. The query encoder is
/// injected once and has to be the model the corpus was embedded with.
pub struct SemanticSearchEngine {
    corpus: Corpus,
    encoder: Option<Arc<dyn TextEncoder>>,
}

impl SemanticSearchEngine {
    /// Engine without an encoder; [`search`](Self::search) fails until one is attached
    pub fn new(corpus: Corpus) -> Self {
        Self {
            corpus,
            encoder: None,
        }
    }

    /// Engine ready to answer queries
    pub fn with_encoder(corpus: Corpus, encoder: Arc<dyn TextEncoder>) -> Result<Self> {
        let mut engine = Self::new(corpus);
        engine.attach_encoder(encoder)?;
        Ok(engine)
    }

    /// Attach the query encoder. It must be the model that embedded the corpus.
    pub fn attach_encoder(&mut self, encoder: Arc<dyn TextEncoder>) -> Result<()> {
        if encoder.model_name() != self.corpus.model_name() {
            return Err(SemanticError::ConfigError(format!(
                "Query encoder '{}' does not match corpus model '{}'",
                encoder.model_name(),
                self.corpus.model_name()
            )));
        }

        let dimension = self.corpus.embeddings().dimension();
        if !self.corpus.is_empty() && encoder.dimension() != dimension {
            return Err(SemanticError::DimensionMismatch {
                expected: dimension,
                actual: encoder.dimension(),
            });
        }

        self.encoder = Some(encoder);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.encoder.is_some()
    }

    /// Find the `top_k` issues closest to `query`, optionally inside one cluster.
    ///
    /// The query is normalized with the same cleaning the corpus went through
    /// before it is encoded. A query that cleans to nothing (`"502"`, `"404 ???"`)
    /// is encoded as typed instead; only a blank query is rejected.
    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        cluster_filter: Option<ClusterLabel>,
    ) -> Result<Vec<SearchResult>> {
        let encoder = self.encoder.as_ref().ok_or(SemanticError::NotReady)?;
        validate_top_k(top_k)?;

        let raw = query.trim();
        if raw.is_empty() {
            return Err(SemanticError::InvalidArgument("Query is empty".to_string()));
        }

        let cleaned = clean_text(raw);
        let text = if cleaned.is_empty() { raw } else { cleaned.as_str() };

        debug!("Semantic search query: {}", text);
        let query_vector = encoder.encode_query(text)?;

        self.rank(&query_vector, top_k, cluster_filter)
    }

    /// Rank the corpus against an already encoded query.
    ///
    /// Only positive similarities are returned. Equal scores keep corpus
    /// order.
    pub fn rank(
        &self,
        query_vector: &[f32],
        top_k: usize,
        cluster_filter: Option<ClusterLabel>,
    ) -> Result<Vec<SearchResult>> {
        validate_top_k(top_k)?;

        let mut scored: Vec<(usize, f32)> = self
            .candidates(cluster_filter)
            .map(|index| {
                let row = self.corpus.embeddings().row(index).unwrap_or(&[]);
                (index, cosine_similarity(query_vector, row))
            })
            .collect();

        // sort_by is stable, ties stay in row order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let results: Vec<SearchResult> = scored
            .into_iter()
            .filter(|(_, similarity)| *similarity > 0.0)
            .take(top_k)
            .map(|(index, similarity)| {
                SearchResult::from_record(
                    &self.corpus.records()[index],
                    similarity,
                    self.corpus.label(index),
                )
            })
            .collect();

        debug!("Found {} results", results.len());
        Ok(results)
    }

    /// Issues in one cluster, corpus order, at most `limit`
    pub fn search_by_cluster(&self, cluster: ClusterLabel, limit: usize) -> Vec<&IssueRecord> {
        self.candidates(Some(cluster))
            .take(limit)
            .map(|index| &self.corpus.records()[index])
            .collect()
    }

    /// Row indices that pass the cluster filter. Filtering an unclustered
    /// corpus yields nothing.
    fn candidates(
        &self,
        cluster_filter: Option<ClusterLabel>,
    ) -> Box<dyn Iterator<Item = usize> + '_> {
        let rows = 0..self.corpus.len();
        match cluster_filter {
            None => Box::new(rows),
            Some(wanted) => {
                Box::new(rows.filter(move |&index| self.corpus.label(index) == Some(wanted)))
            }
        }
    }
}

fn validate_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(SemanticError::InvalidArgument(
            "top_k must be positive".to_string(),
        ));
    }
    Ok(())
}
