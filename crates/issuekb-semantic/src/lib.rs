// Semantic layer for IssueKB
//
// Embeds cleaned issue text, groups the embeddings into clusters and ranks
// issues against free-text questions by cosine similarity. Everything is
// brute force and in memory; corpora are a few thousand issues at most.

pub mod cluster;
pub mod embeddings;
pub mod error;
pub mod models;
pub mod search;

// Re-export main types
pub use cluster::{cluster, cluster_by_name, ClusterParams, ClusterReport};
pub use embeddings::{
    cosine_similarity, load_embeddings, save_embeddings, FastEmbedEncoder, TextEncoder,
};
pub use error::{Result, SemanticError};
pub use models::{ClusterLabel, Corpus, EmbeddingMatrix, SearchResult};
pub use search::SemanticSearchEngine;
