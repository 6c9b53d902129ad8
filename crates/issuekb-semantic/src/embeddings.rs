use crate::error::{Result, SemanticError};
use crate::models::EmbeddingMatrix;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::{debug, info};

/// Turns text into fixed-dimension vectors
///
/// Search compares query vectors against corpus vectors, so both must come
/// from the same implementation and model; `model_name` is what the search
/// engine checks to enforce that.
pub trait TextEncoder {
    fn model_name(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Encode `texts` in one batch. Row `i` of the result belongs to `texts[i]`.
    fn encode(&self, texts: &[String]) -> Result<EmbeddingMatrix>;

    /// Encode a single query string
    fn encode_query(&self, query: &str) -> Result<Vec<f32>> {
        let matrix = self.encode(&[query.to_string()])?;
        matrix
            .rows()
            .first()
            .cloned()
            .ok_or_else(|| SemanticError::EmbeddingError("No embedding generated".to_string()))
    }
}

/// Map a configured model name onto a fastembed model and its dimension
pub fn resolve_model(model_name: &str) -> Result<(EmbeddingModel, usize)> {
    let resolved = match model_name {
        "sentence-transformers/all-MiniLM-L6-v2" | "all-MiniLM-L6-v2" => {
            (EmbeddingModel::AllMiniLML6V2, 384)
        }
        "sentence-transformers/all-MiniLM-L12-v2" | "all-MiniLM-L12-v2" => {
            (EmbeddingModel::AllMiniLML12V2, 384)
        }
        "BAAI/bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
        "BAAI/bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
        "BAAI/bge-large-en-v1.5" => (EmbeddingModel::BGELargeENV15, 1024),
        other => {
            return Err(SemanticError::ModelLoadError(format!(
                "Unknown embedding model: {}",
                other
            )))
        }
    };
    Ok(resolved)
}

/// Embedding generator using fastembed
///
/// The model is loaded in [`FastEmbedEncoder::new`]; a value of this type
/// always has a working model behind it.
pub struct FastEmbedEncoder {
    model: TextEmbedding,
    model_name: String,
    dimension: usize,
}

impl FastEmbedEncoder {
    /// Load the model, downloading it on first use
    pub fn new(model_name: &str) -> Result<Self> {
        let (model_type, dimension) = resolve_model(model_name)?;

        info!("Initializing embedding model: {}", model_name);
        let init_options = InitOptions::new(model_type).with_show_download_progress(true);
        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| SemanticError::ModelLoadError(e.to_string()))?;
        info!("Loaded model: {}", model_name);

        Ok(Self {
            model,
            model_name: model_name.to_string(),
            dimension,
        })
    }
}

impl TextEncoder for FastEmbedEncoder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, texts: &[String]) -> Result<EmbeddingMatrix> {
        if texts.is_empty() {
            return Ok(EmbeddingMatrix::empty(self.dimension).with_model(&self.model_name));
        }

        debug!("Encoding {} texts", texts.len());
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = self
            .model
            .embed(inputs, None)
            .map_err(|e| SemanticError::EmbeddingError(e.to_string()))?;

        if vectors.len() != texts.len() {
            return Err(SemanticError::ShapeMismatch {
                what: "embeddings",
                expected: texts.len(),
                actual: vectors.len(),
            });
        }

        Ok(EmbeddingMatrix::with_dimension(self.dimension, vectors)?.with_model(&self.model_name))
    }
}

/// Calculate cosine similarity between two vectors.
///
/// Zero vectors and vectors of different length score 0. Sums are taken in
/// `f64` so very small or very large components neither underflow nor overflow.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot_product = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

/// Save an embedding matrix to `path`
pub fn save_embeddings(embeddings: &EmbeddingMatrix, path: &std::path::Path) -> Result<()> {
    embeddings.save(path)
}

/// Load an embedding matrix saved by [`save_embeddings`]
pub fn load_embeddings(path: &std::path::Path) -> Result<EmbeddingMatrix> {
    EmbeddingMatrix::load(path)
}
