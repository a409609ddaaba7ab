//! Embedding providers
//!
//! Everything that turns text into vectors sits behind [`Embedder`]. The
//! provider is connected once at startup and then shared by reference with
//! the indexing pipeline and the search loop.

pub mod hashing;
pub mod ollama;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{EmbeddingConfig, EmbeddingProvider};

pub use hashing::HashingEmbedder;
pub use ollama::OllamaEmbedder;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),

    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            EmbeddingError::MalformedResponse(err.to_string())
        } else {
            EmbeddingError::Unavailable(err.to_string())
        }
    }
}

/// Maps text to fixed-length vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, shown in logs and `info`
    fn model_name(&self) -> &str;

    /// Length of every vector this provider returns
    fn dimension(&self) -> usize;

    /// Embed several texts; the output is in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        match vectors.pop() {
            Some(vector) if vectors.is_empty() => Ok(vector),
            _ => Err(EmbeddingError::MalformedResponse(
                "expected exactly one vector".to_string(),
            )),
        }
    }
}

/// Build the configured provider, probing remote ones for their dimension
pub async fn connect(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>, EmbeddingError> {
    match config.provider {
        EmbeddingProvider::Hashing => Ok(Box::new(HashingEmbedder::new(config.dimension))),
        EmbeddingProvider::Ollama => Ok(Box::new(OllamaEmbedder::connect(config).await?)),
    }
}
