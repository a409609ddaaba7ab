//! Ollama embedding client
//!
//! Runs embedding models locally via Ollama's `/api/embed` endpoint.
//! No API key needed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{Embedder, EmbeddingError};
use crate::config::EmbeddingConfig;

/// Text embedded once at connect time to learn the vector length
const DIMENSION_PROBE: &str = "dimension probe";

/// Request for batch embedding
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// Embedding response
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

/// Ollama client bound to one embedding model
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    client: reqwest::Client,
    dimension: usize,
}

impl OllamaEmbedder {
    /// Connect to the server and discover the model's dimension
    pub async fn connect(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Unavailable(format!("failed to create HTTP client: {}", e)))?;

        let mut embedder = Self {
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client,
            dimension: 0,
        };

        let probe = embedder.request(&[DIMENSION_PROBE.to_string()]).await?;
        embedder.dimension = probe
            .first()
            .map(Vec::len)
            .filter(|len| *len > 0)
            .ok_or_else(|| EmbeddingError::MalformedResponse("empty probe embedding".to_string()))?;

        info!(
            "Connected to Ollama at {} (model {}, {} dimensions)",
            embedder.base_url, embedder.model, embedder.dimension
        );
        Ok(embedder)
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/api/embed", self.base_url);
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self.client.post(&url).json(&request).send().await.map_err(|e| {
            EmbeddingError::Unavailable(format!("failed to connect to Ollama. Is it running? ({})", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Unavailable(format!(
                "Ollama request failed ({}): {}",
                status, body
            )));
        }

        let parsed: EmbedResponse = response.json().await?;
        if parsed.embeddings.len() != texts.len() {
            return Err(EmbeddingError::MalformedResponse(format!(
                "requested {} embeddings, received {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }

        debug!("Embedded {} texts with {}", texts.len(), self.model);
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.request(texts).await?;
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let input = vec!["def load(): pass".to_string()];
        let request = EmbedRequest {
            model: "all-minilm",
            input: &input,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"model":"all-minilm","input":["def load(): pass"]}"#);
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"model":"all-minilm","embeddings":[[0.1,0.2],[0.3,0.4]],"total_duration":12}"#;
        let parsed: EmbedResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.embeddings.len(), 2);
        assert_eq!(parsed.embeddings[1], vec![0.3, 0.4]);

        let missing: EmbedResponse = serde_json::from_str(r#"{"model":"x"}"#).unwrap();
        assert!(missing.embeddings.is_empty());
    }
}
