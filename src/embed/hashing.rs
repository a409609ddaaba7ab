//! Offline embedding by feature hashing
//!
//! Identifier-aware bag of words: text is split into tokens, compound
//! identifiers (`snake_case`, `camelCase`) also contribute their parts, and
//! every token is hashed into a signed bucket. Vectors are L2-normalized so
//! cosine and dot product agree. Output is stable across runs and builds.

use async_trait::async_trait;

use super::{Embedder, EmbeddingError};

const MODEL_NAME: &str = "feature-hashing";

/// Weight of a whole identifier relative to each of its parts
const WHOLE_TOKEN_WEIGHT: f32 = 1.0;
const PART_WEIGHT: f32 = 0.5;

pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Embed without going through the async trait
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in tokens(text) {
            self.add(&mut vector, &token, WHOLE_TOKEN_WEIGHT);
            let parts = split_identifier(&token);
            if parts.len() > 1 {
                for part in parts {
                    self.add(&mut vector, &part, PART_WEIGHT);
                }
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }

    fn add(&self, vector: &mut [f32], token: &str, weight: f32) {
        let hash = fnv1a(token.to_lowercase().as_bytes());
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        MODEL_NAME
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

/// Alphanumeric runs (underscores included) of two or more characters
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .map(|t| t.trim_matches('_'))
        .filter(|t| t.chars().count() > 1)
        .map(str::to_string)
}

/// `parse_configFile` -> `parse`, `config`, `file`
fn split_identifier(token: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut previous_lower = false;

    for c in token.chars() {
        if c == '_' {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            previous_lower = false;
            continue;
        }
        if c.is_uppercase() && previous_lower && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        previous_lower = c.is_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(PRIME))
}
