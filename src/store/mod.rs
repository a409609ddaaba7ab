//! Vector index port
//!
//! A store holds named collections of `(id, vector, payload)` records and
//! answers top-k similarity queries. Every backend ranks through
//! [`similarity::top_k`], so results are ordered by descending score with
//! ties going to the lowest id.

pub mod memory;
pub mod similarity;
pub mod sqlite;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::{StoreBackend, StoreConfig};
use crate::core::Chunk;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Similarity metric of a collection. Higher scores are closer for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    Cosine,
    Dot,
}

impl Distance {
    pub fn name(&self) -> &'static str {
        match self {
            Distance::Cosine => "cosine",
            Distance::Dot => "dot",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cosine" => Some(Distance::Cosine),
            "dot" => Some(Distance::Dot),
            _ => None,
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A chunk ready to be stored
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub id: u64,
    pub vector: Vec<f32>,
    pub payload: Chunk,
}

/// One search hit
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub id: u64,
    pub score: f32,
    pub payload: Chunk,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: usize,
    pub distance: Distance,
    pub points: usize,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("collection '{0}' does not exist")]
    CollectionNotFound(String),

    #[error("vector dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("collection dimension must be at least 1")]
    InvalidDimension,

    #[error("query limit must be at least 1")]
    InvalidLimit,

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record {id} in '{collection}': {reason}")]
    Corrupt {
        collection: String,
        id: u64,
        reason: String,
    },

    #[error("payload encoding error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Named collections of vectors with payloads
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Human readable backend description
    fn describe(&self) -> String;

    /// Create `name`, destroying any existing collection of that name
    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        distance: Distance,
    ) -> Result<(), IndexError>;

    /// Insert records; an existing id is overwritten
    async fn upsert(&self, name: &str, records: Vec<IndexRecord>) -> Result<(), IndexError>;

    /// The `k` records most similar to `vector`
    async fn query(&self, name: &str, vector: &[f32], k: usize)
        -> Result<Vec<QueryResult>, IndexError>;

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, IndexError>;
}

/// Reject records whose vectors do not fit the collection
pub(crate) fn check_dimensions(dimension: usize, records: &[IndexRecord]) -> Result<(), IndexError> {
    match records.iter().find(|r| r.vector.len() != dimension) {
        Some(bad) => Err(IndexError::DimensionMismatch {
            expected: dimension,
            actual: bad.vector.len(),
        }),
        None => Ok(()),
    }
}

pub(crate) fn check_query(dimension: usize, vector: &[f32], k: usize) -> Result<(), IndexError> {
    if k == 0 {
        return Err(IndexError::InvalidLimit);
    }
    if vector.len() != dimension {
        return Err(IndexError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Open the configured backend
pub fn open(config: &StoreConfig) -> Result<Box<dyn VectorStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Box::new(MemoryStore::new())),
        StoreBackend::Sqlite => {
            let path = config.database_path()?;
            let store = SqliteStore::open(&path)
                .with_context(|| format!("Failed to open vector store at {}", path.display()))?;
            Ok(Box::new(store))
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::path::PathBuf;

    pub fn record(id: u64, vector: Vec<f32>, name: &str) -> IndexRecord {
        IndexRecord {
            id,
            vector,
            payload: Chunk {
                filepath: PathBuf::from("lib.py"),
                function_name: name.to_string(),
                line_numbers: vec![1],
                content: vec![format!("# {}\n", name)],
            },
        }
    }

    /// Behaviour every backend has to share
    pub async fn exercise_store(store: &dyn VectorStore) {
        // missing collection
        let err = store.query("code", &[1.0, 0.0], 1).await.unwrap_err();
        assert!(matches!(err, IndexError::CollectionNotFound(_)));
        assert!(matches!(
            store.upsert("code", vec![record(0, vec![1.0, 0.0], "a")]).await,
            Err(IndexError::CollectionNotFound(_))
        ));

        assert!(matches!(
            store.create_collection("code", 0, Distance::Cosine).await,
            Err(IndexError::InvalidDimension)
        ));
        store.create_collection("code", 2, Distance::Cosine).await.unwrap();

        // empty collection
        assert!(store.query("code", &[1.0, 0.0], 3).await.unwrap().is_empty());

        store
            .upsert(
                "code",
                vec![
                    record(0, vec![1.0, 0.0], "east"),
                    record(1, vec![0.0, 1.0], "north"),
                    record(2, vec![0.7, 0.7], "north_east"),
                    record(3, vec![2.0, 0.0], "far_east"),
                ],
            )
            .await
            .unwrap();

        // exact vector comes back first with maximal score; ties go to the lowest id
        let hits = store.query("code", &[0.0, 1.0], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);
        assert!((hits[0].score - 1.0).abs() < 1e-5);

        let hits = store.query("code", &[1.0, 0.0], 3).await.unwrap();
        let ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![0, 3, 2]);
        assert_eq!(hits[0].payload.function_name, "east");
        assert!(hits[0].score >= hits[2].score);

        // overwrite on duplicate id
        store
            .upsert("code", vec![record(1, vec![-1.0, 0.0], "west")])
            .await
            .unwrap();
        let hits = store.query("code", &[-1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].payload.function_name, "west");
        assert_eq!(store.collection_info("code").await.unwrap().points, 4);

        // dimension mismatches
        assert!(matches!(
            store.query("code", &[1.0, 0.0, 0.0], 1).await,
            Err(IndexError::DimensionMismatch { expected: 2, actual: 3 })
        ));
        assert!(matches!(
            store.upsert("code", vec![record(9, vec![1.0], "short")]).await,
            Err(IndexError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            store.query("code", &[1.0, 0.0], 0).await,
            Err(IndexError::InvalidLimit)
        ));

        // recreate drops old records
        store.create_collection("code", 3, Distance::Dot).await.unwrap();
        let info = store.collection_info("code").await.unwrap();
        assert_eq!(info.points, 0);
        assert_eq!(info.dimension, 3);
        assert_eq!(info.distance, Distance::Dot);
    }
}
