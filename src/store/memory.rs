//! In-process vector store; contents live as long as the process

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::similarity::top_k;
use super::{
    check_dimensions, check_query, CollectionInfo, Distance, IndexError, IndexRecord, QueryResult,
    VectorStore,
};
use crate::core::Chunk;

struct Collection {
    dimension: usize,
    distance: Distance,
    points: BTreeMap<u64, (Vec<f32>, Chunk)>,
}

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    fn describe(&self) -> String {
        "in-memory".to_string()
    }

    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        distance: Distance,
    ) -> Result<(), IndexError> {
        if dimension == 0 {
            return Err(IndexError::InvalidDimension);
        }
        let mut collections = self.collections.write().await;
        collections.insert(
            name.to_string(),
            Collection {
                dimension,
                distance,
                points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, name: &str, records: Vec<IndexRecord>) -> Result<(), IndexError> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| IndexError::CollectionNotFound(name.to_string()))?;

        check_dimensions(collection.dimension, &records)?;
        for record in records {
            collection
                .points
                .insert(record.id, (record.vector, record.payload));
        }
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<QueryResult>, IndexError> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| IndexError::CollectionNotFound(name.to_string()))?;
        check_query(collection.dimension, vector, k)?;

        let candidates = collection
            .points
            .iter()
            .map(|(id, (stored, _))| (*id, stored.as_slice()));
        let ranked = top_k(collection.distance, vector, candidates, k);

        Ok(ranked
            .into_iter()
            .filter_map(|(id, score)| {
                collection.points.get(&id).map(|(_, payload)| QueryResult {
                    id,
                    score,
                    payload: payload.clone(),
                })
            })
            .collect())
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, IndexError> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| IndexError::CollectionNotFound(name.to_string()))?;

        Ok(CollectionInfo {
            name: name.to_string(),
            dimension: collection.dimension,
            distance: collection.distance,
            points: collection.points.len(),
        })
    }
}
