//! Vector store persisted to a SQLite file
//!
//! Vectors are kept as little-endian `f32` blobs and payloads as JSON. Queries
//! scan the whole collection, which is plenty for a single codebase.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

use super::similarity::top_k;
use super::{
    check_dimensions, check_query, CollectionInfo, Distance, IndexError, IndexRecord, QueryResult,
    VectorStore,
};
use crate::core::Chunk;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS collections (
    name      TEXT PRIMARY KEY,
    dimension INTEGER NOT NULL,
    distance  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS points (
    collection TEXT NOT NULL,
    id         INTEGER NOT NULL,
    vector     BLOB NOT NULL,
    payload    TEXT NOT NULL,
    PRIMARY KEY (collection, id)
);
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    location: String,
}

impl SqliteStore {
    /// Open (or create) a database file, creating parent directories as needed
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn, path.display().to_string())
    }

    /// A private database that disappears with the store
    pub fn open_in_memory() -> Result<Self, IndexError> {
        Self::with_connection(Connection::open_in_memory()?, ":memory:".to_string())
    }

    fn with_connection(conn: Connection, location: String) -> Result<Self, IndexError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            location,
        })
    }
}

fn collection_meta(conn: &Connection, name: &str) -> Result<(usize, Distance), IndexError> {
    let row: Option<(i64, String)> = conn
        .query_row(
            "SELECT dimension, distance FROM collections WHERE name = ?1",
            params![name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let (dimension, distance) = row.ok_or_else(|| IndexError::CollectionNotFound(name.to_string()))?;
    let distance = Distance::from_name(&distance).ok_or_else(|| IndexError::Corrupt {
        collection: name.to_string(),
        id: 0,
        reason: format!("unknown distance '{}'", distance),
    })?;
    Ok((dimension as usize, distance))
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

fn to_sql_id(collection: &str, id: u64) -> Result<i64, IndexError> {
    i64::try_from(id).map_err(|_| IndexError::Corrupt {
        collection: collection.to_string(),
        id,
        reason: "id does not fit a sqlite integer".to_string(),
    })
}

#[async_trait]
impl VectorStore for SqliteStore {
    fn describe(&self) -> String {
        format!("sqlite ({})", self.location)
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
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM points WHERE collection = ?1", params![name])?;
        tx.execute("DELETE FROM collections WHERE name = ?1", params![name])?;
        tx.execute(
            "INSERT INTO collections (name, dimension, distance) VALUES (?1, ?2, ?3)",
            params![name, dimension as i64, distance.name()],
        )?;
        tx.commit()?;
        debug!("Created collection {} ({} dims, {})", name, dimension, distance);
        Ok(())
    }

    async fn upsert(&self, name: &str, records: Vec<IndexRecord>) -> Result<(), IndexError> {
        let mut conn = self.conn.lock().await;
        let (dimension, _) = collection_meta(&conn, name)?;
        check_dimensions(dimension, &records)?;

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO points (collection, id, vector, payload) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for record in &records {
                let payload = serde_json::to_string(&record.payload)?;
                stmt.execute(params![
                    name,
                    to_sql_id(name, record.id)?,
                    encode_vector(&record.vector),
                    payload
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<QueryResult>, IndexError> {
        let conn = self.conn.lock().await;
        let (dimension, distance) = collection_meta(&conn, name)?;
        check_query(dimension, vector, k)?;

        let mut stmt = conn.prepare("SELECT id, vector, payload FROM points WHERE collection = ?1")?;
        let rows = stmt.query_map(params![name], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?, row.get::<_, String>(2)?))
        })?;

        let mut points: Vec<(u64, Vec<f32>, String)> = Vec::new();
        for row in rows {
            let (id, blob, payload) = row?;
            let id = id as u64;
            let stored = decode_vector(&blob)
                .filter(|v| v.len() == dimension)
                .ok_or_else(|| IndexError::Corrupt {
                    collection: name.to_string(),
                    id,
                    reason: "vector blob does not match the collection dimension".to_string(),
                })?;
            points.push((id, stored, payload));
        }

        let candidates = points.iter().map(|(id, v, _)| (*id, v.as_slice()));
        let ranked = top_k(distance, vector, candidates, k);

        let mut results = Vec::with_capacity(ranked.len());
        for (id, score) in ranked {
            if let Some((_, _, payload)) = points.iter().find(|(pid, _, _)| *pid == id) {
                let payload: Chunk = serde_json::from_str(payload)?;
                results.push(QueryResult { id, score, payload });
            }
        }
        Ok(results)
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, IndexError> {
        let conn = self.conn.lock().await;
        let (dimension, distance) = collection_meta(&conn, name)?;
        let points: i64 = conn.query_row(
            "SELECT COUNT(*) FROM points WHERE collection = ?1",
            params![name],
            |row| row.get(0),
        )?;

        Ok(CollectionInfo {
            name: name.to_string(),
            dimension,
            distance,
            points: points as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{exercise_store, record};

    #[tokio::test]
    async fn test_sqlite_store_contract() {
        exercise_store(&SqliteStore::open_in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.create_collection("proj", 2, Distance::Cosine).await.unwrap();
            store
                .upsert(
                    "proj",
                    vec![
                        record(0, vec![1.0, 0.0], "parse_args"),
                        record(1, vec![0.0, 1.0], "render"),
                    ],
                )
                .await
                .unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        let info = reopened.collection_info("proj").await.unwrap();
        assert_eq!(info.points, 2);
        assert_eq!(info.dimension, 2);

        let hits = reopened.query("proj", &[0.0, 1.0], 1).await.unwrap();
        assert_eq!(hits[0].payload.function_name, "render");
        assert_eq!(hits[0].payload.content, vec!["# render\n".to_string()]);
    }

    #[test]
    fn test_vector_blob_encoding() {
        let vector = vec![0.25f32, -1.5, 3.0];
        assert_eq!(decode_vector(&encode_vector(&vector)), Some(vector));
        assert_eq!(decode_vector(&[0, 1, 2]), None);
    }
}
