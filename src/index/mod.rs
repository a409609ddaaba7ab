//! Indexing pipeline
//!
//! Segments a directory, embeds every chunk and loads the vectors into a
//! freshly created collection.

use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Config, FailurePolicy};
use crate::core::{Chunk, SegmentError, Segmenter};
use crate::embed::{Embedder, EmbeddingError};
use crate::store::{Distance, IndexError, IndexRecord, VectorStore};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Segment(#[from] SegmentError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Tunables of one indexing run
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub distance: Distance,
    pub embed_batch_size: usize,
    pub upsert_batch_size: usize,
    pub on_failure: FailurePolicy,
    pub show_progress: bool,
}

impl IndexOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            distance: config.store.distance,
            embed_batch_size: config.embedding.batch_size.max(1),
            upsert_batch_size: config.store.upsert_batch_size.max(1),
            on_failure: config.embedding.on_failure,
            show_progress: !config.verbose,
        }
    }
}

/// Outcome of [`Indexer::build_index`]
#[derive(Debug, Default)]
pub struct IndexReport {
    pub collection: String,
    pub files_read: usize,
    pub files_skipped: usize,
    pub chunks_found: usize,
    pub chunks_indexed: usize,
    pub chunks_dropped: usize,
    pub segment_time: Duration,
    pub embed_time: Duration,
}

/// Wires a segmenter, an embedding provider and a vector store together
pub struct Indexer<'a> {
    segmenter: &'a Segmenter,
    embedder: &'a dyn Embedder,
    store: &'a dyn VectorStore,
    options: IndexOptions,
}

impl<'a> Indexer<'a> {
    pub fn new(
        segmenter: &'a Segmenter,
        embedder: &'a dyn Embedder,
        store: &'a dyn VectorStore,
        options: IndexOptions,
    ) -> Self {
        Self {
            segmenter,
            embedder,
            store,
            options,
        }
    }

    /// Index every chunk under `root` into `collection`, replacing its contents
    pub async fn build_index(&self, root: &Path, collection: &str) -> Result<IndexReport, PipelineError> {
        let start = Instant::now();
        let segmentation = self.segmenter.segment(root)?;
        let segment_time = start.elapsed();
        info!(
            "Segmented {} files into {} chunks in {:.2}s",
            segmentation.files_read,
            segmentation.chunks.len(),
            segment_time.as_secs_f64()
        );

        let dimension = self.embedder.dimension();
        self.store
            .create_collection(collection, dimension, self.options.distance)
            .await?;
        info!(
            "Created collection '{}' ({} dimensions, {})",
            collection, dimension, self.options.distance
        );

        let mut report = IndexReport {
            collection: collection.to_string(),
            files_read: segmentation.files_read,
            files_skipped: segmentation.skipped.len(),
            chunks_found: segmentation.chunks.len(),
            segment_time,
            ..IndexReport::default()
        };

        let start = Instant::now();
        let pb = self.progress_bar(segmentation.chunks.len() as u64);
        let mut pending: Vec<IndexRecord> = Vec::new();
        let mut next_id: u64 = 0;

        for batch in segmentation.chunks.chunks(self.options.embed_batch_size) {
            let vectors = self.embed_chunks(batch).await?;

            for (chunk, vector) in batch.iter().zip(vectors) {
                match vector {
                    Some(vector) => {
                        pending.push(IndexRecord {
                            id: next_id,
                            vector,
                            payload: chunk.clone(),
                        });
                        next_id += 1;
                    }
                    None => report.chunks_dropped += 1,
                }
            }

            if pending.len() >= self.options.upsert_batch_size {
                report.chunks_indexed += self.flush(collection, &mut pending).await?;
            }
            pb.inc(batch.len() as u64);
        }
        report.chunks_indexed += self.flush(collection, &mut pending).await?;
        pb.finish_and_clear();

        report.embed_time = start.elapsed();
        info!(
            "Indexed {} chunks into '{}' in {:.2}s",
            report.chunks_indexed,
            collection,
            report.embed_time.as_secs_f64()
        );
        if report.chunks_dropped > 0 {
            warn!("{} chunks could not be embedded and were dropped", report.chunks_dropped);
        }

        Ok(report)
    }

    /// Embed one batch; `None` marks a chunk dropped under the skip policy
    async fn embed_chunks(&self, batch: &[Chunk]) -> Result<Vec<Option<Vec<f32>>>, PipelineError> {
        let texts: Vec<String> = batch.iter().map(Chunk::embedding_text).collect();

        match self.embedder.embed_batch(&texts).await {
            Ok(vectors) if vectors.len() == texts.len() => {
                let mut out = Vec::with_capacity(vectors.len());
                for (chunk, vector) in batch.iter().zip(vectors) {
                    out.push(self.checked(chunk, Ok(vector))?);
                }
                Ok(out)
            }
            Ok(vectors) => {
                let err = EmbeddingError::MalformedResponse(format!(
                    "requested {} embeddings, received {}",
                    texts.len(),
                    vectors.len()
                ));
                self.retry_individually(batch, &texts, err).await
            }
            Err(err) => self.retry_individually(batch, &texts, err).await,
        }
    }

    /// After a failed batch, find out which chunks are at fault
    async fn retry_individually(
        &self,
        batch: &[Chunk],
        texts: &[String],
        err: EmbeddingError,
    ) -> Result<Vec<Option<Vec<f32>>>, PipelineError> {
        if self.options.on_failure == FailurePolicy::Abort {
            return Err(err.into());
        }
        if batch.len() == 1 {
            return Ok(vec![self.checked(&batch[0], Err(err))?]);
        }

        warn!("Batch of {} chunks failed ({}), retrying one by one", batch.len(), err);
        let mut out = Vec::with_capacity(batch.len());
        for (chunk, text) in batch.iter().zip(texts) {
            let result = self.embedder.embed(text).await;
            out.push(self.checked(chunk, result)?);
        }
        Ok(out)
    }

    /// Apply the failure policy to a single embedding result
    fn checked(
        &self,
        chunk: &Chunk,
        result: Result<Vec<f32>, EmbeddingError>,
    ) -> Result<Option<Vec<f32>>, PipelineError> {
        let expected = self.embedder.dimension();
        let result = result.and_then(|vector| {
            if vector.len() == expected {
                Ok(vector)
            } else {
                Err(EmbeddingError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                })
            }
        });

        match result {
            Ok(vector) => Ok(Some(vector)),
            Err(err) if self.options.on_failure == FailurePolicy::Skip => {
                warn!(
                    "Dropping chunk {}:{}: {}",
                    chunk.filepath.display(),
                    display_name(chunk),
                    err
                );
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn flush(&self, collection: &str, pending: &mut Vec<IndexRecord>) -> Result<usize, PipelineError> {
        if pending.is_empty() {
            return Ok(0);
        }
        let records = std::mem::take(pending);
        let count = records.len();
        self.store.upsert(collection, records).await?;
        Ok(count)
    }

    /// Create a styled progress bar
    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.cyan} {prefix:.bold} [{bar:40.cyan/dim}] {pos}/{len} {msg:.dim}")
        {
            pb.set_style(
                style
                    .progress_chars("█▓░")
                    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        pb.set_prefix("Embedding");
        pb.set_message(self.embedder.model_name().to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }
}

/// Function name, or a marker for the residue chunk
pub fn display_name(chunk: &Chunk) -> &str {
    if chunk.is_function() {
        &chunk.function_name
    } else {
        "<module>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SegmentConfig;
    use crate::embed::HashingEmbedder;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::fs;

    const DIM: usize = 64;

    fn options(on_failure: FailurePolicy) -> IndexOptions {
        IndexOptions {
            distance: Distance::Cosine,
            embed_batch_size: 4,
            upsert_batch_size: 3,
            on_failure,
            show_progress: false,
        }
    }

    /// Fails any batch containing text with "boom"
    struct FlakyEmbedder(HashingEmbedder);

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        fn model_name(&self) -> &str {
            "flaky"
        }

        fn dimension(&self) -> usize {
            self.0.dimension()
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if texts.iter().any(|t| t.contains("boom")) {
                return Err(EmbeddingError::Unavailable("boom".to_string()));
            }
            self.0.embed_batch(texts).await
        }
    }

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("files.py"),
            "import os\n\ndef read_file(path):\n    return open(path).read()\n\ndef write_file(path, data):\n    open(path, 'w').write(data)\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("math.py"),
            "def add(a, b):\n    return a + b\n\ndef explode():\n    raise RuntimeError('boom')\n",
        )
        .unwrap();
        dir
    }

    #[tokio::test]
    async fn test_build_index_assigns_dense_ids() {
        let dir = project();
        let segmenter = Segmenter::new(&SegmentConfig::default());
        let embedder = HashingEmbedder::new(DIM);
        let store = MemoryStore::new();
        let indexer = Indexer::new(&segmenter, &embedder, &store, options(FailurePolicy::Skip));

        let report = indexer.build_index(dir.path(), "proj").await.unwrap();

        // files.py: 2 functions + residue, math.py: 2 functions + residue
        assert_eq!(report.files_read, 2);
        assert_eq!(report.chunks_found, 6);
        assert_eq!(report.chunks_indexed, 6);
        assert_eq!(report.chunks_dropped, 0);
        assert_eq!(store.collection_info("proj").await.unwrap().points, 6);

        let query = embedder.embed_text(&segmenter.segment(dir.path()).unwrap().chunks[0].embedding_text());
        let hits = store.query("proj", &query, 1).await.unwrap();
        assert_eq!(hits[0].id, 0);
        assert_eq!(hits[0].payload.function_name, "read_file");
    }

    #[tokio::test]
    async fn test_skip_policy_drops_failing_chunks() {
        let dir = project();
        let segmenter = Segmenter::new(&SegmentConfig::default());
        let embedder = FlakyEmbedder(HashingEmbedder::new(DIM));
        let store = MemoryStore::new();
        let indexer = Indexer::new(&segmenter, &embedder, &store, options(FailurePolicy::Skip));

        let report = indexer.build_index(dir.path(), "proj").await.unwrap();

        // `explode` and the math.py residue both contain "boom"
        assert_eq!(report.chunks_dropped, 2);
        assert_eq!(report.chunks_indexed, 4);
        let info = store.collection_info("proj").await.unwrap();
        assert_eq!(info.points, 4);

        let probe = embedder.0.embed_text("return a + b");
        let hits = store.query("proj", &probe, 10).await.unwrap();
        let mut ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
        ids.sort();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert!(hits.iter().all(|h| h.payload.function_name != "explode"));
    }

    #[tokio::test]
    async fn test_abort_policy_fails_the_run() {
        let dir = project();
        let segmenter = Segmenter::new(&SegmentConfig::default());
        let embedder = FlakyEmbedder(HashingEmbedder::new(DIM));
        let store = MemoryStore::new();
        let indexer = Indexer::new(&segmenter, &embedder, &store, options(FailurePolicy::Abort));

        let err = indexer.build_index(dir.path(), "proj").await.unwrap_err();
        assert!(matches!(err, PipelineError::Embedding(EmbeddingError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_empty_directory_creates_empty_collection() {
        let dir = tempfile::tempdir().unwrap();
        let segmenter = Segmenter::new(&SegmentConfig::default());
        let embedder = HashingEmbedder::new(DIM);
        let store = MemoryStore::new();
        let indexer = Indexer::new(&segmenter, &embedder, &store, options(FailurePolicy::Skip));

        let report = indexer.build_index(dir.path(), "empty").await.unwrap();

        assert_eq!(report.chunks_indexed, 0);
        let hits = store.query("empty", &vec![0.5; DIM], 3).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_replaces_previous_contents() {
        let dir = project();
        let segmenter = Segmenter::new(&SegmentConfig::default());
        let embedder = HashingEmbedder::new(DIM);
        let store = MemoryStore::new();
        let indexer = Indexer::new(&segmenter, &embedder, &store, options(FailurePolicy::Skip));

        indexer.build_index(dir.path(), "proj").await.unwrap();
        fs::remove_file(dir.path().join("math.py")).unwrap();
        let report = indexer.build_index(dir.path(), "proj").await.unwrap();

        assert_eq!(report.chunks_indexed, 3);
        assert_eq!(store.collection_info("proj").await.unwrap().points, 3);
    }

    #[tokio::test]
    async fn test_missing_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let segmenter = Segmenter::new(&SegmentConfig::default());
        let embedder = HashingEmbedder::new(DIM);
        let store = MemoryStore::new();
        let indexer = Indexer::new(&segmenter, &embedder, &store, options(FailurePolicy::Skip));

        let err = indexer
            .build_index(&dir.path().join("missing"), "proj")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Segment(_)));
        assert!(store.collection_info("proj").await.is_err());
    }
}
