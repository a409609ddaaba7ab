//! CLI command implementations

pub mod index;
pub mod info;
pub mod run;
pub mod search;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::embed::{self, Embedder};
use crate::store::{self, VectorStore};

/// The embedding provider and vector store shared by a command.
///
/// Built once per process and lent to the pipeline and the search loop.
pub struct Services {
    pub embedder: Box<dyn Embedder>,
    pub store: Box<dyn VectorStore>,
}

impl Services {
    pub async fn connect(config: &Config) -> Result<Self> {
        let embedder = embed::connect(&config.embedding).await.with_context(|| {
            format!(
                "Failed to initialize {:?} embedding provider (model {})",
                config.embedding.provider, config.embedding.model
            )
        })?;
        let store = store::open(&config.store)?;

        tracing::debug!(
            "Using {} ({} dims) with {} store",
            embedder.model_name(),
            embedder.dimension(),
            store.describe()
        );
        Ok(Self { embedder, store })
    }
}
