//! Run command - index a directory, then search it interactively

use anyhow::Result;
use std::path::Path;

use super::search::{interactive, OutputFormat, QueryLoop};
use super::{index, Services};
use crate::config::Config;

pub async fn run(
    config: Config,
    path: &str,
    collection: Option<&str>,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let services = Services::connect(&config).await?;
    let collection = collection.unwrap_or(&config.store.collection);

    let report = index::build(&config, &services, Path::new(path), collection).await?;
    if format == OutputFormat::Pretty {
        index::print_summary(&report, &services);
    }

    let query_loop = QueryLoop::new(
        services.embedder.as_ref(),
        services.store.as_ref(),
        collection,
        limit.unwrap_or(config.search.limit),
        format,
    );
    interactive(&query_loop).await
}
