//! Index command - build a searchable collection from a directory

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use super::Services;
use crate::config::{Config, StoreBackend};
use crate::core::Segmenter;
use crate::index::{IndexOptions, IndexReport, Indexer};

pub async fn run(config: Config, path: &str, collection: Option<&str>) -> Result<()> {
    let services = Services::connect(&config).await?;
    let collection = collection.unwrap_or(&config.store.collection);

    if config.store.backend == StoreBackend::Memory {
        tracing::warn!(
            "The memory store does not outlive this process; set store.backend = \"sqlite\" to search later"
        );
    }

    let report = build(&config, &services, Path::new(path), collection).await?;
    print_summary(&report, &services);
    Ok(())
}

/// Segment, embed and load `root` into `collection`
pub async fn build(
    config: &Config,
    services: &Services,
    root: &Path,
    collection: &str,
) -> Result<IndexReport> {
    let segmenter = Segmenter::new(&config.segment);
    let indexer = Indexer::new(
        &segmenter,
        services.embedder.as_ref(),
        services.store.as_ref(),
        IndexOptions::from_config(config),
    );

    tracing::info!("Indexing {} into '{}'", root.display(), collection);

    indexer
        .build_index(root, collection)
        .await
        .with_context(|| format!("Failed to index {}", root.display()))
}

/// Print the indexing summary
pub fn print_summary(report: &IndexReport, services: &Services) {
    let title = if report.files_skipped > 0 || report.chunks_dropped > 0 {
        style("Indexing completed with warnings").yellow().bold()
    } else {
        style("Indexing successful").green().bold()
    };

    println!();
    println!("  {}", title);
    println!("  Collection:      {}", report.collection);
    println!("  Store:           {}", services.store.describe());
    println!(
        "  Model:           {} ({} dims)",
        services.embedder.model_name(),
        services.embedder.dimension()
    );
    println!("  Files read:      {:>6}", report.files_read);
    println!("  Chunks indexed:  {:>6}", report.chunks_indexed);
    if report.files_skipped > 0 {
        println!("  Files skipped:   {:>6}", style(report.files_skipped).yellow());
    }
    if report.chunks_dropped > 0 {
        println!("  Chunks dropped:  {:>6}", style(report.chunks_dropped).yellow());
    }
    println!(
        "  Time:            {:.2}s segmenting, {:.2}s embedding",
        report.segment_time.as_secs_f64(),
        report.embed_time.as_secs_f64()
    );
    println!();
}
