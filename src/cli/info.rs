//! Info command - show system information

use anyhow::Result;

use crate::config::{self, Config, EmbeddingProvider, StoreBackend};
use crate::store;

pub async fn run(config: &Config) -> Result<()> {
    println!("codeseek v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("System Information:");
    println!("  OS: {} {}", std::env::consts::OS, std::env::consts::ARCH);

    println!();
    println!("Configuration:");
    println!("  Config file: {}", config_file());
    println!(
        "  Sources: *{} files, '{}' headers, skipping {:?}",
        config.segment.suffix, config.segment.keyword, config.segment.skip_prefixes
    );

    println!();
    println!("Embeddings:");
    match config.embedding.provider {
        EmbeddingProvider::Ollama => {
            println!("  Provider: ollama at {}", config.embedding.endpoint);
            println!("  Model: {}", config.embedding.model);
        }
        EmbeddingProvider::Hashing => {
            println!("  Provider: hashing ({} dims)", config.embedding.dimension);
        }
    }

    println!();
    println!("Store:");
    let store = store::open(&config.store)?;
    println!("  Backend: {}", store.describe());
    if config.store.backend == StoreBackend::Memory {
        println!("  Collections: none (the memory store starts empty)");
        return Ok(());
    }

    match store.collection_info(&config.store.collection).await {
        Ok(info) => println!(
            "  Collection '{}': {} points, {} dims, {} distance",
            info.name, info.points, info.dimension, info.distance
        ),
        Err(_) => println!("  Collection '{}': not indexed yet", config.store.collection),
    }

    Ok(())
}

fn config_file() -> String {
    config::config_path()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
