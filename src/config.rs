//! Configuration management for codeseek

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::core::LineNumbering;
use crate::store::Distance;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub segment: SegmentConfig,
    pub embedding: EmbeddingConfig,
    pub store: StoreConfig,
    pub search: SearchConfig,
    #[serde(skip)]
    pub verbose: bool,
}

/// How source files are found and split into chunks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// File name suffix of indexed source files
    pub suffix: String,
    /// Keyword that opens a top-level function definition
    pub keyword: String,
    /// Directories whose name starts with any of these are not entered
    pub skip_prefixes: Vec<String>,
    pub line_numbering: LineNumbering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Ollama,
    Hashing,
}

/// What to do when a chunk cannot be embedded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Drop the chunk with a warning and keep indexing
    Skip,
    /// Fail the whole indexing run
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub endpoint: String,
    /// Vector length for the hashing provider; remote providers report their own
    pub dimension: usize,
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub on_failure: FailurePolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Database file for the sqlite backend (defaults to the data directory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub collection: String,
    pub distance: Distance,
    pub upsert_batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of hits shown per query
    pub limit: usize,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            suffix: ".py".to_string(),
            keyword: "def".to_string(),
            skip_prefixes: vec![".".to_string(), "_".to_string()],
            line_numbering: LineNumbering::Source,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Ollama,
            model: "all-minilm".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            dimension: 384,
            batch_size: 32,
            timeout_secs: 120,
            on_failure: FailurePolicy::Skip,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: None,
            collection: "my_project".to_string(),
            distance: Distance::Cosine,
            upsert_batch_size: 256,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { limit: 3 }
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "codeseek", "codeseek")
        .context("Failed to determine config directory")
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.toml"))
}

impl StoreConfig {
    /// Database file used by the sqlite backend
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(project_dirs()?.data_dir().join("index.db")),
        }
    }
}

/// Load configuration from file or use defaults
pub fn load_config(custom_path: Option<&str>) -> Result<Config> {
    let path = if let Some(p) = custom_path {
        PathBuf::from(p)
    } else {
        config_path()?
    };

    let mut config = if path.exists() {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {:?}", path))?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

/// Environment variables understood by Ollama tooling take precedence over the file
fn apply_env_overrides(config: &mut Config) {
    if let Ok(host) = std::env::var("OLLAMA_HOST") {
        config.embedding.endpoint = normalize_endpoint(&host);
    }
    if let Ok(model) = std::env::var("OLLAMA_MODEL") {
        config.embedding.model = model;
    }
}

fn normalize_endpoint(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

impl Config {
    fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.segment.suffix.is_empty(), "segment.suffix must not be empty");
        anyhow::ensure!(!self.segment.keyword.trim().is_empty(), "segment.keyword must not be empty");
        anyhow::ensure!(self.embedding.batch_size > 0, "embedding.batch_size must be at least 1");
        anyhow::ensure!(
            self.store.upsert_batch_size > 0,
            "store.upsert_batch_size must be at least 1"
        );
        anyhow::ensure!(self.search.limit > 0, "search.limit must be at least 1");
        anyhow::ensure!(
            !self.store.collection.trim().is_empty(),
            "store.collection must not be empty"
        );
        Ok(())
    }
}

/// Initialize configuration file with defaults
pub fn init_config(custom_path: Option<&str>) -> Result<()> {
    let path = match custom_path {
        Some(p) => PathBuf::from(p),
        None => config_path()?,
    };

    if path.exists() {
        println!("Configuration file already exists at {:?}", path);
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {:?}", parent))?;
    }

    let content = toml::to_string_pretty(&Config::default())
        .context("Failed to serialize default config")?;

    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write config to {:?}", path))?;

    println!("Configuration initialized at {:?}", path);
    Ok(())
}

/// Show current configuration
pub fn show_config(config: &Config) -> Result<()> {
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    println!("{}", content);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
[embedding]
provider = "hashing"
dimension = 64

[search]
limit = 5
"#,
        )
        .unwrap();

        assert_eq!(config.embedding.provider, EmbeddingProvider::Hashing);
        assert_eq!(config.embedding.dimension, 64);
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.search.limit, 5);
        assert_eq!(config.segment.suffix, ".py");
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_default_round_trips_through_toml() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.segment.skip_prefixes, vec![".", "_"]);
        assert_eq!(parsed.store.collection, "my_project");
        assert_eq!(parsed.embedding.on_failure, FailurePolicy::Skip);
    }

    #[test]
    fn test_load_from_custom_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codeseek.toml");
        std::fs::write(
            &path,
            "[store]\nbackend = \"sqlite\"\ncollection = \"demo\"\n",
        )
        .unwrap();

        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.store.collection, "demo");
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codeseek.toml");
        std::fs::write(&path, "[search]\nlimit = 0\n").unwrap();

        assert!(load_config(path.to_str()).is_err());
    }

    #[test]
    fn test_init_writes_loadable_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        init_config(path.to_str()).unwrap();
        std::fs::write(&path, "[search]\nlimit = 7\n").unwrap();
        init_config(path.to_str()).unwrap();

        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.search.limit, 7);
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("localhost:11434"), "http://localhost:11434");
        assert_eq!(normalize_endpoint("https://gpu.lan/"), "https://gpu.lan");
    }
}
