//! Semantic search command - search code by meaning
//!
//! Embeds free-text queries and shows the closest chunks of an indexed
//! collection, either once or in an interactive `Search: ` loop.

use anyhow::{Context, Result};
use console::style;
use std::io::{self, Write};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::warn;

use super::Services;
use crate::config::Config;
use crate::embed::{Embedder, EmbeddingError};
use crate::index::display_name;
use crate::store::{IndexError, QueryResult, VectorStore};

const PROMPT: &str = "Search: ";
const PREVIEW_WIDTH: usize = 80;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Pretty,
    /// One JSON object per hit
    Json,
}

/// Counters reported when the loop ends
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub queries: usize,
    pub failures: usize,
}

pub struct QueryLoop<'a> {
    embedder: &'a dyn Embedder,
    store: &'a dyn VectorStore,
    collection: String,
    limit: usize,
    format: OutputFormat,
}

impl<'a> QueryLoop<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        store: &'a dyn VectorStore,
        collection: &str,
        limit: usize,
        format: OutputFormat,
    ) -> Self {
        Self {
            embedder,
            store,
            collection: collection.to_string(),
            limit: limit.max(1),
            format,
        }
    }

    /// Embed `query` and fetch the best hits
    pub async fn search(&self, query: &str) -> Result<Vec<QueryResult>, SearchError> {
        let vector = self.embedder.embed(query).await?;
        Ok(self.store.query(&self.collection, &vector, self.limit).await?)
    }

    /// Prompt, search and render until end of input or `/exit`.
    ///
    /// A failing query is reported and the loop carries on.
    pub async fn run<R, W>(&self, mut input: R, out: &mut W) -> Result<LoopSummary>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut summary = LoopSummary::default();
        let mut buf = Vec::new();

        loop {
            write!(out, "{}", PROMPT)?;
            out.flush()?;

            buf.clear();
            let read = input
                .read_until(b'\n', &mut buf)
                .await
                .context("Failed to read query")?;
            if read == 0 {
                writeln!(out)?;
                break;
            }

            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line,
                Err(err) => {
                    summary.queries += 1;
                    summary.failures += 1;
                    warn!("Query is not valid UTF-8: {}", err);
                    print_error(out, "query is not valid UTF-8")?;
                    continue;
                }
            };

            let query = line.trim();
            if query.is_empty() {
                continue;
            }

            match LoopCommand::parse(query) {
                Some(LoopCommand::Exit) => break,
                Some(LoopCommand::Help) => {
                    print_help(out)?;
                    continue;
                }
                None => {}
            }

            summary.queries += 1;
            match self.search(query).await {
                Ok(results) => self.render(out, &results)?,
                Err(err) => {
                    summary.failures += 1;
                    warn!("Query {:?} failed: {}", query, err);
                    print_error(out, &err.to_string())?;
                }
            }
        }

        Ok(summary)
    }

    fn render<W: Write>(&self, out: &mut W, results: &[QueryResult]) -> io::Result<()> {
        match self.format {
            OutputFormat::Pretty => print_results(out, results),
            OutputFormat::Json => {
                for result in results {
                    let line = serde_json::to_string(result).map_err(io::Error::from)?;
                    writeln!(out, "{}", line)?;
                }
                Ok(())
            }
        }
    }
}

/// Slash commands understood by the loop; any other input is a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopCommand {
    Exit,
    Help,
}

impl LoopCommand {
    fn parse(input: &str) -> Option<Self> {
        match input.to_lowercase().as_str() {
            "/exit" | "/quit" | "/q" => Some(LoopCommand::Exit),
            "/help" | "/h" | "/?" => Some(LoopCommand::Help),
            _ => None,
        }
    }
}

// ============================================
// UI Functions
// ============================================

fn print_results<W: Write>(out: &mut W, results: &[QueryResult]) -> io::Result<()> {
    if results.is_empty() {
        writeln!(out, "  {}", style("No results").yellow())?;
        return writeln!(out);
    }

    for (i, result) in results.iter().enumerate() {
        let chunk = &result.payload;
        let location = match chunk.line_span() {
            Some((start, end)) => format!("{}:{}-{}", chunk.filepath.display(), start, end),
            None => chunk.filepath.display().to_string(),
        };

        writeln!(
            out,
            "  {}. {} {} {}",
            i + 1,
            style(display_name(chunk)).bold(),
            style(location).dim(),
            style(format!("score: {:.4}", result.score)).cyan()
        )?;

        if let Some(preview) = chunk.preview() {
            writeln!(out, "     {}", style(truncate(preview, PREVIEW_WIDTH)).dim())?;
        }
    }
    writeln!(out)
}

fn print_help<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "  {}", style("Available Commands:").bold())?;
    writeln!(out, "  /help    - Show this help message")?;
    writeln!(out, "  /exit    - Leave the search loop (end of input works too)")?;
    writeln!(out)?;
    writeln!(out, "  {}", style("Anything else is embedded and searched.").dim())?;
    writeln!(out)
}

fn print_error<W: Write>(out: &mut W, message: &str) -> io::Result<()> {
    writeln!(out, "  {} {}", style("Error:").red().bold(), message)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

/// Run the loop on the terminal; Ctrl-C ends it like end of input does
pub async fn interactive(query_loop: &QueryLoop<'_>) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = io::stdout();

    tokio::select! {
        result = query_loop.run(stdin, &mut stdout) => {
            let summary = result?;
            tracing::debug!("{} queries, {} failed", summary.queries, summary.failures);
        }
        _ = tokio::signal::ctrl_c() => {
            println!();
            // a pending stdin read cannot be cancelled and would hold up runtime shutdown
            std::process::exit(0);
        }
    }
    Ok(())
}

/// `codeseek search`: query an existing collection
pub async fn run(
    config: Config,
    collection: Option<&str>,
    limit: Option<usize>,
    query: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let services = Services::connect(&config).await?;
    let collection = collection.unwrap_or(&config.store.collection);

    let info = services
        .store
        .collection_info(collection)
        .await
        .with_context(|| {
            format!(
                "Collection '{}' is not available in the {} store; run `codeseek index` first",
                collection,
                services.store.describe()
            )
        })?;
    if info.dimension != services.embedder.dimension() {
        warn!(
            "Collection '{}' holds {}-dimensional vectors but {} produces {}; queries will fail",
            collection,
            info.dimension,
            services.embedder.model_name(),
            services.embedder.dimension()
        );
    }

    let query_loop = QueryLoop::new(
        services.embedder.as_ref(),
        services.store.as_ref(),
        collection,
        limit.unwrap_or(config.search.limit),
        format,
    );

    match query {
        Some(query) => {
            let results = query_loop.search(query).await?;
            query_loop.render(&mut io::stdout(), &results)?;
            Ok(())
        }
        None => interactive(&query_loop).await,
    }
}
