//! Splits source files into function chunks and a per-file residue chunk
//!
//! Only top-level definitions are recognized: a header is a line that starts
//! with the configured keyword followed by a space. Indented definitions stay
//! part of whatever body encloses them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use super::chunk::Chunk;
use crate::config::SegmentConfig;

/// Name given to a function whose header carries no identifier
pub const ANONYMOUS: &str = "<anonymous>";

/// How `Chunk::line_numbers` are derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineNumbering {
    /// Real 1-based positions of the lines held in the chunk
    Source,
    /// Ranges compatible with indexes built by earlier python tooling
    Legacy,
}

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

impl SegmentError {
    pub fn path(&self) -> &Path {
        match self {
            SegmentError::Io { path, .. } | SegmentError::Walk { path, .. } => path,
        }
    }
}

/// Result of segmenting a directory tree
#[derive(Debug, Default)]
pub struct Segmentation {
    pub chunks: Vec<Chunk>,
    pub files_read: usize,
    /// Files and directories that could not be read; the walk went on without them
    pub skipped: Vec<SegmentError>,
}

pub struct Segmenter {
    suffix: String,
    header: String,
    skip_prefixes: Vec<String>,
    numbering: LineNumbering,
}

/// A function whose header has been seen and whose body is still being read
struct OpenFunction {
    name: String,
    header_index: usize,
    body: Vec<String>,
}

enum ScanState {
    Idle,
    InFunction(OpenFunction),
}

impl Segmenter {
    pub fn new(config: &SegmentConfig) -> Self {
        Self {
            suffix: config.suffix.clone(),
            header: format!("{} ", config.keyword.trim()),
            skip_prefixes: config.skip_prefixes.clone(),
            numbering: config.line_numbering,
        }
    }

    /// Segment every matching file below `root`, in file-name order
    pub fn segment(&self, root: &Path) -> Result<Segmentation, SegmentError> {
        let mut result = Segmentation::default();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_skipped_dir(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) if source.depth() == 0 => {
                    return Err(SegmentError::Walk {
                        path: root.to_path_buf(),
                        source,
                    });
                }
                Err(source) => {
                    let path = source
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| root.to_path_buf());
                    let error = SegmentError::Walk { path, source };
                    warn!("Skipping: {}", error);
                    result.skipped.push(error);
                    continue;
                }
            };

            if !is_file_like(&entry) || !self.is_source_file(&entry) {
                continue;
            }

            match self.segment_file(entry.path()) {
                Ok(chunks) => {
                    debug!("{}: {} chunks", entry.path().display(), chunks.len());
                    result.files_read += 1;
                    result.chunks.extend(chunks);
                }
                Err(error) => {
                    warn!("Skipping: {}", error);
                    result.skipped.push(error);
                }
            }
        }

        Ok(result)
    }

    /// Read and segment a single file
    pub fn segment_file(&self, path: &Path) -> Result<Vec<Chunk>, SegmentError> {
        let source = std::fs::read_to_string(path).map_err(|source| SegmentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.segment_source(path, &source))
    }

    /// Segment already-loaded source text attributed to `path`
    pub fn segment_source(&self, path: &Path, source: &str) -> Vec<Chunk> {
        let lines: Vec<&str> = source.split_inclusive('\n').collect();
        let mut chunks = Vec::new();
        let mut residue: Vec<(usize, String)> = Vec::new();
        let mut state = ScanState::Idle;

        for (index, line) in lines.iter().enumerate() {
            if self.is_header(line) {
                if let ScanState::InFunction(open) = state {
                    chunks.push(self.function_chunk(path, open, index, false));
                }
                state = ScanState::InFunction(OpenFunction {
                    name: self.function_name(line),
                    header_index: index,
                    body: Vec::new(),
                });
            } else {
                if let ScanState::InFunction(open) = &mut state {
                    open.body.push(line.to_string());
                }
                residue.push((index, line.to_string()));
            }
        }

        if let ScanState::InFunction(open) = state {
            chunks.push(self.function_chunk(path, open, lines.len(), true));
        }

        if !residue.is_empty() {
            chunks.push(self.residue_chunk(path, residue));
        }

        chunks
    }

    /// Close a function whose body ends before line index `end` (0-based, exclusive)
    fn function_chunk(&self, path: &Path, open: OpenFunction, end: usize, at_eof: bool) -> Chunk {
        let header = open.header_index;
        let line_numbers = match self.numbering {
            LineNumbering::Source => (header + 2..end + 1).collect(),
            LineNumbering::Legacy if at_eof => (header + 1..end + 1).collect(),
            LineNumbering::Legacy => (header + 1..end).collect(),
        };

        Chunk {
            filepath: path.to_path_buf(),
            function_name: open.name,
            line_numbers,
            content: open.body,
        }
    }

    fn residue_chunk(&self, path: &Path, residue: Vec<(usize, String)>) -> Chunk {
        let line_numbers = match self.numbering {
            LineNumbering::Source => residue.iter().map(|(index, _)| index + 1).collect(),
            LineNumbering::Legacy => (1..residue.len() + 1).collect(),
        };

        Chunk {
            filepath: path.to_path_buf(),
            function_name: String::new(),
            line_numbers,
            content: residue.into_iter().map(|(_, line)| line).collect(),
        }
    }

    fn is_header(&self, line: &str) -> bool {
        line.starts_with(&self.header)
    }

    /// Identifier between the keyword and the opening parenthesis
    fn function_name(&self, line: &str) -> String {
        let name = line[self.header.len()..]
            .trim_start()
            .split(|c: char| c == '(' || c == ':' || c.is_whitespace())
            .next()
            .unwrap_or_default();
        if name.is_empty() {
            ANONYMOUS.to_string()
        } else {
            name.to_string()
        }
    }

    fn is_source_file(&self, entry: &DirEntry) -> bool {
        entry.file_name().to_string_lossy().ends_with(&self.suffix)
    }

    fn is_skipped_dir(&self, entry: &DirEntry) -> bool {
        if !entry.file_type().is_dir() {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        self.skip_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && name.starts_with(prefix.as_str()))
    }
}

/// Regular files, and symlinks that are not directories.
///
/// Linked directories are not descended into; a dangling link is handed to
/// the reader so it shows up in `skipped`.
fn is_file_like(entry: &DirEntry) -> bool {
    let file_type = entry.file_type();
    file_type.is_file() || (file_type.is_symlink() && !entry.path().is_dir())
}
