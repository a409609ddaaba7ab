//! The unit of indexing: one function body or one file's residue

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A provenance-tagged piece of a source file.
///
/// Function chunks carry the identifier taken from their definition header,
/// or `<anonymous>` when the header has none.
/// The residue chunk (every line of the file that is not a header) has an
/// empty `function_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub filepath: PathBuf,
    pub function_name: String,
    #[serde(alias = "linenumbers")]
    pub line_numbers: Vec<usize>,
    /// Raw source lines, terminators included
    pub content: Vec<String>,
}

impl Chunk {
    pub fn is_function(&self) -> bool {
        !self.function_name.is_empty()
    }

    /// Text handed to the embedding provider
    pub fn embedding_text(&self) -> String {
        self.content
            .iter()
            .map(|line| line.trim_end_matches(['\n', '\r']))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// First and last recorded line, if any
    pub fn line_span(&self) -> Option<(usize, usize)> {
        match (self.line_numbers.first(), self.line_numbers.last()) {
            (Some(first), Some(last)) => Some((*first, *last)),
            _ => None,
        }
    }

    /// First line with visible content, for result previews
    pub fn preview(&self) -> Option<&str> {
        self.content
            .iter()
            .map(|line| line.trim())
            .find(|line| !line.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &[&str]) -> Chunk {
        Chunk {
            filepath: PathBuf::from("pkg/mod.py"),
            function_name: "load".to_string(),
            line_numbers: (2..2 + content.len()).collect(),
            content: content.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_embedding_text_strips_terminators() {
        let c = chunk(&["    x = 1\r\n", "    return x\n"]);
        assert_eq!(c.embedding_text(), "    x = 1\n    return x");
    }

    #[test]
    fn test_line_span_and_preview() {
        let c = chunk(&["\n", "    return 42\n"]);
        assert_eq!(c.line_span(), Some((2, 3)));
        assert_eq!(c.preview(), Some("return 42"));

        let empty = chunk(&[]);
        assert_eq!(empty.line_span(), None);
        assert_eq!(empty.preview(), None);
    }

    #[test]
    fn test_payload_accepts_legacy_key() {
        let json = r##"{"filepath":"a.py","function_name":"","linenumbers":[1,2],"content":["# a\n","x = 1\n"]}"##;
        let c: Chunk = serde_json::from_str(json).unwrap();
        assert_eq!(c.line_numbers, vec![1, 2]);
        assert!(!c.is_function());
    }
}
