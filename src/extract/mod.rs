//! Content splitting
//!
//! Turns raw document text into ordered, semantically bounded chunks:
//! - Code-like paths are split on top-level declarations (tree-sitter)
//! - Everything else, and any code that fails to parse, goes through the
//!   Markdown-aware text splitter
//!
//! Chunking is deterministic. The same path and text always produce the
//! same boundaries and therefore the same hashes.

pub mod code;
pub mod doc;

pub use code::{CodeExtractor, CodeUnit, Language};
pub use doc::TextSplitter;

use crate::config::ChunkingConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Compute a stable hash for content
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Semantic type tag of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Function,
    Class,
    Type,
    Impl,
    Module,
    /// Imports, constants and other code between declarations
    Preamble,
    Heading,
    Sentence,
    CodeBlock,
    ListItem,
    Table,
    /// Size-bounded block with no finer structure
    Text,
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChunkKind::Function => "function",
            ChunkKind::Class => "class",
            ChunkKind::Type => "type",
            ChunkKind::Impl => "impl",
            ChunkKind::Module => "module",
            ChunkKind::Preamble => "preamble",
            ChunkKind::Heading => "heading",
            ChunkKind::Sentence => "sentence",
            ChunkKind::CodeBlock => "code_block",
            ChunkKind::ListItem => "list_item",
            ChunkKind::Table => "table",
            ChunkKind::Text => "text",
        };
        write!(f, "{}", name)
    }
}

/// Where a chunk came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum ChunkOrigin {
    /// A declaration found by the syntax tree
    Symbol { name: String, language: Language },
    /// A unit of a Markdown/text section
    Section { heading_path: Vec<String> },
    /// Produced by the fallback splitter after a parse failure
    Fallback { reason: String },
}

/// Position and provenance of a chunk within its document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Position in the chunk sequence, starting at 0
    pub index: usize,
    /// First line (1-indexed)
    pub start_line: usize,
    /// Last line (1-indexed, inclusive)
    pub end_line: usize,
    /// Byte offset where the chunk starts
    pub byte_start: usize,
    /// Byte offset one past the end of the chunk
    pub byte_end: usize,
    #[serde(flatten)]
    pub origin: ChunkOrigin,
}

/// A semantically bounded slice of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Raw text content
    pub content: String,
    /// Semantic type tag
    pub kind: ChunkKind,
    /// Position metadata
    pub metadata: ChunkMetadata,
    /// Content hash for change detection
    pub hash: String,
}

impl Chunk {
    /// Build a chunk from a byte range of `source`
    pub(crate) fn from_range(
        source: &str,
        lines: &LineIndex,
        start: usize,
        end: usize,
        kind: ChunkKind,
        origin: ChunkOrigin,
    ) -> Self {
        let content = source[start..end].to_string();
        let hash = content_hash(&content);
        Self {
            content,
            kind,
            metadata: ChunkMetadata {
                index: 0,
                start_line: lines.line_of(start),
                end_line: lines.line_of(end.saturating_sub(1).max(start)),
                byte_start: start,
                byte_end: end,
                origin,
            },
            hash,
        }
    }
}

/// Maps byte offsets to 1-indexed line numbers
pub(crate) struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub(crate) fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    pub(crate) fn line_of(&self, byte: usize) -> usize {
        match self.starts.binary_search(&byte) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }
}

/// Shrink `start..end` so it excludes leading and trailing whitespace
pub(crate) fn trim_range(source: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let slice = &source[start..end];
    let trimmed_start = slice.len() - slice.trim_start().len();
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return None;
    }
    let s = start + trimmed_start;
    Some((s, s + trimmed.len()))
}

/// Split `start..end` into pieces of at most `max_chars` bytes, preferring
/// a newline, then a space, as the cut point.
pub(crate) fn split_oversized(
    source: &str,
    start: usize,
    end: usize,
    max_chars: usize,
) -> Vec<(usize, usize)> {
    let mut pieces = Vec::new();
    let mut cursor = start;

    while cursor < end {
        if end - cursor <= max_chars {
            pieces.push((cursor, end));
            break;
        }

        let mut limit = cursor + max_chars;
        while !source.is_char_boundary(limit) {
            limit -= 1;
        }
        let window = &source[cursor..limit];
        let cut = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&pos| pos > 0)
            .map(|pos| cursor + pos + 1)
            .unwrap_or(limit);
        // A single wide char larger than the window still has to advance
        let cut = if cut == cursor {
            cursor
                + source[cursor..]
                    .chars()
                    .next()
                    .map(char::len_utf8)
                    .unwrap_or(1)
        } else {
            cut
        };

        pieces.push((cursor, cut));
        cursor = cut;
    }

    pieces
        .into_iter()
        .filter_map(|(s, e)| trim_range(source, s, e))
        .collect()
}

/// Splits documents into chunks
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    /// Create a chunker with the given settings
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Split `text` into ordered chunks. Never fails and never returns an
    /// empty list.
    pub fn chunk(&self, path: &str, text: &str) -> Vec<Chunk> {
        let mut chunks = match Language::from_path(path) {
            Some(language) if self.config.syntax_aware => self.chunk_code(path, language, text),
            _ => TextSplitter::new(self.config.max_chunk_chars).split(text),
        };

        if chunks.is_empty() {
            chunks.push(Chunk::from_range(
                text,
                &LineIndex::new(text),
                0,
                0,
                ChunkKind::Text,
                ChunkOrigin::Section {
                    heading_path: Vec::new(),
                },
            ));
        }

        for (index, chunk) in chunks.iter_mut().enumerate() {
            chunk.metadata.index = index;
        }

        chunks
    }

    fn chunk_code(&self, path: &str, language: Language, text: &str) -> Vec<Chunk> {
        match CodeExtractor::new(language).and_then(|mut e| e.extract(text)) {
            Ok(units) => self.assemble_code_chunks(language, text, &units),
            Err(reason) => {
                tracing::debug!(path, %language, %reason, "parse fallback");
                TextSplitter::new(self.config.max_chunk_chars)
                    .split_blocks(text, &reason.to_string())
            }
        }
    }

    /// Turn declaration units into chunks, covering the gaps between them
    fn assemble_code_chunks(&self, language: Language, text: &str, units: &[CodeUnit]) -> Vec<Chunk> {
        let lines = LineIndex::new(text);
        let max = self.config.max_chunk_chars;
        let mut chunks = Vec::new();
        let mut cursor = 0;

        let push_range = |chunks: &mut Vec<Chunk>, start, end, kind, name: &str| {
            for (s, e) in split_oversized(text, start, end, max) {
                chunks.push(Chunk::from_range(
                    text,
                    &lines,
                    s,
                    e,
                    kind,
                    ChunkOrigin::Symbol {
                        name: name.to_string(),
                        language,
                    },
                ));
            }
        };

        for unit in units {
            if unit.start > cursor {
                push_range(&mut chunks, cursor, unit.start, ChunkKind::Preamble, "");
            }
            push_range(&mut chunks, unit.start, unit.end, unit.kind, &unit.name);
            cursor = cursor.max(unit.end);
        }
        if cursor < text.len() {
            push_range(&mut chunks, cursor, text.len(), ChunkKind::Preamble, "");
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker() -> Chunker {
        Chunker::new(ChunkingConfig::default())
    }

    #[test]
    fn test_content_hash_stable() {
        assert_eq!(content_hash("Use JWT."), content_hash("Use JWT."));
        assert_ne!(content_hash("Use JWT."), content_hash("Use PKCE."));
        assert_eq!(content_hash("").len(), 64);
    }

    #[test]
    fn test_empty_input_yields_one_chunk() {
        let chunks = chunker().chunk("notes.md", "");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Text);
        assert_eq!(chunks[0].content, "");

        let chunks = chunker().chunk("src/empty.rs", "   \n\n");
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_sentences_become_chunks() {
        let chunks = chunker().chunk("patterns/auth.md", "Use JWT. Use PKCE.");
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["Use JWT.", "Use PKCE."]);
        assert_eq!(chunks[1].metadata.index, 1);
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let text = "# Auth\n\nUse JWT. Rotate keys.\n\n```rust\nfn main() {}\n```\n\n- one\n- two\n";
        let first = chunker().chunk("docs/auth.md", text);
        let second = chunker().chunk("docs/auth.md", text);
        assert_eq!(first, second);

        let code = "use std::io;\n\nfn a() {}\n\nstruct B;\n";
        assert_eq!(chunker().chunk("lib.rs", code), chunker().chunk("lib.rs", code));
    }

    #[test]
    fn test_code_chunks_cover_declarations_and_gaps() {
        let code = "use std::fmt;\n\n/// Adds numbers\npub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n\npub struct Point {\n    x: i32,\n}\n";
        let chunks = chunker().chunk("src/math.rs", code);

        let kinds: Vec<ChunkKind> = chunks.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![ChunkKind::Preamble, ChunkKind::Function, ChunkKind::Type]
        );
        assert!(chunks[1].content.starts_with("/// Adds numbers"));
        assert_eq!(
            chunks[1].metadata.origin,
            ChunkOrigin::Symbol {
                name: "add".to_string(),
                language: Language::Rust
            }
        );
        assert_eq!(chunks[1].metadata.start_line, 3);
        assert_eq!(chunks[1].metadata.end_line, 6);
    }

    #[test]
    fn test_broken_code_falls_back() {
        let code = "fn broken( {\n    let x = ;\n\nstruct";
        let chunks = chunker().chunk("src/broken.rs", code);
        assert!(!chunks.is_empty());
        assert!(chunks
            .iter()
            .all(|c| matches!(c.metadata.origin, ChunkOrigin::Fallback { .. })));
    }

    #[test]
    fn test_syntax_awareness_can_be_disabled() {
        let config = ChunkingConfig {
            syntax_aware: false,
            ..ChunkingConfig::default()
        };
        let chunks = Chunker::new(config).chunk("src/lib.rs", "fn a() {}\n");
        assert!(chunks
            .iter()
            .all(|c| matches!(c.metadata.origin, ChunkOrigin::Section { .. })));
    }

    #[test]
    fn test_split_oversized_respects_limit() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let pieces = split_oversized(text, 0, text.len(), 12);
        assert!(pieces.len() > 1);
        for (s, e) in &pieces {
            assert!(e - s <= 12);
        }
        let rejoined: Vec<&str> = pieces.iter().map(|(s, e)| &text[*s..*e]).collect();
        assert_eq!(rejoined.join(" "), text);
    }

    #[test]
    fn test_line_index() {
        let lines = LineIndex::new("a\nbb\nccc");
        assert_eq!(lines.line_of(0), 1);
        assert_eq!(lines.line_of(2), 2);
        assert_eq!(lines.line_of(3), 2);
        assert_eq!(lines.line_of(5), 3);
    }
}
