//! Text splitting for Markdown and plain documents
//!
//! Headings delimit sections and give every unit a heading path. Within a
//! section:
//! - Code blocks, list items and tables are one unit each
//! - Paragraphs are split into sentences
//!
//! Oversized units are hard split near whitespace.

use super::{split_oversized, trim_range, Chunk, ChunkKind, ChunkOrigin, LineIndex};
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag};

/// Splits text into chunks
pub struct TextSplitter {
    max_chunk_chars: usize,
}

impl TextSplitter {
    /// Create a splitter with the given hard size limit
    pub fn new(max_chunk_chars: usize) -> Self {
        Self { max_chunk_chars }
    }

    /// Split Markdown (or plain) text
    pub fn split(&self, text: &str) -> Vec<Chunk> {
        let lines = LineIndex::new(text);
        let mut chunks = Vec::new();
        let mut heading_path: Vec<(HeadingLevel, String)> = Vec::new();
        let mut skip_until = 0;

        let parser = Parser::new_ext(text, Options::ENABLE_TABLES).into_offset_iter();

        for (event, range) in parser {
            let Event::Start(tag) = event else {
                continue;
            };
            if range.start < skip_until {
                continue;
            }

            let kind = match tag {
                Tag::Heading { level, .. } => {
                    let title = heading_text(&text[range.clone()]);
                    while heading_path
                        .last()
                        .is_some_and(|(l, _)| *l as usize >= level as usize)
                    {
                        heading_path.pop();
                    }
                    heading_path.push((level, title));
                    ChunkKind::Heading
                }
                Tag::Paragraph => {
                    let path = path_names(&heading_path);
                    for (s, e) in sentence_ranges(text, range.start, range.end) {
                        self.push_unit(&mut chunks, text, &lines, s, e, ChunkKind::Sentence, &path);
                    }
                    skip_until = range.end;
                    continue;
                }
                Tag::CodeBlock(_) => ChunkKind::CodeBlock,
                Tag::Item => ChunkKind::ListItem,
                Tag::Table(_) => ChunkKind::Table,
                // Containers whose children are handled individually
                Tag::List(_) => continue,
                _ => ChunkKind::Text,
            };

            let path = path_names(&heading_path);
            self.push_unit(&mut chunks, text, &lines, range.start, range.end, kind, &path);
            skip_until = range.end;
        }

        chunks
    }

    /// Fallback splitting on blank lines for text that failed structural
    /// parsing. Each chunk carries the failure reason.
    pub fn split_blocks(&self, text: &str, reason: &str) -> Vec<Chunk> {
        let lines = LineIndex::new(text);
        let mut chunks = Vec::new();

        for (start, end) in block_ranges(text) {
            for (s, e) in split_oversized(text, start, end, self.max_chunk_chars) {
                chunks.push(Chunk::from_range(
                    text,
                    &lines,
                    s,
                    e,
                    ChunkKind::Text,
                    ChunkOrigin::Fallback {
                        reason: reason.to_string(),
                    },
                ));
            }
        }

        chunks
    }

    #[allow(clippy::too_many_arguments)]
    fn push_unit(
        &self,
        chunks: &mut Vec<Chunk>,
        text: &str,
        lines: &LineIndex,
        start: usize,
        end: usize,
        kind: ChunkKind,
        heading_path: &[String],
    ) {
        let Some((start, end)) = trim_range(text, start, end) else {
            return;
        };
        for (s, e) in split_oversized(text, start, end, self.max_chunk_chars) {
            chunks.push(Chunk::from_range(
                text,
                lines,
                s,
                e,
                kind,
                ChunkOrigin::Section {
                    heading_path: heading_path.to_vec(),
                },
            ));
        }
    }
}

fn path_names(path: &[(HeadingLevel, String)]) -> Vec<String> {
    path.iter().map(|(_, h)| h.clone()).collect()
}

/// Heading text without ATX markers or a setext underline
fn heading_text(raw: &str) -> String {
    let first = raw.lines().next().unwrap_or("").trim();
    first
        .trim_start_matches('#')
        .trim_end_matches('#')
        .trim()
        .to_string()
}

/// Sentence boundaries inside `start..end`.
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace, or at the end
/// of the range. Decimals and dotted identifiers stay intact.
pub(crate) fn sentence_ranges(text: &str, start: usize, end: usize) -> Vec<(usize, usize)> {
    let slice = &text[start..end];
    let mut ranges = Vec::new();
    let mut sentence_start = 0;
    let mut chars = slice.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let boundary = match chars.peek() {
            Some((_, next)) => next.is_whitespace(),
            None => true,
        };
        if boundary {
            let sentence_end = i + c.len_utf8();
            if let Some(r) = trim_range(text, start + sentence_start, start + sentence_end) {
                ranges.push(r);
            }
            sentence_start = sentence_end;
        }
    }

    if sentence_start < slice.len() {
        if let Some(r) = trim_range(text, start + sentence_start, end) {
            ranges.push(r);
        }
    }

    ranges
}

/// Blank-line separated blocks
fn block_ranges(text: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut block_start: Option<usize> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        if line.trim().is_empty() {
            if let Some(s) = block_start.take() {
                ranges.extend(trim_range(text, s, offset));
            }
        } else if block_start.is_none() {
            block_start = Some(offset);
        }
        offset += line.len();
    }
    if let Some(s) = block_start {
        ranges.extend(trim_range(text, s, text.len()));
    }

    ranges
}
