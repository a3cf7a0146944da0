//! Language-aware chunking with line-span mapping.
//!
//! Three entry points share one [`RecursiveSplitter`]:
//!
//! | Function | Default size / overlap | Boundaries |
//! |----------|------------------------|------------|
//! | [`chunk_code`] | 1200 / 150 | per-[`Language`] declarations, then generic |
//! | [`chunk_diff`] | 800 / 100 | hunk headers, lines |
//! | [`chunk_document`] | 1000 / 150 | paragraphs, lines, words |
//!
//! Every returned [`TextChunk`] carries the 1-based inclusive line span it
//! came from, resolved by [`LineSpanMapper`]. Chunking is deterministic:
//! identical text and configuration always produce identical chunks.

pub mod language;
pub mod splitter;

use serde::{Deserialize, Serialize};

pub use language::{Language, DIFF_SEPARATORS, GENERIC_SEPARATORS};
pub use splitter::RecursiveSplitter;

/// Window size and overlap, both in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl ChunkerConfig {
    pub const CODE: ChunkerConfig = ChunkerConfig {
        chunk_size: 1200,
        chunk_overlap: 150,
    };
    pub const DIFF: ChunkerConfig = ChunkerConfig {
        chunk_size: 800,
        chunk_overlap: 100,
    };
    /// Repository docs and Notion pages.
    pub const DOCUMENT: ChunkerConfig = ChunkerConfig {
        chunk_size: 1000,
        chunk_overlap: 150,
    };
}

/// One chunk of source text and where it sits in the original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
}

/// Chunk source code. Unknown languages use the generic boundaries.
pub fn chunk_code(text: &str, language: Option<Language>, config: &ChunkerConfig) -> Vec<TextChunk> {
    let separators = language.map_or(GENERIC_SEPARATORS, |l| l.separators());
    chunk_with(text, config, separators)
}

/// Chunk a unified diff, preferring hunk boundaries.
pub fn chunk_diff(text: &str, config: &ChunkerConfig) -> Vec<TextChunk> {
    chunk_with(text, config, DIFF_SEPARATORS)
}

/// Chunk prose (repository docs, Notion pages).
pub fn chunk_document(text: &str, config: &ChunkerConfig) -> Vec<TextChunk> {
    chunk_with(text, config, GENERIC_SEPARATORS)
}

fn chunk_with(text: &str, config: &ChunkerConfig, separators: &[&str]) -> Vec<TextChunk> {
    let splitter = RecursiveSplitter::new(config.chunk_size, config.chunk_overlap, separators);
    let mut mapper = LineSpanMapper::new(text);
    splitter
        .split(text)
        .into_iter()
        .map(|piece| {
            let (start_line, end_line) = mapper.map(piece);
            TextChunk {
                text: piece.to_string(),
                start_line,
                end_line,
            }
        })
        .collect()
}

/// Resolves chunk texts back to line spans in the original, in order.
///
/// Keeps a cursor so repeated content resolves to successive occurrences.
/// The cursor advances to one character past each match *start*, so
/// overlapping windows (which begin before the previous one ends) are
/// still found. When the exact text is not present, a whitespace-normalized
/// search is tried from the cursor (then from the top) and mapped back to
/// original offsets. Failures yield
/// `(None, None)`; mapping never errors.
pub struct LineSpanMapper<'a> {
    original: &'a str,
    cursor: usize,
    normalized: Option<Normalized>,
}

impl<'a> LineSpanMapper<'a> {
    pub fn new(original: &'a str) -> Self {
        Self {
            original,
            cursor: 0,
            normalized: None,
        }
    }

    pub fn map(&mut self, chunk: &str) -> (Option<usize>, Option<usize>) {
        if chunk.is_empty() {
            return (None, None);
        }

        if let Some(rel) = self.original[self.cursor..].find(chunk) {
            let start = self.cursor + rel;
            return self.resolve(start, start + chunk.len());
        }

        let normalized = self
            .normalized
            .get_or_insert_with(|| Normalized::new(self.original));
        let found = normalized
            .find_from(chunk, self.cursor)
            .or_else(|| normalized.find_from(chunk, 0));
        match found {
            Some((start, end)) => self.resolve(start, end),
            None => (None, None),
        }
    }

    fn resolve(&mut self, start: usize, end: usize) -> (Option<usize>, Option<usize>) {
        let step = self.original[start..]
            .chars()
            .next()
            .map_or(1, char::len_utf8);
        self.cursor = (start + step).min(self.original.len());
        (
            Some(1 + newlines_before(self.original, start)),
            Some(1 + newlines_before(self.original, end)),
        )
    }
}

fn newlines_before(text: &str, offset: usize) -> usize {
    text.as_bytes()[..offset].iter().filter(|&&b| b == b'\n').count()
}

/// Whitespace-collapsed copy of a text with a byte map back to the source.
struct Normalized {
    text: String,
    /// For each byte of `text`: (start, end) of the source span it came from.
    origin: Vec<(usize, usize)>,
}

impl Normalized {
    fn new(source: &str) -> Self {
        let mut text = String::with_capacity(source.len());
        let mut origin = Vec::with_capacity(source.len());
        let mut run_start: Option<usize> = None;

        for (i, c) in source.char_indices() {
            if c.is_whitespace() {
                run_start.get_or_insert(i);
                continue;
            }
            if let Some(rs) = run_start.take() {
                text.push(' ');
                origin.push((rs, i));
            }
            let end = i + c.len_utf8();
            text.push(c);
            origin.extend(std::iter::repeat((i, end)).take(c.len_utf8()));
        }
        if let Some(rs) = run_start {
            text.push(' ');
            origin.push((rs, source.len()));
        }
        Self { text, origin }
    }

    /// Find `chunk` at or after source offset `from`.
    fn find_from(&self, chunk: &str, from: usize) -> Option<(usize, usize)> {
        let needle = collapse_whitespace(chunk);
        if needle.is_empty() {
            return None;
        }
        let offset = self.origin.partition_point(|&(start, _)| start < from);
        let pos = offset + self.text.get(offset..)?.find(&needle)?;
        let start = self.origin[pos].0;
        let end = self.origin[pos + needle.len() - 1].1;
        Some((start, end))
    }
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_ws = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !in_ws {
                out.push(' ');
            }
            in_ws = true;
        } else {
            out.push(c);
            in_ws = false;
        }
    }
    out
}
