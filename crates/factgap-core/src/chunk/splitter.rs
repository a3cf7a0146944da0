//! Recursive separator-based splitting.
//!
//! Works on byte ranges of the input so every produced window is an exact
//! substring of the source, which keeps line-span mapping trivial for the
//! common case. Lengths are measured in characters.

use std::collections::VecDeque;
use std::ops::Range;

/// Splits text into overlapping windows of at most `chunk_size` characters.
#[derive(Debug, Clone, Copy)]
pub struct RecursiveSplitter<'s> {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &'s [&'s str],
}

impl<'s> RecursiveSplitter<'s> {
    pub fn new(chunk_size: usize, chunk_overlap: usize, separators: &'s [&'s str]) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size),
            separators,
        }
    }

    /// Split `text`, returning trimmed, non-empty windows in source order.
    pub fn split<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.split_spans(text)
            .into_iter()
            .map(|r| &text[r])
            .collect()
    }

    /// Byte ranges of the windows [`split`](Self::split) would return.
    pub fn split_spans(&self, text: &str) -> Vec<Range<usize>> {
        let mut out = Vec::new();
        self.split_range(text, 0..text.len(), self.separators, &mut out);
        out.into_iter()
            .filter_map(|r| trim_range(text, r))
            .collect()
    }

    fn split_range(
        &self,
        text: &str,
        range: Range<usize>,
        separators: &[&str],
        out: &mut Vec<Range<usize>>,
    ) {
        let slice = &text[range.clone()];

        let mut separator = separators.last().copied().unwrap_or("");
        let mut remaining: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                break;
            }
            if slice.contains(sep) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let pieces = split_keep_separator(slice, separator, range.start);

        let mut good: Vec<Range<usize>> = Vec::new();
        for piece in pieces {
            if char_len(text, &piece) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                self.merge(text, &good, out);
                good.clear();
            }
            if remaining.is_empty() {
                out.push(piece);
            } else {
                self.split_range(text, piece, remaining, out);
            }
        }
        if !good.is_empty() {
            self.merge(text, &good, out);
        }
    }

    /// Greedily pack contiguous pieces into windows, carrying up to
    /// `chunk_overlap` characters of trailing pieces into the next window.
    fn merge(&self, text: &str, pieces: &[Range<usize>], out: &mut Vec<Range<usize>>) {
        let mut current: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(text, piece);
            if total + len > self.chunk_size && !current.is_empty() {
                push_window(&current, out);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match current.pop_front() {
                        Some((_, l)) => total -= l,
                        None => break,
                    }
                }
            }
            current.push_back((piece.clone(), len));
            total += len;
        }
        push_window(&current, out);
    }
}

fn push_window(current: &VecDeque<(Range<usize>, usize)>, out: &mut Vec<Range<usize>>) {
    if let (Some((first, _)), Some((last, _))) = (current.front(), current.back()) {
        out.push(first.start..last.end);
    }
}

/// Split `slice` at every occurrence of `separator`, keeping the separator
/// at the start of the following piece. Empty pieces are dropped. An empty
/// separator splits into single characters. Ranges are offset by `base`.
fn split_keep_separator(slice: &str, separator: &str, base: usize) -> Vec<Range<usize>> {
    if separator.is_empty() {
        return slice
            .char_indices()
            .map(|(i, c)| base + i..base + i + c.len_utf8())
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in slice.match_indices(separator) {
        if idx > start {
            pieces.push(base + start..base + idx);
        }
        start = idx;
    }
    if start < slice.len() {
        pieces.push(base + start..base + slice.len());
    }
    pieces
}

fn char_len(text: &str, range: &Range<usize>) -> usize {
    text[range.clone()].chars().count()
}

fn trim_range(text: &str, range: Range<usize>) -> Option<Range<usize>> {
    let slice = &text[range.clone()];
    let trimmed_start = slice.trim_start();
    if trimmed_start.is_empty() {
        return None;
    }
    let start = range.start + (slice.len() - trimmed_start.len());
    let end = start + trimmed_start.trim_end().len();
    Some(start..end)
}
