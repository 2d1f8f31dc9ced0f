//! Codepoint bookkeeping.
//!
//! The regex engine and `str` slicing work in bytes; every span the crate
//! hands out is in codepoints. Helpers here translate between the two, split
//! documents into lines, find word tokens and decode raw bytes while
//! remembering where the malformed sequences were.

use crate::CodepointSpan;
use unicode_segmentation::UnicodeSegmentation;

/// Byte offset of every codepoint in a string, plus the total length.
#[derive(Debug, Clone)]
pub(crate) struct CodepointIndex {
    starts: Vec<usize>,
}

impl CodepointIndex {
    pub fn new(text: &str) -> Self {
        let mut starts: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        starts.push(text.len());
        Self { starts }
    }

    /// Number of codepoints.
    pub fn len(&self) -> usize {
        self.starts.len() - 1
    }

    /// Codepoint position of a byte offset that lies on a char boundary.
    pub fn to_codepoint(&self, byte: usize) -> usize {
        self.starts.partition_point(|&b| b < byte)
    }

    pub fn to_byte(&self, codepoint: usize) -> usize {
        self.starts[codepoint.min(self.len())]
    }

    pub fn span_of(&self, start_byte: usize, end_byte: usize) -> CodepointSpan {
        CodepointSpan::new(self.to_codepoint(start_byte) as i32, self.to_codepoint(end_byte) as i32)
    }

    pub fn slice<'t>(&self, text: &'t str, span: CodepointSpan) -> &'t str {
        let range = span.range();
        &text[self.to_byte(range.start)..self.to_byte(range.end)]
    }
}

/// One line of a document, with its position in the whole text.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Line<'t> {
    pub text: &'t str,
    /// Codepoint offset of the first codepoint of the line.
    pub begin: usize,
    /// Codepoint length of the line, excluding the terminator.
    pub len: usize,
}

impl Line<'_> {
    pub fn span(&self) -> CodepointSpan {
        CodepointSpan::new(self.begin as i32, (self.begin + self.len) as i32)
    }
}

/// Split on `'\n'`. The terminator belongs to no line.
pub(crate) fn lines(text: &str) -> Vec<Line<'_>> {
    let mut out = Vec::new();
    let mut begin = 0;
    for piece in text.split('\n') {
        let len = piece.chars().count();
        out.push(Line { text: piece, begin, len });
        begin += len + 1;
    }
    out
}

/// The line holding all of `span`, or `None` when the span crosses a line break.
pub(crate) fn line_containing(text: &str, span: CodepointSpan) -> Option<Line<'_>> {
    lines(text).into_iter().find(|line| line.span().contains(&span) && !span.is_empty())
}

pub(crate) fn is_all_whitespace(chars: &[char]) -> bool {
    chars.iter().all(|c| c.is_whitespace())
}

/// Word tokens of `text` (whitespace segments skipped), in codepoints.
pub(crate) fn word_spans(text: &str) -> Vec<CodepointSpan> {
    let index = CodepointIndex::new(text);
    text.split_word_bound_indices()
        .filter(|(_, w)| !w.chars().all(char::is_whitespace))
        .map(|(start, w)| index.span_of(start, start + w.len()))
        .collect()
}

pub(crate) fn token_count(text: &str) -> usize {
    text.split_word_bounds().filter(|w| !w.chars().all(char::is_whitespace)).count()
}

/// Text decoded from raw bytes.
///
/// Each malformed UTF-8 sequence becomes one U+FFFD codepoint whose position
/// is recorded, so that spans touching it can be excluded.
#[derive(Debug, Clone, Default)]
pub(crate) struct DecodedText {
    pub text: String,
    /// Sorted codepoint positions of malformed sequences.
    pub malformed: Vec<usize>,
}

impl DecodedText {
    pub fn decode(bytes: &[u8]) -> Self {
        let mut text = String::with_capacity(bytes.len());
        let mut malformed = Vec::new();
        let mut codepoints = 0;

        for chunk in bytes.utf8_chunks() {
            text.push_str(chunk.valid());
            codepoints += chunk.valid().chars().count();
            if !chunk.invalid().is_empty() {
                text.push(char::REPLACEMENT_CHARACTER);
                malformed.push(codepoints);
                codepoints += 1;
            }
        }

        if !malformed.is_empty() {
            tracing::debug!(sequences = malformed.len(), "input contains malformed UTF-8");
        }
        Self { text, malformed }
    }

    /// Positions to exclude, as a borrowed view.
    pub fn exclusions(&self) -> Exclusions<'_> {
        Exclusions { positions: &self.malformed }
    }
}

/// Codepoint positions no result may cover.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Exclusions<'a> {
    positions: &'a [usize],
}

impl<'a> Exclusions<'a> {
    pub fn none() -> Self {
        Self { positions: &[] }
    }

    /// Whether `span` (in whole-text coordinates) covers an excluded position.
    pub fn touches(&self, span: CodepointSpan) -> bool {
        if self.positions.is_empty() || span.is_empty() || span.end <= 0 {
            return false;
        }
        let range = span.range();
        let first = self.positions.partition_point(|&p| p < range.start);
        self.positions.get(first).is_some_and(|&p| p < range.end)
    }

    /// Whether every codepoint of `span` is excluded.
    pub fn covers(&self, span: CodepointSpan) -> bool {
        !span.is_empty() && span.range().all(|p| self.positions.binary_search(&p).is_ok())
    }
}
