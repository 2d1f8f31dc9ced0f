//! Selection refinement.
//!
//! Adjusts the boundaries of the single span chosen for a selection request:
//!
//! 1. **Whitespace snap**: a selection made only of whitespace moves onto the
//!    nearest non-whitespace codepoint to its left on the same line.
//! 2. **Bracket stripping**: a leading bracket is dropped when it is a closing
//!    bracket, or an opening bracket whose partner does not occur in the span;
//!    symmetrically at the end. Repeats until nothing changes.
//!
//! Refinement fails soft: a step that would leave nothing (or only
//! whitespace) is discarded. Spans that are empty or fall outside the text
//! come back untouched. [`refine`] is idempotent.
//!
//! [`token_span`] widens a cursor to the word tokens it touches. The
//! pipeline uses it when no candidate covers a click, so that clicking
//! anywhere inside a token refines to the same span.

use crate::CodepointSpan;
use crate::text::{is_all_whitespace, word_spans};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bracket {
    Opening(char),
    Closing(char),
}

const BRACKET_PAIRS: &[(char, char)] = &[
    ('(', ')'),
    ('[', ']'),
    ('{', '}'),
    ('<', '>'),
    ('«', '»'),
    ('‹', '›'),
    ('“', '”'),
    ('‘', '’'),
    ('（', '）'),
    ('［', '］'),
    ('｛', '｝'),
    ('〈', '〉'),
    ('《', '》'),
    ('「', '」'),
    ('『', '』'),
    ('【', '】'),
    ('〔', '〕'),
];

/// The bracket role of `c`, carrying its partner.
fn bracket(c: char) -> Option<Bracket> {
    BRACKET_PAIRS.iter().find_map(|&(open, close)| {
        if c == open {
            Some(Bracket::Opening(close))
        } else if c == close {
            Some(Bracket::Closing(open))
        } else {
            None
        }
    })
}

/// Whitespace snap followed by bracket stripping.
pub fn refine(text: &str, span: CodepointSpan) -> CodepointSpan {
    let chars: Vec<char> = text.chars().collect();
    if !span.is_valid_in(chars.len()) {
        return span;
    }
    let snapped = snap_chars(&chars, span);
    let refined = strip_chars(&chars, snapped);
    if refined != span {
        tracing::trace!(from = %span, to = %refined, "refined selection");
    }
    refined
}

/// Move an all-whitespace selection onto the nearest non-whitespace
/// codepoint to its left. Unchanged when there is none on the same line.
pub fn snap_whitespace(text: &str, span: CodepointSpan) -> CodepointSpan {
    let chars: Vec<char> = text.chars().collect();
    if !span.is_valid_in(chars.len()) {
        return span;
    }
    snap_chars(&chars, span)
}

/// Drop unpaired brackets at both ends. Falls back to `span` when stripping
/// would leave nothing but whitespace.
pub fn strip_unpaired_brackets(text: &str, span: CodepointSpan) -> CodepointSpan {
    let chars: Vec<char> = text.chars().collect();
    if !span.is_valid_in(chars.len()) {
        return span;
    }
    strip_chars(&chars, span)
}

fn snap_chars(chars: &[char], span: CodepointSpan) -> CodepointSpan {
    if !is_all_whitespace(&chars[span.range()]) {
        return span;
    }
    for (pos, &c) in chars[..span.range().start].iter().enumerate().rev() {
        if c == '\n' {
            break;
        }
        if !c.is_whitespace() {
            return CodepointSpan::new(pos as i32, pos as i32 + 1);
        }
    }
    span
}

fn strip_chars(chars: &[char], span: CodepointSpan) -> CodepointSpan {
    let (mut begin, mut end) = (span.range().start, span.range().end);

    loop {
        let (prev_begin, prev_end) = (begin, end);

        let strip_begin = match bracket(chars[begin]) {
            Some(Bracket::Opening(partner)) => !chars[begin + 1..end].contains(&partner),
            Some(Bracket::Closing(_)) => true,
            None => false,
        };
        if strip_begin {
            begin += 1;
        }
        if begin >= end {
            break;
        }

        let strip_end = match bracket(chars[end - 1]) {
            Some(Bracket::Closing(partner)) => !chars[begin..end - 1].contains(&partner),
            Some(Bracket::Opening(_)) => true,
            None => false,
        };
        if strip_end {
            end -= 1;
        }
        if begin >= end || (begin, end) == (prev_begin, prev_end) {
            break;
        }
    }

    if begin >= end || is_all_whitespace(&chars[begin..end]) {
        return span;
    }
    CodepointSpan::new(begin as i32, end as i32)
}

/// Widen `span` to the word tokens of `text` it touches. An empty span
/// widens to the token holding its position. Unchanged if it touches none.
pub fn token_span(text: &str, span: CodepointSpan) -> CodepointSpan {
    let probe = if span.is_empty() { CodepointSpan::new(span.begin, span.begin + 1) } else { span };
    word_spans(text)
        .into_iter()
        .filter(|token| token.overlaps(&probe))
        .reduce(CodepointSpan::union)
        .unwrap_or(span)
}
