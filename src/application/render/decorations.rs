//! Intra-line change spans for paired deletion/addition lines.

use crate::domain::{DecorationItem, LineDiffType};
use similar::{Algorithm, DiffOp, capture_diff_slices};
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LineDecorations {
    pub deletions: Vec<DecorationItem>,
    pub additions: Vec<DecorationItem>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TokenKind {
    Whitespace,
    Other,
}

#[derive(Clone, Debug)]
struct Token {
    range: Range<usize>,
    kind: TokenKind,
}

/// Spans that differ between `old` and `new`, in character offsets.
///
/// Returns `None` when decorations are disabled or either line is longer
/// than `max_len` characters. `old_row`/`new_row` become the `line` of the
/// emitted positions.
pub fn line_decorations(
    old: &str,
    new: &str,
    kind: LineDiffType,
    max_len: usize,
    old_row: usize,
    new_row: usize,
) -> Option<LineDecorations> {
    if kind == LineDiffType::None {
        return None;
    }
    if old.chars().count() > max_len || new.chars().count() > max_len {
        return None;
    }

    let (old_tokens, new_tokens) = match kind {
        LineDiffType::Char => (tokenize_chars(old), tokenize_chars(new)),
        _ => (tokenize_words(old), tokenize_words(new)),
    };
    let (old_ranges, new_ranges) = changed_ranges(old, &old_tokens, new, &new_tokens);

    let merge_gap = match kind {
        LineDiffType::Word => 0,
        _ => 1,
    };

    Some(LineDecorations {
        deletions: to_items(old, coalesce(old, old_ranges, merge_gap), old_row),
        additions: to_items(new, coalesce(new, new_ranges, merge_gap), new_row),
    })
}

fn tokenize_words(s: &str) -> Vec<Token> {
    fn classify(c: char) -> (u8, TokenKind) {
        if c.is_whitespace() {
            return (0, TokenKind::Whitespace);
        }
        if c.is_alphanumeric() || c == '_' {
            return (1, TokenKind::Other);
        }
        (2, TokenKind::Other)
    }

    let mut out = Vec::new();
    let mut it = s.char_indices().peekable();
    while let Some((start, ch)) = it.next() {
        let (class, kind) = classify(ch);
        let mut end = start + ch.len_utf8();
        // Punctuation stays one token per character.
        while class != 2
            && let Some(&(next_start, next_ch)) = it.peek()
        {
            if classify(next_ch).0 != class {
                break;
            }
            it.next();
            end = next_start + next_ch.len_utf8();
        }
        out.push(Token {
            range: start..end,
            kind,
        });
    }
    out
}

fn tokenize_chars(s: &str) -> Vec<Token> {
    s.char_indices()
        .map(|(start, ch)| Token {
            range: start..start + ch.len_utf8(),
            kind: if ch.is_whitespace() {
                TokenKind::Whitespace
            } else {
                TokenKind::Other
            },
        })
        .collect()
}

/// Byte ranges of non-whitespace tokens that are not part of the common
/// subsequence.
fn changed_ranges(
    old: &str,
    old_tokens: &[Token],
    new: &str,
    new_tokens: &[Token],
) -> (Vec<Range<usize>>, Vec<Range<usize>>) {
    let old_slices: Vec<&str> = old_tokens.iter().map(|t| &old[t.range.clone()]).collect();
    let new_slices: Vec<&str> = new_tokens.iter().map(|t| &new[t.range.clone()]).collect();

    let mut old_out = Vec::new();
    let mut new_out = Vec::new();
    for op in capture_diff_slices(Algorithm::Myers, &old_slices, &new_slices) {
        match op {
            DiffOp::Equal { .. } => {}
            DiffOp::Delete {
                old_index, old_len, ..
            } => collect(&old_tokens[old_index..old_index + old_len], &mut old_out),
            DiffOp::Insert {
                new_index, new_len, ..
            } => collect(&new_tokens[new_index..new_index + new_len], &mut new_out),
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => {
                collect(&old_tokens[old_index..old_index + old_len], &mut old_out);
                collect(&new_tokens[new_index..new_index + new_len], &mut new_out);
            }
        }
    }
    (old_out, new_out)
}

fn collect(tokens: &[Token], out: &mut Vec<Range<usize>>) {
    out.extend(
        tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Other)
            .map(|t| t.range.clone()),
    );
}

/// Merge byte ranges of `text` that touch or are separated by at most `gap`
/// characters.
fn coalesce(text: &str, ranges: Vec<Range<usize>>, gap: usize) -> Vec<Range<usize>> {
    let mut out: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
    for r in ranges {
        if let Some(last) = out.last_mut()
            && (r.start <= last.end || text[last.end..r.start].chars().count() <= gap)
        {
            last.end = last.end.max(r.end);
            continue;
        }
        out.push(r);
    }
    out
}

fn to_items(text: &str, ranges: Vec<Range<usize>>, row: usize) -> Vec<DecorationItem> {
    ranges
        .into_iter()
        .map(|r| {
            let start = text[..r.start].chars().count();
            let len = text[r.clone()].chars().count();
            DecorationItem::on_line(row, start, start + len)
        })
        .collect()
}
