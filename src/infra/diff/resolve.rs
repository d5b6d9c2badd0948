//! Accepting or rejecting individual hunks.
//!
//! Every operation returns a new [`FileDiffMetadata`]; the input is never
//! touched, so callers can keep a history of states for undo/redo.

use crate::domain::{
    ContextContent, DiffError, FileDiffMetadata, Hunk, HunkContent, HunkDecision,
};

/// Resolve one hunk.
///
/// `Accept` turns the hunk into context holding its additions and rewrites the
/// old side to match. `Reject` turns it into context holding its deletions and
/// rewrites the new side. Later hunks are shifted by the resolved hunk's line
/// delta on the side that changed.
pub fn diff_accept_reject_hunk(
    diff: &FileDiffMetadata,
    hunk_index: usize,
    decision: HunkDecision,
) -> Result<FileDiffMetadata, DiffError> {
    let Some(target) = diff.hunks.get(hunk_index) else {
        return Err(DiffError::HunkOutOfRange {
            index: hunk_index,
            count: diff.hunks.len(),
        });
    };

    let mut next = diff.clone();
    let delta = target.addition_count as isize - target.deletion_count as isize;

    match decision {
        HunkDecision::Accept => {
            if let Some(old_lines) = next.old_lines.as_mut() {
                splice_lines(
                    old_lines,
                    target.old_side_first_line() - 1,
                    target.deletion_count,
                    side_lines(target, HunkDecision::Accept),
                );
            }
            for later in next.hunks.iter_mut().skip(hunk_index + 1) {
                later.deletion_start = later.deletion_start.saturating_add_signed(delta);
                later.hunk_specs = format_hunk_specs(later);
            }
        }
        HunkDecision::Reject => {
            if let Some(new_lines) = next.new_lines.as_mut() {
                splice_lines(
                    new_lines,
                    target.new_side_first_line() - 1,
                    target.addition_count,
                    side_lines(target, HunkDecision::Reject),
                );
            }
            for later in next.hunks.iter_mut().skip(hunk_index + 1) {
                later.addition_start = later.addition_start.saturating_add_signed(-delta);
                later.hunk_specs = format_hunk_specs(later);
            }
        }
    }

    next.hunks[hunk_index] = resolve_hunk(target, decision);
    next.recompute_layout();
    Ok(next)
}

/// The hunk after applying `decision`: context only, both sides equal.
fn resolve_hunk(hunk: &Hunk, decision: HunkDecision) -> Hunk {
    let mut content: Vec<HunkContent> = Vec::with_capacity(hunk.hunk_content.len());
    for item in &hunk.hunk_content {
        let (lines, no_eof_newline) = match item {
            HunkContent::Context(ctx) => (ctx.lines.clone(), ctx.no_eof_newline),
            HunkContent::Change(change) => {
                let (kept, flag) = match decision {
                    HunkDecision::Accept => (&change.additions, change.no_eof_newline_additions),
                    HunkDecision::Reject => (&change.deletions, change.no_eof_newline_deletions),
                };
                let lines = kept
                    .iter()
                    .map(|line| format!(" {}", strip_marker(line)))
                    .collect();
                (lines, flag)
            }
        };
        if lines.is_empty() {
            continue;
        }
        match content.last_mut() {
            Some(HunkContent::Context(prev)) => {
                prev.lines.extend(lines);
                prev.no_eof_newline = no_eof_newline;
            }
            _ => content.push(HunkContent::Context(ContextContent {
                lines,
                no_eof_newline,
            })),
        }
    }

    let mut resolved = hunk.clone();
    resolved.hunk_content = content;
    match decision {
        HunkDecision::Accept => {
            let region = hunk.old_side_first_line();
            resolved.deletion_count = hunk.addition_count;
            resolved.deletion_start = range_start(region, resolved.deletion_count);
        }
        HunkDecision::Reject => {
            let region = hunk.new_side_first_line();
            resolved.addition_count = hunk.deletion_count;
            resolved.addition_start = range_start(region, resolved.addition_count);
        }
    }
    resolved.hunk_specs = format_hunk_specs(&resolved);
    resolved.recount();
    resolved
}

/// Header start for a range beginning at `first_line`; empty ranges name the line before.
fn range_start(first_line: usize, count: usize) -> usize {
    if count == 0 {
        first_line.saturating_sub(1)
    } else {
        first_line
    }
}

/// Lines of the side `decision` keeps, without diff markers, in file order.
fn side_lines(hunk: &Hunk, decision: HunkDecision) -> Vec<String> {
    let mut out = Vec::new();
    for item in &hunk.hunk_content {
        match item {
            HunkContent::Context(ctx) => {
                out.extend(ctx.lines.iter().map(|line| strip_marker(line).to_string()))
            }
            HunkContent::Change(change) => {
                let kept = match decision {
                    HunkDecision::Accept => &change.additions,
                    HunkDecision::Reject => &change.deletions,
                };
                out.extend(kept.iter().map(|line| strip_marker(line).to_string()));
            }
        }
    }
    out
}

fn splice_lines(lines: &mut Vec<String>, start: usize, count: usize, replacement: Vec<String>) {
    let start = start.min(lines.len());
    let end = (start + count).min(lines.len());
    lines.splice(start..end, replacement);
}

fn strip_marker(line: &str) -> &str {
    match line.chars().next() {
        Some(' ' | '+' | '-') => &line[1..],
        _ => line,
    }
}

pub fn format_hunk_specs(hunk: &Hunk) -> String {
    format!(
        "@@ -{},{} +{},{} @@",
        hunk.deletion_start, hunk.deletion_count, hunk.addition_start, hunk.addition_count
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FileContents;
    use crate::infra::diff::builder::parse_diff_from_file;

    fn sample() -> (FileContents, FileContents) {
        let old = FileContents::new(
            "lib.rs",
            "use a;\nfn one() {}\nfn two() {}\n\n\n\n\n\n\n\nfn three() {}\nfn four() {}\n",
        );
        let new = FileContents::new(
            "lib.rs",
            "use a;\nuse b;\nfn one() {}\nfn 2() {}\n\n\n\n\n\n\n\nfn four() {}\nfn five() {}\n",
        );
        (old, new)
    }

    #[test]
    fn accept_rewrites_old_side_and_shifts_later_hunks() {
        let (old, new) = sample();
        let diff = parse_diff_from_file(&old, &new).unwrap();
        assert_eq!(diff.hunks.len(), 2);

        let accepted = diff_accept_reject_hunk(&diff, 0, HunkDecision::Accept).unwrap();
        let first = &accepted.hunks[0];
        assert_eq!(first.addition_lines, 0);
        assert_eq!(first.deletion_lines, 0);
        assert_eq!(first.deletion_count, first.addition_count);

        let delta = diff.hunks[0].addition_count as isize - diff.hunks[0].deletion_count as isize;
        assert_eq!(
            accepted.hunks[1].deletion_start as isize,
            diff.hunks[1].deletion_start as isize + delta
        );
        assert_eq!(accepted.hunks[1].addition_start, diff.hunks[1].addition_start);

        // The input is untouched.
        assert_eq!(diff.hunks[0].addition_lines, 2);
        assert_eq!(diff.old_lines.as_ref().unwrap().concat(), old.contents);
    }

    #[test]
    fn reject_restores_new_side() {
        let (old, new) = sample();
        let diff = parse_diff_from_file(&old, &new).unwrap();
        let rejected = diff_accept_reject_hunk(&diff, 1, HunkDecision::Reject).unwrap();
        let new_text = rejected.new_lines.as_ref().unwrap().concat();
        assert!(new_text.contains("fn three() {}\nfn four() {}\n"));
        assert!(!new_text.contains("fn five"));
        assert!(new_text.contains("use b;"));
    }

    #[test]
    fn out_of_range_hunk_is_an_error() {
        let (old, new) = sample();
        let diff = parse_diff_from_file(&old, &new).unwrap();
        assert_eq!(
            diff_accept_reject_hunk(&diff, 9, HunkDecision::Accept),
            Err(DiffError::HunkOutOfRange { index: 9, count: 2 })
        );
    }

    #[test]
    fn resolving_pure_deletion_collapses_hunk() {
        let old = FileContents::new("f", "a\nb\nc\n");
        let new = FileContents::new("f", "a\nc\n");
        let diff = parse_diff_from_file(&old, &new).unwrap();
        let accepted = diff_accept_reject_hunk(&diff, 0, HunkDecision::Accept).unwrap();
        assert_eq!(accepted.old_lines.as_ref().unwrap().concat(), "a\nc\n");
        assert_eq!(accepted.hunks[0].unified_line_count, 2);
        assert_eq!(accepted.hunks[0].hunk_content.len(), 1);
    }
}
