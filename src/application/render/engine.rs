//! Turns a [`FileDiffMetadata`] into display rows.
//!
//! Every hunk index `i` owns the collapsed gap directly above it; index
//! `hunks.len()` is the gap after the last hunk. Expansion state is kept per
//! gap and rendering is a single synchronous pass.

use super::decorations::line_decorations;
use super::types::{
    Columns, Expandable, HunkData, HunkSeparators, LineRecord, LineType, RenderOptions,
    RenderedDiff, RowElement, SeparatorContext, SeparatorRecord,
};
use crate::domain::{
    AnnotationIndex, AnnotationSide, DiffHighlightResult, DiffLineAnnotation, DiffStyle,
    ExpandDirection, ExpansionRegion, FileContents, FileDiffMetadata, FileHighlightResult, Hunk,
    HunkContent, LineAnnotation, RenderError, TokenizedLine, line_text, strip_newline,
};
use std::borrow::Cow;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct HunkRenderEngine {
    options: RenderOptions,
    expanded_hunks: HashMap<usize, ExpansionRegion>,
}

impl Default for HunkRenderEngine {
    fn default() -> Self {
        Self::new(RenderOptions::default())
    }
}

impl HunkRenderEngine {
    pub fn new(options: RenderOptions) -> Self {
        Self {
            options,
            expanded_hunks: HashMap::new(),
        }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Stored expansion for the gap above hunk `index`.
    pub fn expansion(&self, index: usize) -> ExpansionRegion {
        self.expanded_hunks.get(&index).copied().unwrap_or_default()
    }

    /// Reveal more of the gap above hunk `index` (`hunks.len()` for the end
    /// of the file). A gap within one step of being fully shown is revealed
    /// entirely.
    pub fn expand_hunk(
        &mut self,
        diff: &FileDiffMetadata,
        index: usize,
        direction: ExpandDirection,
    ) -> Result<(), RenderError> {
        if !diff.has_full_lines() {
            return Err(RenderError::ExpansionUnavailable {
                file: diff.name.clone(),
            });
        }
        let hunks = render_hunks(diff, &self.options);
        if index > hunks.len() {
            return Err(RenderError::HunkOutOfRange {
                index,
                count: hunks.len(),
            });
        }

        let gap = gap_at(diff, &hunks, index);
        let step = self.options.expansion_line_count;
        let region = self.expanded_hunks.entry(index).or_default();
        let remaining = region.remaining(gap.size);

        *region = match direction {
            _ if remaining <= step => ExpansionRegion::FULL,
            ExpandDirection::All => ExpansionRegion::FULL,
            ExpandDirection::Up => ExpansionRegion {
                from_end: region.from_end.saturating_add(step),
                ..*region
            },
            ExpandDirection::Down => ExpansionRegion {
                from_start: region.from_start.saturating_add(step),
                ..*region
            },
        };
        log::debug!(
            target: "patchlens::render",
            "Expanded gap {} of {} ({:?}): {:?}",
            index,
            diff.name,
            direction,
            region
        );
        Ok(())
    }

    pub fn collapse_all(&mut self) {
        self.expanded_hunks.clear();
    }

    /// Render `diff` into columns and separator metadata.
    ///
    /// `tokens` may come from the in-process highlighter or the worker pool;
    /// lines without tokens render as plain text.
    pub fn render<T: Clone>(
        &self,
        diff: &FileDiffMetadata,
        annotations: &[DiffLineAnnotation<T>],
        tokens: Option<&DiffHighlightResult>,
    ) -> Result<RenderedDiff<T>, RenderError> {
        let hunks = render_hunks(diff, &self.options);
        if !self.expanded_hunks.is_empty() && !diff.has_full_lines() {
            return Err(RenderError::ExpansionUnavailable {
                file: diff.name.clone(),
            });
        }
        if let Some(&stale) = self.expanded_hunks.keys().find(|&&slot| slot > hunks.len()) {
            return Err(RenderError::HunkOutOfRange {
                index: stale,
                count: hunks.len(),
            });
        }

        let mut pass = RenderPass {
            engine: self,
            diff,
            hunk_count: hunks.len(),
            annotations: AnnotationIndex::for_diff(annotations),
            tokens: TokenCursor {
                result: tokens,
                by_line: diff.has_full_lines(),
                old: 0,
                new: 0,
            },
            columns: match self.options.diff_style {
                DiffStyle::Unified => Columns::Unified(Vec::new()),
                DiffStyle::Split => Columns::Split {
                    deletions: Vec::new(),
                    additions: Vec::new(),
                },
            },
            hunk_data: Vec::new(),
        };

        for (index, hunk) in hunks.iter().enumerate() {
            pass.gap(index, gap_at(diff, &hunks, index), Some(hunk.hunk_specs.as_str()));
            pass.hunk_body(index, hunk);
        }
        pass.gap(hunks.len(), gap_at(diff, &hunks, hunks.len()), None);

        Ok(RenderedDiff {
            columns: pass.columns,
            hunk_data: pass.hunk_data,
        })
    }

    /// Render a plain source file, one context record per line.
    pub fn render_file<T: Clone>(
        &self,
        file: &FileContents,
        annotations: &[LineAnnotation<T>],
        tokens: Option<&FileHighlightResult>,
    ) -> Vec<LineRecord<T>> {
        let index = AnnotationIndex::for_file(annotations);
        file.lines()
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                let number = i + 1;
                LineRecord {
                    line_type: LineType::Context,
                    old_line_number: Some(number),
                    new_line_number: Some(number),
                    text: strip_newline(raw).to_string(),
                    hunk_index: 0,
                    no_eof_newline: !raw.ends_with('\n'),
                    tokens: tokens.and_then(|t| t.lines.get(i).cloned()),
                    decorations: Vec::new(),
                    annotations: index.get(None, number),
                }
            })
            .collect()
    }

    fn region(&self, diff: &FileDiffMetadata, slot: usize) -> ExpansionRegion {
        if !diff.has_full_lines() {
            return ExpansionRegion::default();
        }
        if self.options.expand_unchanged {
            return ExpansionRegion::FULL;
        }
        self.expansion(slot)
    }
}

/// Hunks to lay out. A diff without hunks but with full contents gets one
/// empty hunk at end of file when unchanged lines are shown, so the whole
/// file renders as its gap.
fn render_hunks<'d>(diff: &'d FileDiffMetadata, options: &RenderOptions) -> Cow<'d, [Hunk]> {
    if diff.hunks.is_empty()
        && options.expand_unchanged
        && let (Some(old), Some(new)) = (&diff.old_lines, &diff.new_lines)
    {
        return Cow::Owned(vec![Hunk {
            collapsed_before: new.len(),
            addition_start: new.len(),
            deletion_start: old.len(),
            hunk_specs: format!("@@ -{},0 +{},0 @@", old.len(), new.len()),
            ..Default::default()
        }]);
    }
    Cow::Borrowed(&diff.hunks)
}

/// Collapsed lines between two hunks, by first line number on each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Gap {
    old_start: usize,
    new_start: usize,
    size: usize,
}

fn gap_at(diff: &FileDiffMetadata, hunks: &[Hunk], slot: usize) -> Gap {
    let (old_end, new_end) = match slot.checked_sub(1).and_then(|prev| hunks.get(prev)) {
        Some(prev) => (prev.old_side_end(), prev.new_side_end()),
        None => (0, 0),
    };
    let size = match hunks.get(slot) {
        Some(hunk) => hunk.collapsed_before,
        None => diff
            .new_lines
            .as_ref()
            .map_or(0, |lines| lines.len().saturating_sub(new_end)),
    };
    Gap {
        old_start: old_end + 1,
        new_start: new_end + 1,
        size,
    }
}

fn full_line(lines: Option<&[String]>, number: usize) -> &str {
    lines
        .and_then(|lines| lines.get(number.wrapping_sub(1)))
        .map(String::as_str)
        .unwrap_or_default()
}

/// Hands out tokens per side, by line number when full files were
/// tokenized, otherwise in hunk order.
struct TokenCursor<'a> {
    result: Option<&'a DiffHighlightResult>,
    by_line: bool,
    old: usize,
    new: usize,
}

impl TokenCursor<'_> {
    fn old(&mut self, line_number: usize) -> Option<TokenizedLine> {
        let result = self.result?;
        let index = if self.by_line {
            line_number.checked_sub(1)?
        } else {
            self.old += 1;
            self.old - 1
        };
        result.old_lines.get(index).cloned()
    }

    fn new(&mut self, line_number: usize) -> Option<TokenizedLine> {
        let result = self.result?;
        let index = if self.by_line {
            line_number.checked_sub(1)?
        } else {
            self.new += 1;
            self.new - 1
        };
        result.new_lines.get(index).cloned()
    }
}

struct RenderPass<'a, T> {
    engine: &'a HunkRenderEngine,
    diff: &'a FileDiffMetadata,
    hunk_count: usize,
    annotations: AnnotationIndex<T>,
    tokens: TokenCursor<'a>,
    columns: Columns<T>,
    hunk_data: Vec<HunkData>,
}

impl<T: Clone> RenderPass<'_, T> {
    /// Expanded lines at the top of the gap, the separator, then expanded
    /// lines at the bottom.
    fn gap(&mut self, slot: usize, gap: Gap, hunk_specs: Option<&str>) {
        let region = self.engine.region(self.diff, slot);
        let (top, bottom) = region.clamp(gap.size);
        let remaining = gap.size - top - bottom;

        for offset in 0..top {
            self.expanded_line(slot, gap.old_start + offset, gap.new_start + offset);
        }

        let metadata = matches!(
            self.engine.options.hunk_separators,
            HunkSeparators::Metadata
        );
        if remaining > 0 || (metadata && hunk_specs.is_some()) {
            self.separator(slot, remaining, hunk_specs);
        }

        for offset in gap.size - bottom..gap.size {
            self.expanded_line(slot, gap.old_start + offset, gap.new_start + offset);
        }
    }

    fn separator(&mut self, slot: usize, lines: usize, hunk_specs: Option<&str>) {
        let options = &self.engine.options;
        let label = match &options.hunk_separators {
            HunkSeparators::LineInfo => (lines > 0).then(|| {
                let plural = if lines == 1 { "" } else { "s" };
                format!("{lines} unmodified line{plural}")
            }),
            HunkSeparators::Metadata => hunk_specs.map(str::to_string),
            HunkSeparators::Simple => None,
            HunkSeparators::Custom(label) => Some(label(&SeparatorContext {
                slot,
                lines,
                hunk_specs,
            })),
        };

        let expandable = (self.diff.has_full_lines() && lines > 0).then(|| Expandable {
            up: slot < self.hunk_count,
            down: slot > 0 || slot == self.hunk_count,
            chunked: lines > options.expansion_line_count,
        });
        let carries_specs = matches!(options.hunk_separators, HunkSeparators::Metadata);

        self.hunk_data.push(HunkData {
            slot,
            lines,
            expandable,
            hunk_specs: hunk_specs.filter(|_| carries_specs).map(str::to_string),
        });

        let record = SeparatorRecord { slot, lines, label };
        match &mut self.columns {
            Columns::Unified(rows) => rows.push(RowElement::Separator(record)),
            Columns::Split {
                deletions,
                additions,
            } => {
                deletions.push(RowElement::Separator(record.clone()));
                additions.push(RowElement::Separator(record));
            }
        }
    }

    fn expanded_line(&mut self, slot: usize, old_number: usize, new_number: usize) {
        let diff = self.diff;
        let old_raw = full_line(diff.old_lines.as_deref(), old_number);
        let new_raw = full_line(diff.new_lines.as_deref(), new_number);
        self.context_row(
            LineType::ContextExpanded,
            slot,
            (old_number, new_number),
            (strip_newline(old_raw), strip_newline(new_raw)),
            !new_raw.is_empty() && !new_raw.ends_with('\n'),
        );
    }

    fn hunk_body(&mut self, slot: usize, hunk: &Hunk) {
        let mut old_number = hunk.old_side_first_line();
        let mut new_number = hunk.new_side_first_line();

        for content in &hunk.hunk_content {
            match content {
                HunkContent::Context(ctx) => {
                    let last = ctx.lines.len().saturating_sub(1);
                    for (i, raw) in ctx.lines.iter().enumerate() {
                        let text = line_text(raw);
                        self.context_row(
                            LineType::Context,
                            slot,
                            (old_number, new_number),
                            (text, text),
                            i == last && ctx.no_eof_newline,
                        );
                        old_number += 1;
                        new_number += 1;
                    }
                }
                HunkContent::Change(change) => {
                    let mut deletions: Vec<LineRecord<T>> = change
                        .deletions
                        .iter()
                        .enumerate()
                        .map(|(i, raw)| {
                            let number = old_number + i;
                            LineRecord {
                                line_type: LineType::Deletion,
                                old_line_number: Some(number),
                                new_line_number: None,
                                text: line_text(raw).to_string(),
                                hunk_index: slot,
                                no_eof_newline: i + 1 == change.deletions.len()
                                    && change.no_eof_newline_deletions,
                                tokens: self.tokens.old(number),
                                decorations: Vec::new(),
                                annotations: self
                                    .annotations
                                    .get(Some(AnnotationSide::Deletions), number),
                            }
                        })
                        .collect();
                    let mut additions: Vec<LineRecord<T>> = change
                        .additions
                        .iter()
                        .enumerate()
                        .map(|(i, raw)| {
                            let number = new_number + i;
                            LineRecord {
                                line_type: LineType::Addition,
                                old_line_number: None,
                                new_line_number: Some(number),
                                text: line_text(raw).to_string(),
                                hunk_index: slot,
                                no_eof_newline: i + 1 == change.additions.len()
                                    && change.no_eof_newline_additions,
                                tokens: self.tokens.new(number),
                                decorations: Vec::new(),
                                annotations: self
                                    .annotations
                                    .get(Some(AnnotationSide::Additions), number),
                            }
                        })
                        .collect();

                    self.decorate(&mut deletions, &mut additions);
                    old_number += deletions.len();
                    new_number += additions.len();
                    self.change_run(deletions, additions);
                }
            }
        }
    }

    /// Pair the i-th deletion with the i-th addition of a run.
    fn decorate(&self, deletions: &mut [LineRecord<T>], additions: &mut [LineRecord<T>]) {
        let options = &self.engine.options;
        for (old, new) in deletions.iter_mut().zip(additions.iter_mut()) {
            let Some(decorations) = line_decorations(
                &old.text,
                &new.text,
                options.line_diff_type,
                options.max_line_diff_length,
                old.old_line_number.unwrap_or_default(),
                new.new_line_number.unwrap_or_default(),
            ) else {
                continue;
            };
            old.decorations = decorations.deletions;
            new.decorations = decorations.additions;
        }
    }

    fn context_row(
        &mut self,
        line_type: LineType,
        slot: usize,
        (old_number, new_number): (usize, usize),
        (old_text, new_text): (&str, &str),
        no_eof_newline: bool,
    ) {
        let old_tokens = self.tokens.old(old_number);
        let new_tokens = self.tokens.new(new_number);
        let old_annotations = self
            .annotations
            .get(Some(AnnotationSide::Deletions), old_number);
        let new_annotations = self
            .annotations
            .get(Some(AnnotationSide::Additions), new_number);

        let record = |text: &str, tokens, annotations| LineRecord {
            line_type,
            old_line_number: Some(old_number),
            new_line_number: Some(new_number),
            text: text.to_string(),
            hunk_index: slot,
            no_eof_newline,
            tokens,
            decorations: Vec::new(),
            annotations,
        };

        match &mut self.columns {
            Columns::Unified(rows) => {
                let mut annotations = old_annotations;
                annotations.extend(new_annotations);
                rows.push(RowElement::Line(record(new_text, new_tokens, annotations)));
            }
            Columns::Split {
                deletions,
                additions,
            } => {
                deletions.push(RowElement::Line(record(old_text, old_tokens, old_annotations)));
                additions.push(RowElement::Line(record(new_text, new_tokens, new_annotations)));
            }
        }
    }

    fn change_run(&mut self, old: Vec<LineRecord<T>>, new: Vec<LineRecord<T>>) {
        match &mut self.columns {
            Columns::Unified(rows) => {
                rows.extend(old.into_iter().map(RowElement::Line));
                rows.extend(new.into_iter().map(RowElement::Line));
            }
            Columns::Split {
                deletions,
                additions,
            } => {
                let (old_len, new_len) = (old.len(), new.len());
                deletions.extend(old.into_iter().map(RowElement::Line));
                additions.extend(new.into_iter().map(RowElement::Line));
                if old_len > new_len {
                    additions.push(RowElement::Buffer {
                        rows: old_len - new_len,
                    });
                } else if new_len > old_len {
                    deletions.push(RowElement::Buffer {
                        rows: new_len - old_len,
                    });
                }
            }
        }
    }
}
