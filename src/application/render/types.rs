use crate::domain::{
    DEFAULT_EXPANSION_LINE_COUNT, DEFAULT_MAX_LINE_DIFF_LENGTH, DecorationItem, DiffStyle,
    LineDiffType, RenderConfig, SeparatorStyle, TokenizedLine,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// What a custom separator label is computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeparatorContext<'a> {
    /// Hunk the separator precedes; `hunks.len()` for the trailing gap.
    pub slot: usize,
    pub lines: usize,
    pub hunk_specs: Option<&'a str>,
}

pub type SeparatorFn = Arc<dyn Fn(&SeparatorContext<'_>) -> String + Send + Sync>;

#[derive(Clone, Default)]
pub enum HunkSeparators {
    /// "N unmodified lines".
    #[default]
    LineInfo,
    /// The hunk header, shown before every hunk.
    Metadata,
    /// An unlabeled divider.
    Simple,
    Custom(SeparatorFn),
}

impl fmt::Debug for HunkSeparators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HunkSeparators::LineInfo => write!(f, "LineInfo"),
            HunkSeparators::Metadata => write!(f, "Metadata"),
            HunkSeparators::Simple => write!(f, "Simple"),
            HunkSeparators::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl From<SeparatorStyle> for HunkSeparators {
    fn from(style: SeparatorStyle) -> Self {
        match style {
            SeparatorStyle::LineInfo => HunkSeparators::LineInfo,
            SeparatorStyle::Metadata => HunkSeparators::Metadata,
            SeparatorStyle::Simple => HunkSeparators::Simple,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub diff_style: DiffStyle,
    pub hunk_separators: HunkSeparators,
    /// Show every unchanged line instead of collapsing gaps.
    pub expand_unchanged: bool,
    /// Lines revealed per expand step.
    pub expansion_line_count: usize,
    pub line_diff_type: LineDiffType,
    pub max_line_diff_length: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            diff_style: DiffStyle::Split,
            hunk_separators: HunkSeparators::LineInfo,
            expand_unchanged: false,
            expansion_line_count: DEFAULT_EXPANSION_LINE_COUNT,
            line_diff_type: LineDiffType::WordAlt,
            max_line_diff_length: DEFAULT_MAX_LINE_DIFF_LENGTH,
        }
    }
}

impl From<&RenderConfig> for RenderOptions {
    fn from(config: &RenderConfig) -> Self {
        Self {
            diff_style: config.diff_style,
            hunk_separators: config.hunk_separators.into(),
            expand_unchanged: config.expand_unchanged,
            expansion_line_count: config.expansion_line_count.max(1),
            line_diff_type: config.line_diff_type,
            max_line_diff_length: config.max_line_diff_length,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineType {
    Context,
    ContextExpanded,
    Addition,
    Deletion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRecord<T> {
    pub line_type: LineType,
    pub old_line_number: Option<usize>,
    pub new_line_number: Option<usize>,
    /// Line content without diff marker or terminator.
    pub text: String,
    /// Hunk this line belongs to, or follows for expanded context.
    pub hunk_index: usize,
    #[serde(default)]
    pub no_eof_newline: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenizedLine>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorations: Vec<DecorationItem>,
    #[serde(default = "Vec::new", skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<T>,
}

impl<T> LineRecord<T> {
    /// Line number on the side this record is displayed for.
    pub fn line_number(&self) -> Option<usize> {
        match self.line_type {
            LineType::Deletion => self.old_line_number,
            _ => self.new_line_number.or(self.old_line_number),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeparatorRecord {
    pub slot: usize,
    pub lines: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RowElement<T> {
    Line(LineRecord<T>),
    /// Empty rows keeping split columns aligned.
    Buffer { rows: usize },
    Separator(SeparatorRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Columns<T> {
    Unified(Vec<RowElement<T>>),
    Split {
        deletions: Vec<RowElement<T>>,
        additions: Vec<RowElement<T>>,
    },
}

/// Which expand controls a separator offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Expandable {
    pub up: bool,
    pub down: bool,
    /// The gap is larger than one expand step.
    pub chunked: bool,
}

/// One entry per separator, for attaching interactive controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HunkData {
    pub slot: usize,
    pub lines: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expandable: Option<Expandable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hunk_specs: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedDiff<T> {
    pub columns: Columns<T>,
    pub hunk_data: Vec<HunkData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Annotation payload with no `Default` impl.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Comment {
        author: String,
    }

    #[test]
    fn rows_without_annotations_deserialize_for_any_payload() {
        let json = r#"{"kind":"line","lineType":"addition","oldLineNumber":null,"newLineNumber":3,"text":"let x = 1;","hunkIndex":0}"#;
        let row: RowElement<Comment> = serde_json::from_str(json).unwrap();
        let RowElement::Line(line) = &row else {
            panic!("expected a line row");
        };
        assert!(line.annotations.is_empty());
        assert_eq!(line.line_number(), Some(3));

        let mut annotated = line.clone();
        annotated.annotations.push(Comment {
            author: "reviewer".into(),
        });
        let text = serde_json::to_string(&RowElement::Line(annotated.clone())).unwrap();
        let back: RowElement<Comment> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, RowElement::Line(annotated));
    }
}
