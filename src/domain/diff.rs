use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a file changed between the two sides of a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeType {
    #[default]
    Change,
    New,
    Deleted,
    /// Renamed with identical content.
    RenamePure,
    /// Renamed and edited.
    RenameChanged,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeType::Change => "change",
            ChangeType::New => "new",
            ChangeType::Deleted => "deleted",
            ChangeType::RenamePure => "rename-pure",
            ChangeType::RenameChanged => "rename-changed",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "change" | "modified" => Ok(ChangeType::Change),
            "new" | "added" => Ok(ChangeType::New),
            "deleted" | "removed" => Ok(ChangeType::Deleted),
            "rename-pure" => Ok(ChangeType::RenamePure),
            "rename-changed" => Ok(ChangeType::RenameChanged),
            _ => Err(format!("Unknown change type: {}", s)),
        }
    }
}

/// Unchanged lines shared by both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContextContent {
    /// Raw lines including the leading `' '` marker.
    pub lines: Vec<String>,
    /// The last line has no trailing newline in either file.
    #[serde(default)]
    pub no_eof_newline: bool,
}

/// A run of deletions paired with the additions that replace them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChangeContent {
    /// Raw lines including the leading `'-'` marker.
    pub deletions: Vec<String>,
    /// Raw lines including the leading `'+'` marker.
    pub additions: Vec<String>,
    #[serde(default)]
    pub no_eof_newline_deletions: bool,
    #[serde(default)]
    pub no_eof_newline_additions: bool,
}

impl ChangeContent {
    /// Rows this run occupies in a side-by-side view.
    pub fn split_rows(&self) -> usize {
        self.deletions.len().max(self.additions.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HunkContent {
    Context(ContextContent),
    Change(ChangeContent),
}

impl HunkContent {
    pub fn unified_rows(&self) -> usize {
        match self {
            HunkContent::Context(ctx) => ctx.lines.len(),
            HunkContent::Change(change) => change.deletions.len() + change.additions.len(),
        }
    }

    pub fn split_rows(&self) -> usize {
        match self {
            HunkContent::Context(ctx) => ctx.lines.len(),
            HunkContent::Change(change) => change.split_rows(),
        }
    }
}

/// One `@@` region of a file diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Hunk {
    /// Unchanged new-side lines between the previous hunk (or file start) and this one.
    pub collapsed_before: usize,

    pub addition_start: usize,
    pub addition_count: usize,
    /// Number of `+` lines in the body.
    pub addition_lines: usize,

    pub deletion_start: usize,
    pub deletion_count: usize,
    /// Number of `-` lines in the body.
    pub deletion_lines: usize,

    pub hunk_content: Vec<HunkContent>,
    /// Text after the closing `@@`, usually the enclosing function signature.
    pub hunk_context: Option<String>,
    /// The raw `@@ ... @@` header.
    pub hunk_specs: String,

    pub split_line_start: usize,
    pub split_line_count: usize,
    pub unified_line_start: usize,
    pub unified_line_count: usize,
}

impl Hunk {
    /// First new-side line covered by the hunk. A zero-length range names the
    /// line before the change, so the hunk starts one line later.
    pub fn new_side_first_line(&self) -> usize {
        first_line(self.addition_start, self.addition_count)
    }

    pub fn old_side_first_line(&self) -> usize {
        first_line(self.deletion_start, self.deletion_count)
    }

    /// Last new-side line covered, or the line before the hunk when it adds nothing.
    pub fn new_side_end(&self) -> usize {
        (self.new_side_first_line() + self.addition_count).saturating_sub(1)
    }

    pub fn old_side_end(&self) -> usize {
        (self.old_side_first_line() + self.deletion_count).saturating_sub(1)
    }

    pub fn context_lines(&self) -> usize {
        self.hunk_content
            .iter()
            .map(|content| match content {
                HunkContent::Context(ctx) => ctx.lines.len(),
                HunkContent::Change(_) => 0,
            })
            .sum()
    }

    /// Recompute the body-derived counters from `hunk_content`.
    pub fn recount(&mut self) {
        let mut additions = 0;
        let mut deletions = 0;
        let mut split = 0;
        let mut unified = 0;
        for content in &self.hunk_content {
            if let HunkContent::Change(change) = content {
                additions += change.additions.len();
                deletions += change.deletions.len();
            }
            split += content.split_rows();
            unified += content.unified_rows();
        }
        self.addition_lines = additions;
        self.deletion_lines = deletions;
        self.split_line_count = split;
        self.unified_line_count = unified;
    }
}

fn first_line(start: usize, count: usize) -> usize {
    if count == 0 { start + 1 } else { start }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FileDiffMetadata {
    pub name: String,
    pub prev_name: Option<String>,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub hunks: Vec<Hunk>,
    pub split_line_count: usize,
    pub unified_line_count: usize,
    /// Full old file, one entry per line with its newline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_lines: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_lines: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
}

impl FileDiffMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Both full line arrays are attached, so collapsed context can be expanded.
    pub fn has_full_lines(&self) -> bool {
        self.old_lines.is_some() && self.new_lines.is_some()
    }

    pub fn total_additions(&self) -> usize {
        self.hunks.iter().map(|h| h.addition_lines).sum()
    }

    pub fn total_deletions(&self) -> usize {
        self.hunks.iter().map(|h| h.deletion_lines).sum()
    }

    /// Rebuild every derived counter: per-hunk counts, `collapsed_before`,
    /// row starts, and the file totals.
    pub fn recompute_layout(&mut self) {
        let mut last_hunk_end = 0usize;
        let mut split_cursor = 0usize;
        let mut unified_cursor = 0usize;
        let mut split_total = 0usize;
        let mut unified_total = 0usize;

        for hunk in &mut self.hunks {
            hunk.recount();
            hunk.collapsed_before = hunk
                .new_side_first_line()
                .saturating_sub(1)
                .saturating_sub(last_hunk_end);
            last_hunk_end = hunk.new_side_end();

            split_cursor += hunk.collapsed_before;
            unified_cursor += hunk.collapsed_before;
            hunk.split_line_start = split_cursor;
            hunk.unified_line_start = unified_cursor;
            split_cursor += hunk.split_line_count;
            unified_cursor += hunk.unified_line_count;

            split_total += hunk.split_line_count;
            unified_total += hunk.unified_line_count;
        }

        self.split_line_count = split_total;
        self.unified_line_count = unified_total;
    }

    /// Unchanged lines after the final hunk. Only known when full lines are attached.
    pub fn trailing_collapsed(&self) -> Option<usize> {
        let new_lines = self.new_lines.as_ref()?;
        let last_end = self.hunks.last().map(Hunk::new_side_end).unwrap_or(0);
        Some(new_lines.len().saturating_sub(last_end))
    }
}

/// All file diffs from one commit block of a patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ParsedPatch {
    pub patch_metadata: Option<String>,
    pub files: Vec<FileDiffMetadata>,
}

/// A whole source file as handed to the diff builder or the highlighter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FileContents {
    pub name: String,
    pub contents: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
}

impl FileContents {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
            lang: None,
            cache_key: None,
        }
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    /// Lines with their terminators kept.
    pub fn lines(&self) -> Vec<String> {
        split_lines(&self.contents)
    }
}

/// Split text into lines, keeping each line's `\n`.
pub fn split_lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(str::to_string).collect()
}

/// Strip the diff marker and line terminator from a raw hunk line.
pub fn line_text(raw: &str) -> &str {
    let mut chars = raw.chars();
    let body = match chars.next() {
        Some('+' | '-' | ' ') => chars.as_str(),
        _ => raw,
    };
    strip_newline(body)
}

/// Drop a trailing `\n` (and `\r\n`).
pub fn strip_newline(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Decision applied to a single hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HunkDecision {
    /// Keep the additions.
    Accept,
    /// Restore the deletions.
    Reject,
}
