use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_EXPANSION_LINE_COUNT: usize = 100;
pub const DEFAULT_MAX_LINE_DIFF_LENGTH: usize = 1000;

/// Split shows old and new side by side; unified interleaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiffStyle {
    #[default]
    Split,
    Unified,
}

impl fmt::Display for DiffStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffStyle::Split => write!(f, "split"),
            DiffStyle::Unified => write!(f, "unified"),
        }
    }
}

impl FromStr for DiffStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "split" => Ok(DiffStyle::Split),
            "unified" => Ok(DiffStyle::Unified),
            _ => Err(format!("Unknown diff style: {s}")),
        }
    }
}

/// Granularity of intra-line change spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LineDiffType {
    /// Words, with one-character unchanged gaps folded into the change.
    #[default]
    WordAlt,
    Word,
    Char,
    None,
}

/// Built-in separator styles. Custom labels are a render option only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SeparatorStyle {
    #[default]
    LineInfo,
    Metadata,
    Simple,
}

/// The `[render]` table of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub diff_style: DiffStyle,
    pub hunk_separators: SeparatorStyle,
    pub expand_unchanged: bool,
    pub expansion_line_count: usize,
    pub line_diff_type: LineDiffType,
    pub max_line_diff_length: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            diff_style: DiffStyle::Split,
            hunk_separators: SeparatorStyle::LineInfo,
            expand_unchanged: false,
            expansion_line_count: DEFAULT_EXPANSION_LINE_COUNT,
            line_diff_type: LineDiffType::WordAlt,
            max_line_diff_length: DEFAULT_MAX_LINE_DIFF_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpandDirection {
    /// Reveal lines directly above the hunk.
    Up,
    /// Reveal lines directly below the previous hunk.
    Down,
    All,
}

/// Lines revealed at the top (`from_start`) and bottom (`from_end`) of a
/// collapsed gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExpansionRegion {
    pub from_start: usize,
    pub from_end: usize,
}

impl ExpansionRegion {
    pub const FULL: ExpansionRegion = ExpansionRegion {
        from_start: usize::MAX,
        from_end: 0,
    };

    /// Revealed `(top, bottom)` line counts, clamped to a gap of `gap` lines.
    pub fn clamp(&self, gap: usize) -> (usize, usize) {
        let top = self.from_start.min(gap);
        let bottom = self.from_end.min(gap - top);
        (top, bottom)
    }

    pub fn remaining(&self, gap: usize) -> usize {
        let (top, bottom) = self.clamp(gap);
        gap - top - bottom
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Position {
    pub line: usize,
    pub character: usize,
}

/// Sub-line span of changed characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecorationItem {
    pub start: Position,
    pub end: Position,
}

impl DecorationItem {
    pub fn on_line(line: usize, start: usize, end: usize) -> Self {
        Self {
            start: Position {
                line,
                character: start,
            },
            end: Position {
                line,
                character: end,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_region_reveals_whole_gap() {
        assert_eq!(ExpansionRegion::FULL.clamp(42), (42, 0));
        assert_eq!(ExpansionRegion::FULL.remaining(42), 0);
    }

    #[test]
    fn overlapping_region_is_clamped() {
        let region = ExpansionRegion {
            from_start: 8,
            from_end: 8,
        };
        assert_eq!(region.clamp(10), (8, 2));
        assert_eq!(region.remaining(10), 0);
        assert_eq!(region.remaining(30), 14);
    }

    #[test]
    fn diff_style_round_trips_through_str() {
        assert_eq!("unified".parse::<DiffStyle>(), Ok(DiffStyle::Unified));
        assert_eq!(DiffStyle::Split.to_string(), "split");
        assert!("sideways".parse::<DiffStyle>().is_err());
    }
}
