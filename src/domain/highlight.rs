use serde::{Deserialize, Serialize};

pub const DEFAULT_THEME: &str = "base16-ocean.dark";
pub const DEFAULT_TOKENIZE_MAX_LINE_LENGTH: usize = 1000;

/// Theme(s) a highlight pass resolves colors against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThemeSelection {
    Single(String),
    LightDark { light: String, dark: String },
}

impl Default for ThemeSelection {
    fn default() -> Self {
        ThemeSelection::Single(DEFAULT_THEME.to_string())
    }
}

impl ThemeSelection {
    pub fn names(&self) -> Vec<&str> {
        match self {
            ThemeSelection::Single(name) => vec![name.as_str()],
            ThemeSelection::LightDark { light, dark } => vec![light.as_str(), dark.as_str()],
        }
    }

    /// Theme whose colors land in `HighlightedToken::style`.
    pub fn primary(&self) -> &str {
        match self {
            ThemeSelection::Single(name) => name,
            ThemeSelection::LightDark { light, .. } => light,
        }
    }

    pub fn secondary(&self) -> Option<&str> {
        match self {
            ThemeSelection::Single(_) => None,
            ThemeSelection::LightDark { dark, .. } => Some(dark),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TokenStyle {
    /// `#rrggbb` or `#rrggbbaa`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightedToken {
    pub text: String,
    pub style: TokenStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dark_style: Option<TokenStyle>,
}

impl HighlightedToken {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: TokenStyle::default(),
            dark_style: None,
        }
    }
}

pub type TokenizedLine = Vec<HighlightedToken>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenizeOptions {
    /// Overrides language detection from the file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default)]
    pub theme: ThemeSelection,
    /// Longer lines are emitted as one unstyled token.
    #[serde(default = "default_tokenize_max_line_length")]
    pub tokenize_max_line_length: usize,
}

fn default_tokenize_max_line_length() -> usize {
    DEFAULT_TOKENIZE_MAX_LINE_LENGTH
}

impl Default for TokenizeOptions {
    fn default() -> Self {
        Self {
            lang: None,
            theme: ThemeSelection::default(),
            tokenize_max_line_length: DEFAULT_TOKENIZE_MAX_LINE_LENGTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FileHighlightResult {
    pub lines: Vec<TokenizedLine>,
}

/// Tokens for both sides of a diff.
///
/// With full line arrays the vectors are indexed by `line_number - 1`. Without
/// them they hold the hunk lines of each side in hunk order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DiffHighlightResult {
    pub old_lines: Vec<TokenizedLine>,
    pub new_lines: Vec<TokenizedLine>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theme_selection_wire_shapes() {
        let single: ThemeSelection = serde_json::from_str("\"github-dark\"").unwrap();
        assert_eq!(single, ThemeSelection::Single("github-dark".into()));

        let pair: ThemeSelection =
            serde_json::from_str(r#"{"light":"InspiredGitHub","dark":"base16-ocean.dark"}"#)
                .unwrap();
        assert_eq!(pair.primary(), "InspiredGitHub");
        assert_eq!(pair.secondary(), Some("base16-ocean.dark"));
        assert_eq!(pair.names().len(), 2);
    }
}
