use super::languages::{diff_languages, file_language};
use crate::domain::{
    DiffHighlightResult, FileContents, FileDiffMetadata, FileHighlightResult, HighlightError,
    HighlightedToken, HunkContent, TokenStyle, TokenizeOptions, TokenizedLine, line_text,
    strip_newline,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use syntect::highlighting::{
    Color, FontStyle, HighlightState, Highlighter as ThemeHighlighter, RangedHighlightIterator,
    Style, Theme,
};
use syntect::parsing::{ParseState, ScopeStack, SyntaxReference, SyntaxSet};

/// Loaded grammar set plus the themes and languages registered on it.
///
/// Obtained from a [`HighlighterCache`], which is the only thing that
/// registers resources. Tokenizing with a theme that was never loaded is an
/// error; an unregistered language falls back to plain text.
///
/// [`HighlighterCache`]: super::HighlighterCache
pub struct Highlighter {
    syntaxes: Arc<SyntaxSet>,
    themes: RwLock<HashMap<String, Arc<Theme>>>,
    languages: RwLock<HashMap<String, Arc<String>>>,
}

impl Highlighter {
    pub fn new(syntaxes: Arc<SyntaxSet>) -> Self {
        Self {
            syntaxes,
            themes: RwLock::new(HashMap::new()),
            languages: RwLock::new(HashMap::new()),
        }
    }

    pub fn syntaxes(&self) -> Arc<SyntaxSet> {
        self.syntaxes.clone()
    }

    pub(crate) fn register_theme(&self, name: &str, theme: Arc<Theme>) {
        self.themes.write().insert(name.to_string(), theme);
    }

    pub(crate) fn register_language(&self, lang: &str, syntax_name: Arc<String>) {
        self.languages.write().insert(lang.to_string(), syntax_name);
    }

    pub fn has_theme(&self, name: &str) -> bool {
        self.themes.read().contains_key(name)
    }

    pub fn has_language(&self, lang: &str) -> bool {
        self.languages.read().contains_key(lang)
    }

    pub fn loaded_languages(&self) -> Vec<String> {
        let mut langs: Vec<String> = self.languages.read().keys().cloned().collect();
        langs.sort();
        langs
    }

    /// Tokenize consecutive lines of one document. Parser state carries from
    /// line to line, so multi-line constructs highlight correctly.
    pub fn tokenize_lines<S: AsRef<str>>(
        &self,
        lines: &[S],
        lang: &str,
        options: &TokenizeOptions,
    ) -> Result<Vec<TokenizedLine>, HighlightError> {
        let syntax = self.syntax_for(lang);
        let primary = self.theme(options.theme.primary())?;
        let secondary = options
            .theme
            .secondary()
            .map(|name| self.theme(name))
            .transpose()?;

        let primary_hl = ThemeHighlighter::new(&primary);
        let mut primary_state = HighlightState::new(&primary_hl, ScopeStack::new());
        let secondary_hl = secondary.as_deref().map(ThemeHighlighter::new);
        let mut secondary_state = secondary_hl
            .as_ref()
            .map(|hl| HighlightState::new(hl, ScopeStack::new()));
        let mut parse_state = ParseState::new(syntax);

        let primary_bg = primary.settings.background;
        let secondary_bg = secondary.as_ref().and_then(|t| t.settings.background);

        let mut out = Vec::with_capacity(lines.len());
        for raw in lines {
            let text = strip_newline(raw.as_ref());
            if text.chars().count() > options.tokenize_max_line_length {
                out.push(vec![HighlightedToken::plain(text)]);
                continue;
            }

            let line = format!("{text}\n");
            let ops = parse_state
                .parse_line(&line, &self.syntaxes)
                .map_err(|e| HighlightError::Tokenize(e.to_string()))?;

            let primary_ranges: Vec<(Style, Range<usize>)> =
                RangedHighlightIterator::new(&mut primary_state, &ops, &line, &primary_hl)
                    .map(|(style, _, range)| (style, range))
                    .collect();
            let secondary_ranges: Vec<(Style, Range<usize>)> =
                match (secondary_hl.as_ref(), secondary_state.as_mut()) {
                    (Some(hl), Some(state)) => {
                        RangedHighlightIterator::new(state, &ops, &line, hl)
                            .map(|(style, _, range)| (style, range))
                            .collect()
                    }
                    _ => Vec::new(),
                };

            out.push(build_tokens(
                &line,
                &primary_ranges,
                primary_bg,
                secondary.is_some().then_some((&secondary_ranges[..], secondary_bg)),
            ));
        }
        Ok(out)
    }

    pub fn tokenize_file(
        &self,
        file: &FileContents,
        options: &TokenizeOptions,
    ) -> Result<FileHighlightResult, HighlightError> {
        let lang = file_language(file, options);
        let lines = file.lines();
        Ok(FileHighlightResult {
            lines: self.tokenize_lines(&lines, &lang, options)?,
        })
    }

    /// Tokenize two full files as the old and new side of a diff.
    pub fn tokenize_file_pair(
        &self,
        old: &FileContents,
        new: &FileContents,
        options: &TokenizeOptions,
    ) -> Result<DiffHighlightResult, HighlightError> {
        Ok(DiffHighlightResult {
            old_lines: self.tokenize_file(old, options)?.lines,
            new_lines: self.tokenize_file(new, options)?.lines,
        })
    }

    /// Tokenize both sides of a diff. With full line arrays the results are
    /// indexed by line number; otherwise they follow hunk order per side.
    pub fn tokenize_diff(
        &self,
        diff: &FileDiffMetadata,
        options: &TokenizeOptions,
    ) -> Result<DiffHighlightResult, HighlightError> {
        let (old_lang, new_lang) = diff_languages(diff, options);

        if let (Some(old), Some(new)) = (&diff.old_lines, &diff.new_lines) {
            return Ok(DiffHighlightResult {
                old_lines: self.tokenize_lines(old, &old_lang, options)?,
                new_lines: self.tokenize_lines(new, &new_lang, options)?,
            });
        }

        let (old, new) = hunk_side_lines(diff);
        Ok(DiffHighlightResult {
            old_lines: self.tokenize_lines(&old, &old_lang, options)?,
            new_lines: self.tokenize_lines(&new, &new_lang, options)?,
        })
    }

    fn theme(&self, name: &str) -> Result<Arc<Theme>, HighlightError> {
        self.themes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| HighlightError::ThemeNotLoaded {
                name: name.to_string(),
            })
    }

    fn syntax_for(&self, lang: &str) -> &SyntaxReference {
        let registered = self.languages.read().get(lang).cloned();
        match registered.and_then(|name| self.syntaxes.find_syntax_by_name(&name)) {
            Some(syntax) => syntax,
            None => {
                log::debug!(target: "patchlens::highlight", "Language {} not loaded, using plain text", lang);
                self.syntaxes.find_syntax_plain_text()
            }
        }
    }
}

/// Lines of each side in hunk order, markers and newlines removed.
fn hunk_side_lines(diff: &FileDiffMetadata) -> (Vec<&str>, Vec<&str>) {
    let mut old = Vec::new();
    let mut new = Vec::new();
    for hunk in &diff.hunks {
        for content in &hunk.hunk_content {
            match content {
                HunkContent::Context(ctx) => {
                    for line in &ctx.lines {
                        old.push(line_text(line));
                        new.push(line_text(line));
                    }
                }
                HunkContent::Change(change) => {
                    old.extend(change.deletions.iter().map(|l| line_text(l)));
                    new.extend(change.additions.iter().map(|l| line_text(l)));
                }
            }
        }
    }
    (old, new)
}

fn build_tokens(
    line: &str,
    primary: &[(Style, Range<usize>)],
    primary_bg: Option<Color>,
    secondary: Option<(&[(Style, Range<usize>)], Option<Color>)>,
) -> TokenizedLine {
    let mut tokens: TokenizedLine = Vec::new();
    for (style, range) in primary {
        let text = line[range.clone()].trim_end_matches('\n');
        if text.is_empty() {
            continue;
        }
        let style = token_style(*style, primary_bg);
        let dark_style = secondary.map(|(ranges, bg)| {
            ranges
                .iter()
                .find(|(_, r)| r.contains(&range.start))
                .map(|(s, _)| token_style(*s, bg))
                .unwrap_or_default()
        });

        match tokens.last_mut() {
            Some(prev) if prev.style == style && prev.dark_style == dark_style => {
                prev.text.push_str(text);
            }
            _ => tokens.push(HighlightedToken {
                text: text.to_string(),
                style,
                dark_style,
            }),
        }
    }
    tokens
}

fn token_style(style: Style, theme_bg: Option<Color>) -> TokenStyle {
    TokenStyle {
        foreground: Some(hex(style.foreground)),
        background: (Some(style.background) != theme_bg).then(|| hex(style.background)),
        bold: style.font_style.contains(FontStyle::BOLD),
        italic: style.font_style.contains(FontStyle::ITALIC),
        underline: style.font_style.contains(FontStyle::UNDERLINE),
    }
}

fn hex(color: Color) -> String {
    if color.a == 0xff {
        format!("#{:02x}{:02x}{:02x}", color.r, color.g, color.b)
    } else {
        format!(
            "#{:02x}{:02x}{:02x}{:02x}",
            color.r, color.g, color.b, color.a
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ThemeSelection;
    use syntect::highlighting::{ThemeSet, ThemeSettings};

    /// No scope rules, so every token gets the default foreground.
    fn flat_theme() -> Theme {
        Theme {
            settings: ThemeSettings {
                foreground: Some(Color::WHITE),
                background: Some(Color::BLACK),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn rust_highlighter() -> Highlighter {
        let syntaxes = Arc::new(SyntaxSet::load_defaults_newlines());
        let highlighter = Highlighter::new(syntaxes);
        let themes = ThemeSet::load_defaults();
        for name in ["base16-ocean.dark", "InspiredGitHub"] {
            highlighter.register_theme(name, Arc::new(themes.themes[name].clone()));
        }
        highlighter.register_language("rust", Arc::new("Rust".to_string()));
        highlighter
    }

    #[test]
    fn tokens_reassemble_the_line() {
        let highlighter = rust_highlighter();
        let lines = highlighter
            .tokenize_lines(&["fn main() {}\n", "let x = 1;"], "rust", &TokenizeOptions::default())
            .unwrap();
        assert_eq!(lines.len(), 2);
        let text: String = lines[0].iter().map(|t| t.text.as_str()).collect();
        assert_eq!(text, "fn main() {}");
        assert!(lines[0].len() > 1);
        assert!(lines[0].iter().all(|t| t.style.foreground.is_some()));
    }

    #[test]
    fn long_lines_are_plain() {
        let highlighter = rust_highlighter();
        let options = TokenizeOptions {
            tokenize_max_line_length: 10,
            ..Default::default()
        };
        let lines = highlighter
            .tokenize_lines(&["let value = 12345678;"], "rust", &options)
            .unwrap();
        assert_eq!(lines[0], vec![HighlightedToken::plain("let value = 12345678;")]);
    }

    #[test]
    fn light_dark_fills_dark_style() {
        let highlighter = rust_highlighter();
        let options = TokenizeOptions {
            theme: ThemeSelection::LightDark {
                light: "InspiredGitHub".into(),
                dark: "base16-ocean.dark".into(),
            },
            ..Default::default()
        };
        let lines = highlighter.tokenize_lines(&["fn a() {}"], "rust", &options).unwrap();
        assert!(lines[0].iter().all(|t| t.dark_style.is_some()));
    }

    #[test]
    fn missing_theme_is_an_error() {
        let highlighter = rust_highlighter();
        let options = TokenizeOptions {
            theme: ThemeSelection::Single("Solarized (light)".into()),
            ..Default::default()
        };
        assert_eq!(
            highlighter.tokenize_lines(&["x"], "rust", &options),
            Err(HighlightError::ThemeNotLoaded {
                name: "Solarized (light)".into()
            })
        );
    }

    #[test]
    fn diff_without_full_lines_follows_hunk_order() {
        let highlighter = rust_highlighter();
        let patch = "--- a/lib.rs\n+++ b/lib.rs\n@@ -1,2 +1,2 @@\n fn a() {}\n-fn b() {}\n+fn c() {}\n";
        let parsed = crate::infra::diff::parse_patch_files(patch, None);
        let diff = &parsed[0].files[0];
        let result = highlighter.tokenize_diff(diff, &TokenizeOptions::default()).unwrap();
        assert_eq!(result.old_lines.len(), 2);
        assert_eq!(result.new_lines.len(), 2);
        let second: String = result.new_lines[1].iter().map(|t| t.text.as_str()).collect();
        assert_eq!(second, "fn c() {}");
    }

    #[test]
    fn flat_theme_merges_tokens() {
        let highlighter = rust_highlighter();
        highlighter.register_theme("flat", Arc::new(flat_theme()));
        let options = TokenizeOptions {
            theme: ThemeSelection::Single("flat".into()),
            ..Default::default()
        };
        let lines = highlighter.tokenize_lines(&["fn main() {}"], "rust", &options).unwrap();
        assert_eq!(lines[0].len(), 1);
        assert_eq!(lines[0][0].text, "fn main() {}");
    }
}
