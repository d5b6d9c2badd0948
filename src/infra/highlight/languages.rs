use crate::domain::{FileContents, FileDiffMetadata, TokenizeOptions};
use crate::infra::diff::normalize_patch_path;
use std::path::Path;
use syntect::parsing::SyntaxSet;

/// Language id used when nothing better is known.
pub const PLAIN_TEXT: &str = "text";

/// Map a file name to a language id. Unknown files are plain text.
pub fn detect_language(file_name: &str) -> &'static str {
    let normalized = normalize_patch_path(file_name);
    let path = Path::new(&normalized);
    let file = path
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or_default()
        .to_lowercase();

    match file.as_str() {
        "makefile" | "gnumakefile" => return "makefile",
        "dockerfile" => return "dockerfile",
        "cmakelists.txt" => return "cmake",
        "cargo.lock" => return "toml",
        _ => {}
    }

    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return PLAIN_TEXT;
    };
    match ext.to_lowercase().as_str() {
        "rs" => "rust",
        "ts" | "mts" | "cts" => "typescript",
        "tsx" => "tsx",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "jsx",
        "py" | "pyw" | "pyi" => "python",
        "go" => "go",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => "cpp",
        "cs" => "csharp",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "swift" => "swift",
        "rb" | "erb" | "rake" => "ruby",
        "php" => "php",
        "pl" | "pm" => "perl",
        "lua" => "lua",
        "sql" => "sql",
        "sh" | "bash" | "zsh" => "shellscript",
        "json" | "jsonc" => "json",
        "toml" => "toml",
        "yml" | "yaml" => "yaml",
        "xml" | "svg" | "xsl" => "xml",
        "html" | "htm" | "xhtml" => "html",
        "css" => "css",
        "scss" | "sass" => "scss",
        "md" | "markdown" => "markdown",
        "tex" | "latex" => "latex",
        "diff" | "patch" => "diff",
        "hs" => "haskell",
        "ml" | "mli" => "ocaml",
        "scala" => "scala",
        "clj" | "cljs" => "clojure",
        "erl" => "erlang",
        "r" => "r",
        _ => PLAIN_TEXT,
    }
}

/// Language for a whole file: explicit option, then the file's own hint,
/// then detection from its name.
pub fn file_language(file: &FileContents, options: &TokenizeOptions) -> String {
    options
        .lang
        .clone()
        .or_else(|| file.lang.clone())
        .unwrap_or_else(|| detect_language(&file.name).to_string())
}

/// Languages for the old and new side of a diff. Renames can change them.
pub fn diff_languages(diff: &FileDiffMetadata, options: &TokenizeOptions) -> (String, String) {
    if let Some(lang) = &options.lang {
        return (lang.clone(), lang.clone());
    }
    let new_lang = detect_language(&diff.name).to_string();
    let old_lang = diff
        .prev_name
        .as_deref()
        .map(|prev| detect_language(prev).to_string())
        .unwrap_or_else(|| new_lang.clone());
    (old_lang, new_lang)
}

/// Syntect lookup tokens for a language id, most specific first.
fn syntax_tokens(lang: &str) -> &'static [&'static str] {
    match lang {
        "rust" => &["rs"],
        "typescript" | "tsx" => &["ts", "js"],
        "javascript" | "jsx" => &["js"],
        "python" => &["py"],
        "go" => &["go"],
        "c" => &["c"],
        "cpp" => &["cpp"],
        "csharp" => &["cs"],
        "java" => &["java"],
        "kotlin" => &["kt", "java"],
        "swift" => &["swift"],
        "ruby" => &["rb"],
        "php" => &["php"],
        "perl" => &["pl"],
        "lua" => &["lua"],
        "sql" => &["sql"],
        "shellscript" => &["sh", "bash"],
        "json" => &["json"],
        "toml" => &["toml"],
        "yaml" => &["yaml"],
        "xml" => &["xml"],
        "html" => &["html"],
        "css" | "scss" => &["css"],
        "markdown" => &["md"],
        "latex" => &["tex"],
        "diff" => &["diff"],
        "haskell" => &["hs"],
        "ocaml" => &["ml"],
        "scala" => &["scala"],
        "clojure" => &["clj"],
        "erlang" => &["erl"],
        "r" => &["r"],
        "makefile" => &["make", "Makefile"],
        "dockerfile" => &["Dockerfile"],
        "cmake" => &["cmake"],
        _ => &[],
    }
}

/// Resolve a language id (or a raw syntect token such as `"Rust"`) to the
/// name of a syntax in `syntaxes`. Known languages without a bundled
/// grammar fall back to plain text; unknown ids resolve to `None`.
pub fn resolve_syntax_name(syntaxes: &SyntaxSet, lang: &str) -> Option<String> {
    if lang == PLAIN_TEXT {
        return Some(syntaxes.find_syntax_plain_text().name.clone());
    }

    let tokens = syntax_tokens(lang);
    if let Some(syntax) = tokens
        .iter()
        .find_map(|token| syntaxes.find_syntax_by_token(token))
    {
        return Some(syntax.name.clone());
    }

    if let Some(syntax) = syntaxes
        .find_syntax_by_name(lang)
        .or_else(|| syntaxes.find_syntax_by_token(lang))
    {
        return Some(syntax.name.clone());
    }

    if !tokens.is_empty() {
        log::debug!(target: "patchlens::highlight", "No bundled grammar for {}, using plain text", lang);
        return Some(syntaxes.find_syntax_plain_text().name.clone());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_languages() {
        assert_eq!(detect_language("src/main.rs"), "rust");
        assert_eq!(detect_language("b/web/App.tsx"), "tsx");
        assert_eq!(detect_language("Makefile"), "makefile");
        assert_eq!(detect_language("notes"), PLAIN_TEXT);
        assert_eq!(detect_language("archive.weird"), PLAIN_TEXT);
    }

    #[test]
    fn explicit_language_wins() {
        let file = FileContents::new("script", "echo hi\n").with_lang("shellscript");
        assert_eq!(file_language(&file, &TokenizeOptions::default()), "shellscript");

        let options = TokenizeOptions {
            lang: Some("python".into()),
            ..Default::default()
        };
        assert_eq!(file_language(&file, &options), "python");
    }

    #[test]
    fn renamed_diff_keeps_old_language() {
        let mut diff = FileDiffMetadata::new("src/app.ts");
        diff.prev_name = Some("src/app.js".into());
        let (old, new) = diff_languages(&diff, &TokenizeOptions::default());
        assert_eq!(old, "javascript");
        assert_eq!(new, "typescript");
    }

    #[test]
    fn resolves_against_default_syntaxes() {
        let syntaxes = SyntaxSet::load_defaults_newlines();
        assert_eq!(resolve_syntax_name(&syntaxes, "rust").as_deref(), Some("Rust"));
        assert_eq!(
            resolve_syntax_name(&syntaxes, "typescript").as_deref(),
            Some("JavaScript")
        );
        assert_eq!(
            resolve_syntax_name(&syntaxes, PLAIN_TEXT).as_deref(),
            Some("Plain Text")
        );
        assert_eq!(resolve_syntax_name(&syntaxes, "klingon"), None);
    }
}
