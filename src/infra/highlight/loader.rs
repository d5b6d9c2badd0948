use super::languages::resolve_syntax_name;
use crate::domain::HighlightError;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::parsing::SyntaxSet;

/// Source of grammars and themes for a [`HighlighterCache`].
///
/// [`HighlighterCache`]: super::HighlighterCache
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn load_syntaxes(&self) -> Result<SyntaxSet, HighlightError>;

    async fn load_theme(&self, name: &str) -> Result<Theme, HighlightError>;

    /// Resolve `lang` to the name of a syntax in `syntaxes`.
    async fn load_language(
        &self,
        syntaxes: Arc<SyntaxSet>,
        lang: &str,
    ) -> Result<String, HighlightError>;
}

/// Loads syntect's bundled grammars and themes plus any registered
/// `.tmTheme` files.
#[derive(Default)]
pub struct SyntectLoader {
    bundled_themes: OnceCell<ThemeSet>,
    custom_themes: RwLock<HashMap<String, PathBuf>>,
}

impl SyntectLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_custom_themes(themes: &HashMap<String, PathBuf>) -> Self {
        let loader = Self::new();
        for (name, path) in themes {
            loader.register_theme(name, path);
        }
        loader
    }

    /// Make a `.tmTheme` file loadable under `name`. Later registrations win.
    pub fn register_theme(&self, name: &str, path: impl AsRef<Path>) {
        self.custom_themes
            .write()
            .insert(name.to_string(), path.as_ref().to_path_buf());
    }

    pub fn bundled_theme_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bundled().themes.keys().cloned().collect();
        names.sort();
        names
    }

    fn bundled(&self) -> &ThemeSet {
        self.bundled_themes.get_or_init(ThemeSet::load_defaults)
    }
}

#[async_trait]
impl ResourceLoader for SyntectLoader {
    async fn load_syntaxes(&self) -> Result<SyntaxSet, HighlightError> {
        tokio::task::spawn_blocking(SyntaxSet::load_defaults_newlines)
            .await
            .map_err(|e| HighlightError::Load {
                resource: "syntaxes".into(),
                message: e.to_string(),
            })
    }

    async fn load_theme(&self, name: &str) -> Result<Theme, HighlightError> {
        let custom = self.custom_themes.read().get(name).cloned();
        if let Some(path) = custom {
            let resource = path.display().to_string();
            return tokio::task::spawn_blocking(move || ThemeSet::get_theme(&path))
                .await
                .map_err(|e| HighlightError::Load {
                    resource: resource.clone(),
                    message: e.to_string(),
                })?
                .map_err(|e| HighlightError::Load {
                    resource,
                    message: e.to_string(),
                });
        }

        self.bundled()
            .themes
            .get(name)
            .cloned()
            .ok_or_else(|| HighlightError::UnknownTheme(name.to_string()))
    }

    async fn load_language(
        &self,
        syntaxes: Arc<SyntaxSet>,
        lang: &str,
    ) -> Result<String, HighlightError> {
        resolve_syntax_name(&syntaxes, lang)
            .ok_or_else(|| HighlightError::UnknownLanguage(lang.to_string()))
    }
}
