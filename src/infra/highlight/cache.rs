use super::highlighter::Highlighter;
use super::loader::ResourceLoader;
use super::single_flight::{ResourceState, SingleFlight};
use crate::domain::{HighlightError, ThemeSelection};
use futures::future::{try_join, try_join_all};
use std::sync::Arc;
use syntect::highlighting::Theme;

const CORE_KEY: &str = "syntaxes";

/// Explicitly constructed owner of one [`Highlighter`] and its loaded
/// themes and languages.
///
/// Every resource loads through a single-flight slot: concurrent callers
/// asking for the same theme or language await one shared load.
pub struct HighlighterCache {
    loader: Arc<dyn ResourceLoader>,
    core: SingleFlight<Highlighter>,
    themes: SingleFlight<Theme>,
    languages: SingleFlight<String>,
}

impl HighlighterCache {
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        Self {
            loader,
            core: SingleFlight::new(),
            themes: SingleFlight::new(),
            languages: SingleFlight::new(),
        }
    }

    /// The shared highlighter with every theme in `themes` and every language
    /// in `langs` loaded. Returns the same `Arc` until [`dispose`] is called.
    ///
    /// [`dispose`]: HighlighterCache::dispose
    pub async fn get_or_load(
        &self,
        themes: &ThemeSelection,
        langs: &[String],
    ) -> Result<Arc<Highlighter>, HighlightError> {
        let highlighter = self.highlighter().await?;

        let theme_loads = themes
            .names()
            .into_iter()
            .map(|name| self.load_theme(&highlighter, name));
        let lang_loads = langs
            .iter()
            .map(|lang| self.load_language(&highlighter, lang));
        try_join(try_join_all(theme_loads), try_join_all(lang_loads)).await?;

        Ok(highlighter)
    }

    pub fn theme_state(&self, name: &str) -> ResourceState {
        self.themes.state(name)
    }

    pub fn language_state(&self, lang: &str) -> ResourceState {
        self.languages.state(lang)
    }

    pub fn is_ready(&self) -> bool {
        self.core.state(CORE_KEY) == ResourceState::Loaded
    }

    pub fn loaded_languages(&self) -> Vec<String> {
        let mut langs = self.languages.loaded_keys();
        langs.sort();
        langs
    }

    /// Drop the highlighter and every loaded resource. Loads still in flight
    /// finish for their callers but are not kept.
    pub fn dispose(&self) {
        log::debug!(target: "patchlens::highlight", "Disposing highlighter cache");
        self.core.clear();
        self.themes.clear();
        self.languages.clear();
    }

    async fn highlighter(&self) -> Result<Arc<Highlighter>, HighlightError> {
        let loader = self.loader.clone();
        self.core
            .get_or_load(CORE_KEY, move || async move {
                let syntaxes = loader.load_syntaxes().await?;
                Ok(Highlighter::new(Arc::new(syntaxes)))
            })
            .await
    }

    async fn load_theme(
        &self,
        highlighter: &Highlighter,
        name: &str,
    ) -> Result<(), HighlightError> {
        let loader = self.loader.clone();
        let owned = name.to_string();
        let theme = self
            .themes
            .get_or_load(name, move || async move { loader.load_theme(&owned).await })
            .await?;
        if !highlighter.has_theme(name) {
            highlighter.register_theme(name, theme);
        }
        Ok(())
    }

    async fn load_language(
        &self,
        highlighter: &Highlighter,
        lang: &str,
    ) -> Result<(), HighlightError> {
        let loader = self.loader.clone();
        let syntaxes = highlighter.syntaxes();
        let owned = lang.to_string();
        let syntax_name = self
            .languages
            .get_or_load(lang, move || async move {
                loader.load_language(syntaxes, &owned).await
            })
            .await?;
        if !highlighter.has_language(lang) {
            highlighter.register_language(lang, syntax_name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TokenizeOptions;
    use crate::infra::highlight::SyntectLoader;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use syntect::parsing::{SyntaxSet, SyntaxSetBuilder};

    /// Counts every load and answers with minimal resources.
    #[derive(Default)]
    struct CountingLoader {
        syntaxes: AtomicUsize,
        themes: AtomicUsize,
        languages: AtomicUsize,
    }

    #[async_trait]
    impl ResourceLoader for CountingLoader {
        async fn load_syntaxes(&self) -> Result<SyntaxSet, HighlightError> {
            self.syntaxes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            let mut builder = SyntaxSetBuilder::new();
            builder.add_plain_text_syntax();
            Ok(builder.build())
        }

        async fn load_theme(&self, name: &str) -> Result<Theme, HighlightError> {
            self.themes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            if name == "missing" {
                return Err(HighlightError::UnknownTheme(name.to_string()));
            }
            Ok(Theme::default())
        }

        async fn load_language(
            &self,
            syntaxes: Arc<SyntaxSet>,
            _lang: &str,
        ) -> Result<String, HighlightError> {
            self.languages.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(syntaxes.find_syntax_plain_text().name.clone())
        }
    }

    #[tokio::test]
    async fn concurrent_requests_load_each_resource_once() {
        let loader = Arc::new(CountingLoader::default());
        let cache = Arc::new(HighlighterCache::new(loader.clone()));
        let theme = ThemeSelection::Single("dark".into());
        let langs = vec!["rust".to_string(), "python".to_string()];

        let calls = (0..100).map(|_| cache.get_or_load(&theme, &langs));
        let highlighters = futures::future::try_join_all(calls).await.unwrap();

        assert_eq!(loader.syntaxes.load(Ordering::SeqCst), 1);
        assert_eq!(loader.themes.load(Ordering::SeqCst), 1);
        assert_eq!(loader.languages.load(Ordering::SeqCst), 2);
        assert!(
            highlighters
                .iter()
                .all(|h| Arc::ptr_eq(h, &highlighters[0]))
        );
        assert_eq!(cache.theme_state("dark"), ResourceState::Loaded);
        assert_eq!(cache.loaded_languages(), vec!["python", "rust"]);
        assert_eq!(cache.language_state("go"), ResourceState::Unloaded);
    }

    #[tokio::test]
    async fn failed_theme_reverts_and_propagates() {
        let loader = Arc::new(CountingLoader::default());
        let cache = HighlighterCache::new(loader.clone());
        let theme = ThemeSelection::Single("missing".into());

        let err = cache.get_or_load(&theme, &[]).await.err();
        assert_eq!(err, Some(HighlightError::UnknownTheme("missing".into())));
        assert_eq!(cache.theme_state("missing"), ResourceState::Unloaded);
        assert!(cache.is_ready());

        let _ = cache.get_or_load(&theme, &[]).await;
        assert_eq!(loader.themes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dispose_forces_a_fresh_highlighter() {
        let loader = Arc::new(CountingLoader::default());
        let cache = HighlighterCache::new(loader.clone());
        let theme = ThemeSelection::Single("dark".into());

        let first = cache.get_or_load(&theme, &[]).await.unwrap();
        cache.dispose();
        assert!(!cache.is_ready());
        assert_eq!(cache.theme_state("dark"), ResourceState::Unloaded);

        let second = cache.get_or_load(&theme, &[]).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.has_theme("dark"));
        assert_eq!(loader.syntaxes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn syntect_loader_highlights_rust() {
        let cache = HighlighterCache::new(Arc::new(SyntectLoader::new()));
        let options = TokenizeOptions::default();
        let highlighter = cache
            .get_or_load(&options.theme, &["rust".to_string()])
            .await
            .unwrap();
        let lines = highlighter
            .tokenize_lines(&["fn main() {}"], "rust", &options)
            .unwrap();
        assert!(lines[0].len() > 1);

        let unknown = cache
            .get_or_load(&options.theme, &["klingon".to_string()])
            .await;
        assert_eq!(
            unknown.err(),
            Some(HighlightError::UnknownLanguage("klingon".into()))
        );
    }
}
