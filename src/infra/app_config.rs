use crate::domain::{DEFAULT_THEME, RenderConfig, ThemeSelection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_POOL_SIZE: usize = 4;
pub const DEFAULT_RESULT_CACHE_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Number of background highlight workers.
    pub pool_size: usize,
    /// Languages every worker loads during initialization.
    pub preload_langs: Vec<String>,
    /// Highlight results kept by the pool; 0 disables the cache.
    pub result_cache_size: usize,
    pub themes: ThemeSelection,
    /// Theme name to `.tmTheme` path.
    pub custom_themes: HashMap<String, PathBuf>,
    pub render: RenderConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            preload_langs: Vec::new(),
            result_cache_size: DEFAULT_RESULT_CACHE_SIZE,
            themes: ThemeSelection::Single(DEFAULT_THEME.to_string()),
            custom_themes: HashMap::new(),
            render: RenderConfig::default(),
        }
    }
}

pub fn load_config() -> AppConfig {
    load_config_from(&config_path())
}

/// Read a config file; a missing or malformed file yields the defaults.
pub fn load_config_from(path: &Path) -> AppConfig {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return AppConfig::default();
    };
    match toml::from_str(&contents) {
        Ok(config) => config,
        Err(err) => {
            log::warn!(target: "patchlens::config", "Ignoring invalid config {}: {}", path.display(), err);
            AppConfig::default()
        }
    }
}

pub fn save_config(config: &AppConfig) -> std::io::Result<()> {
    save_config_to(config, &config_path())
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = toml::to_string_pretty(config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(path, contents)
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("PATCHLENS_CONFIG_PATH") {
        return PathBuf::from(path);
    }

    app_data_dir().join("config.toml")
}

fn app_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Some(home) = home::home_dir() {
            return home
                .join("Library")
                .join("Application Support")
                .join("patchlens");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("patchlens");
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Some(xdg) = std::env::var_os("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("patchlens");
        }
        if let Some(home) = home::home_dir() {
            return home.join(".local").join("share").join("patchlens");
        }
    }

    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".patchlens")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DEFAULT_EXPANSION_LINE_COUNT, DiffStyle, LineDiffType, SeparatorStyle};

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml"));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig {
            pool_size: 2,
            themes: ThemeSelection::LightDark {
                light: "InspiredGitHub".into(),
                dark: "base16-ocean.dark".into(),
            },
            preload_langs: vec!["rust".into()],
            ..Default::default()
        };
        config.render.diff_style = DiffStyle::Unified;
        config.render.line_diff_type = LineDiffType::Char;

        save_config_to(&config, &path).unwrap();
        assert_eq!(load_config_from(&path), config);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "pool_size = 8\n[render]\nhunk_separators = \"metadata\"\n").unwrap();

        let config = load_config_from(&path);
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.render.hunk_separators, SeparatorStyle::Metadata);
        assert_eq!(config.render.expansion_line_count, DEFAULT_EXPANSION_LINE_COUNT);
        assert_eq!(config.result_cache_size, DEFAULT_RESULT_CACHE_SIZE);
    }

    #[test]
    fn invalid_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "pool_size = \"many\"").unwrap();
        assert_eq!(load_config_from(&path), AppConfig::default());
    }
}
