//! Syntax highlighting backed by syntect.

pub mod cache;
pub mod highlighter;
pub mod languages;
pub mod loader;
pub mod single_flight;

pub use cache::HighlighterCache;
pub use highlighter::Highlighter;
pub use languages::{PLAIN_TEXT, detect_language, diff_languages, file_language};
pub use loader::{ResourceLoader, SyntectLoader};
pub use single_flight::ResourceState;
