pub mod application;
pub mod domain;
pub mod infra;

pub use application::render::{HunkRenderEngine, RenderOptions, RenderedDiff};
pub use infra::diff::{diff_accept_reject_hunk, parse_diff_from_file, parse_patch_files};
pub use infra::highlight::{HighlighterCache, SyntectLoader};
pub use infra::worker::{PoolOptions, WorkerPool};
