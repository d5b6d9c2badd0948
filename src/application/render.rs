//! Row layout for diffs and plain files.

pub mod decorations;
pub mod engine;
pub mod types;

pub use decorations::{LineDecorations, line_decorations};
pub use engine::HunkRenderEngine;
pub use types::{
    Columns, Expandable, HunkData, HunkSeparators, LineRecord, LineType, RenderOptions,
    RenderedDiff, RowElement, SeparatorContext, SeparatorFn, SeparatorRecord,
};
