//! Domain types for patchlens.
//! Defines the diff model, annotations, highlight tokens, render enums and
//! error types shared by every layer.

pub mod annotation;
pub mod diff;
pub mod error;
pub mod highlight;
pub mod render;

pub use annotation::*;
pub use diff::*;
pub use error::*;
pub use highlight::*;
pub use render::*;
