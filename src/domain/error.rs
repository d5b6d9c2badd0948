//! Error types for patchlens.
//!
//! Each subsystem gets its own enum so callers can tell caller mistakes
//! (identical inputs, out-of-range indexes) from resource and worker failures.

use thiserror::Error;

/// Errors from patch parsing and diff model transformations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiffError {
    #[error("Invalid diff format: {0}")]
    InvalidFormat(String),

    #[error("Cannot diff identical contents of {name}")]
    IdenticalContents { name: String },

    #[error("Patch produced no file diff")]
    NoFileInPatch,

    #[error("Hunk index {index} out of range for {count} hunks")]
    HunkOutOfRange { index: usize, count: usize },
}

/// Errors raised while building render output.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Expansion requires full old and new file contents for {file}")]
    ExpansionUnavailable { file: String },

    #[error("Hunk index {index} out of range for {count} hunks")]
    HunkOutOfRange { index: usize, count: usize },
}

/// Errors from loading highlighter resources or tokenizing.
///
/// Cloneable so one failed load can be handed to every caller awaiting it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HighlightError {
    #[error("Unknown theme: {0}")]
    UnknownTheme(String),

    #[error("Unknown language: {0}")]
    UnknownLanguage(String),

    #[error("Theme {name} not loaded")]
    ThemeNotLoaded { name: String },

    #[error("Failed to load {resource}: {message}")]
    Load { resource: String, message: String },

    #[error("Tokenization failed: {0}")]
    Tokenize(String),
}

/// Errors surfaced by the worker pool.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Worker pool terminated")]
    Terminated,

    #[error("Worker pool not initialized")]
    NotInitialized,

    #[error("Failed to spawn worker {index}: {message}")]
    Spawn { index: usize, message: String },

    #[error("Worker {index} is unavailable")]
    WorkerUnavailable { index: usize },

    #[error("No live workers left in the pool")]
    NoWorkers,

    #[error("Worker task failed: {message}")]
    Task {
        message: String,
        stack: Option<String>,
    },

    #[error("Unexpected response for {request}: {message}")]
    Protocol { request: String, message: String },
}
