//! Builds a [`FileDiffMetadata`] from two full file contents.

use super::parser::parse_patch_files;
use crate::domain::{DiffError, FileContents, FileDiffMetadata};
use similar::TextDiff;

/// Context lines around each change, matching `diff -u`.
pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// Render a unified patch between two files.
///
/// A missing final newline is flagged with the usual
/// `\ No newline at end of file` marker.
pub fn create_two_files_patch(old: &FileContents, new: &FileContents, context: usize) -> String {
    let old_header = format!("a/{}", old.name);
    let new_header = format!("b/{}", new.name);
    TextDiff::from_lines(old.contents.as_str(), new.contents.as_str())
        .unified_diff()
        .context_radius(context)
        .missing_newline_hint(true)
        .header(&old_header, &new_header)
        .to_string()
}

/// Diff two files and keep their full contents for context expansion.
///
/// Identical contents are a caller error: there is nothing to render.
pub fn parse_diff_from_file(
    old: &FileContents,
    new: &FileContents,
) -> Result<FileDiffMetadata, DiffError> {
    if old.contents == new.contents {
        return Err(DiffError::IdenticalContents {
            name: new.name.clone(),
        });
    }

    let patch = create_two_files_patch(old, new, DEFAULT_CONTEXT_LINES);
    let mut file = parse_patch_files(&patch, None)
        .into_iter()
        .flat_map(|parsed| parsed.files)
        .next()
        .ok_or(DiffError::NoFileInPatch)?;

    if file.hunks.is_empty() {
        return Err(DiffError::IdenticalContents {
            name: new.name.clone(),
        });
    }

    file.old_lines = Some(old.lines());
    file.new_lines = Some(new.lines());
    file.cache_key = match (&old.cache_key, &new.cache_key) {
        (Some(old_key), Some(new_key)) => Some(format!("{old_key}:{new_key}")),
        _ => None,
    };
    Ok(file)
}
