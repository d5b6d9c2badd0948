//! Patch parsing and diff model construction.

pub mod builder;
pub mod parser;
pub mod resolve;

pub use builder::{DEFAULT_CONTEXT_LINES, create_two_files_patch, parse_diff_from_file};
pub use parser::{HunkHeader, parse_hunk_header, parse_patch_files};
pub use resolve::diff_accept_reject_hunk;

/// Strip `a/`, `b/` and `./` prefixes from a path taken from a patch header.
pub fn normalize_patch_path(path: &str) -> String {
    path.trim()
        .trim_start_matches("./")
        .trim_start_matches("a/")
        .trim_start_matches("b/")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_prefixed_paths() {
        assert_eq!(normalize_patch_path(" a/src/lib.rs "), "src/lib.rs");
        assert_eq!(normalize_patch_path("./b/README.md"), "README.md");
    }
}
