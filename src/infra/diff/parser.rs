//! Unified diff parser.
//!
//! Turns raw patch text (plain `diff -u` output, `git diff`, or a
//! `git format-patch` mailbox with several commits) into [`ParsedPatch`]
//! values. Parsing is best effort: malformed pieces are logged and skipped so
//! one bad hunk does not discard the rest of a large patch.

use crate::domain::{
    ChangeContent, ChangeType, ContextContent, DiffError, FileDiffMetadata, Hunk, HunkContent,
    ParsedPatch,
};
use once_cell::sync::Lazy;
use regex::Regex;

static COMMIT_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^From [0-9a-f]{7,40} ").expect("commit boundary regex"));

static HUNK_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@ ?(.*)$").expect("hunk header regex")
});

const DEV_NULL: &str = "/dev/null";

/// Parse patch text into one [`ParsedPatch`] per commit block.
///
/// When `cache_key_prefix` is set every file gets a stable cache key of the
/// form `{prefix}-{patch index}-{file index}`.
pub fn parse_patch_files(text: &str, cache_key_prefix: Option<&str>) -> Vec<ParsedPatch> {
    let mut patches = Vec::new();
    for (index, segment) in split_commits(text).into_iter().enumerate() {
        let prefix = cache_key_prefix.map(|p| format!("{p}-{index}"));
        match parse_patch_segment(segment, prefix.as_deref()) {
            Ok(patch) => patches.push(patch),
            Err(err) => {
                log::error!(target: "patchlens::parser", "Skipping patch segment {}: {}", index, err);
            }
        }
    }
    patches
}

/// Split on `From <sha> ` lines, dropping blank segments.
fn split_commits(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0usize;
    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        if offset > start && COMMIT_BOUNDARY.is_match(line) {
            segments.push(&text[start..offset]);
            start = offset;
        }
        offset += line.len();
    }
    segments.push(&text[start..]);
    segments.retain(|segment| !segment.trim().is_empty());
    segments
}

/// Parse a single commit block.
pub fn parse_patch_segment(
    text: &str,
    cache_key_prefix: Option<&str>,
) -> Result<ParsedPatch, DiffError> {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let is_git = lines.iter().any(|line| line.starts_with("diff --git "));

    let mut patch = ParsedPatch::default();
    let mut stray = String::new();
    let mut current: Option<FileBuilder> = None;
    let mut i = 0usize;

    while i < lines.len() {
        let line = lines[i];

        let file_start = starts_file(&lines, i, is_git);

        if let Some(file) = current.as_mut()
            && file.wants_body_line(line, is_git, file_start)
        {
            file.push_body_line(line);
            i += 1;
            continue;
        }

        if file_start {
            flush_stray(&mut patch, &mut stray);
            if let Some(file) = current.take() {
                push_file(&mut patch, file);
            }
            let mut file = FileBuilder::new(is_git);
            if is_git {
                file.read_git_header(line);
            } else {
                file.read_metadata_line(line);
            }
            current = Some(file);
            i += 1;
            continue;
        }

        if line.starts_with("@@") {
            match parse_hunk_header(line) {
                Some(header) => {
                    let file = current.get_or_insert_with(|| {
                        flush_stray(&mut patch, &mut stray);
                        FileBuilder::new(is_git)
                    });
                    file.start_hunk(header);
                }
                None => match current.as_mut() {
                    Some(file) => {
                        log::error!(
                            target: "patchlens::parser",
                            "Invalid hunk header, dropping hunk: {}",
                            line.trim_end()
                        );
                        file.skip_hunk();
                    }
                    None => {
                        log::warn!(
                            target: "patchlens::parser",
                            "Hunk header without file header: {}",
                            line.trim_end()
                        );
                        flush_stray(&mut patch, &mut stray);
                        let mut file = FileBuilder::new(is_git);
                        file.skip_hunk();
                        current = Some(file);
                    }
                },
            }
            i += 1;
            continue;
        }

        match current.as_mut() {
            Some(file) if file.in_metadata() => file.read_metadata_line(line),
            Some(_) => {
                log::debug!(target: "patchlens::parser", "Ignoring trailing line: {}", line.trim_end());
            }
            None => stray.push_str(line),
        }
        i += 1;
    }

    if let Some(file) = current.take() {
        push_file(&mut patch, file);
    }
    flush_stray(&mut patch, &mut stray);

    if patch.files.is_empty() && patch.patch_metadata.is_none() {
        return Err(DiffError::InvalidFormat("no file diffs in segment".to_string()));
    }

    if let Some(prefix) = cache_key_prefix {
        for (index, file) in patch.files.iter_mut().enumerate() {
            file.cache_key = Some(format!("{prefix}-{index}"));
        }
    }

    Ok(patch)
}

/// Finish a file block, skipping it alone when it is malformed.
fn push_file(patch: &mut ParsedPatch, file: FileBuilder) {
    match file.finish() {
        Ok(file) => patch.files.push(file),
        Err(err) => {
            log::warn!(target: "patchlens::parser", "Skipping file diff: {}", err);
        }
    }
}

fn flush_stray(patch: &mut ParsedPatch, stray: &mut String) {
    if stray.trim().is_empty() {
        stray.clear();
        return;
    }
    let blob = std::mem::take(stray);
    if patch.patch_metadata.is_none() {
        patch.patch_metadata = Some(blob);
    } else {
        log::error!(target: "patchlens::parser", "Unknown file blob: {}", blob.trim_end());
    }
}

fn starts_file(lines: &[&str], i: usize, is_git: bool) -> bool {
    if is_git {
        return lines[i].starts_with("diff --git ");
    }
    lines[i].starts_with("--- ")
        && lines
            .get(i + 1)
            .is_some_and(|next| next.starts_with("+++ "))
}

/// Numbers and trailing text of an `@@ -a,b +c,d @@ context` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkHeader {
    pub deletion_start: usize,
    pub deletion_count: usize,
    pub addition_start: usize,
    pub addition_count: usize,
    pub context: Option<String>,
    pub specs: String,
}

/// Parse a hunk header. Omitted counts default to one line.
pub fn parse_hunk_header(line: &str) -> Option<HunkHeader> {
    let line = line.trim_end_matches(['\n', '\r']);
    let caps = HUNK_HEADER.captures(line)?;
    let number = |idx: usize, default: usize| -> Option<usize> {
        match caps.get(idx) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(default),
        }
    };
    let context = caps
        .get(5)
        .map(|m| m.as_str().trim_end())
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let specs = match line.find(" @@") {
        Some(end) => line[..end + 3].to_string(),
        None => line.to_string(),
    };

    Some(HunkHeader {
        deletion_start: number(1, 0)?,
        deletion_count: number(2, 1)?,
        addition_start: number(3, 0)?,
        addition_count: number(4, 1)?,
        context,
        specs,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LastLine {
    Context,
    Deletion,
    Addition,
}

struct HunkBuilder {
    hunk: Hunk,
    remaining_old: usize,
    remaining_new: usize,
    last: Option<LastLine>,
}

impl HunkBuilder {
    fn new(header: HunkHeader) -> Self {
        Self {
            remaining_old: header.deletion_count,
            remaining_new: header.addition_count,
            hunk: Hunk {
                addition_start: header.addition_start,
                addition_count: header.addition_count,
                deletion_start: header.deletion_start,
                deletion_count: header.deletion_count,
                hunk_context: header.context,
                hunk_specs: header.specs,
                ..Default::default()
            },
            last: None,
        }
    }

    fn is_complete(&self) -> bool {
        self.remaining_old == 0 && self.remaining_new == 0
    }

    fn push_context(&mut self, line: &str) {
        // Some tools strip the marker from blank context lines.
        let line = if line.starts_with(' ') {
            line.to_string()
        } else {
            format!(" {line}")
        };
        match self.hunk.hunk_content.last_mut() {
            Some(HunkContent::Context(ctx)) => ctx.lines.push(line),
            _ => self.hunk.hunk_content.push(HunkContent::Context(ContextContent {
                lines: vec![line],
                no_eof_newline: false,
            })),
        }
        self.remaining_old = self.remaining_old.saturating_sub(1);
        self.remaining_new = self.remaining_new.saturating_sub(1);
        self.last = Some(LastLine::Context);
    }

    fn push_deletion(&mut self, line: &str) {
        match self.hunk.hunk_content.last_mut() {
            Some(HunkContent::Change(change)) if change.additions.is_empty() => {
                change.deletions.push(line.to_string())
            }
            _ => self.hunk.hunk_content.push(HunkContent::Change(ChangeContent {
                deletions: vec![line.to_string()],
                ..Default::default()
            })),
        }
        self.remaining_old = self.remaining_old.saturating_sub(1);
        self.last = Some(LastLine::Deletion);
    }

    fn push_addition(&mut self, line: &str) {
        match self.hunk.hunk_content.last_mut() {
            Some(HunkContent::Change(change)) => change.additions.push(line.to_string()),
            _ => self.hunk.hunk_content.push(HunkContent::Change(ChangeContent {
                additions: vec![line.to_string()],
                ..Default::default()
            })),
        }
        self.remaining_new = self.remaining_new.saturating_sub(1);
        self.last = Some(LastLine::Addition);
    }

    /// `\ No newline at end of file` applies to the line just before it.
    fn mark_no_newline(&mut self) {
        let Some(last) = self.last else {
            return;
        };
        let Some(content) = self.hunk.hunk_content.last_mut() else {
            return;
        };
        match (last, content) {
            (LastLine::Context, HunkContent::Context(ctx)) => {
                strip_last_newline(&mut ctx.lines);
                ctx.no_eof_newline = true;
            }
            (LastLine::Deletion, HunkContent::Change(change)) => {
                strip_last_newline(&mut change.deletions);
                change.no_eof_newline_deletions = true;
            }
            (LastLine::Addition, HunkContent::Change(change)) => {
                strip_last_newline(&mut change.additions);
                change.no_eof_newline_additions = true;
            }
            _ => {}
        }
    }

    fn finish(mut self) -> Hunk {
        if !self.is_complete() {
            log::warn!(
                target: "patchlens::parser",
                "Truncated hunk {}: {} old and {} new lines missing",
                self.hunk.hunk_specs,
                self.remaining_old,
                self.remaining_new
            );
        }
        self.hunk.recount();
        self.hunk
    }
}

fn strip_last_newline(lines: &mut [String]) {
    if let Some(line) = lines.last_mut() {
        if line.ends_with("\r\n") {
            line.truncate(line.len() - 2);
        } else if line.ends_with('\n') {
            line.truncate(line.len() - 1);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileSection {
    Metadata,
    Hunk,
    /// Body of a hunk whose header failed to parse.
    Skipping,
}

#[derive(Default)]
struct FileHeaderInfo {
    git_old: Option<String>,
    git_new: Option<String>,
    minus: Option<String>,
    plus: Option<String>,
    rename_from: Option<String>,
    rename_to: Option<String>,
    new_file: bool,
    deleted_file: bool,
    similarity: Option<u32>,
    old_mode: Option<String>,
    new_mode: Option<String>,
}

struct FileBuilder {
    is_git: bool,
    header: FileHeaderInfo,
    section: FileSection,
    hunks: Vec<Hunk>,
    current: Option<HunkBuilder>,
}

impl FileBuilder {
    fn new(is_git: bool) -> Self {
        Self {
            is_git,
            header: FileHeaderInfo::default(),
            section: FileSection::Metadata,
            hunks: Vec::new(),
            current: None,
        }
    }

    fn in_metadata(&self) -> bool {
        self.section == FileSection::Metadata
    }

    fn wants_body_line(&self, line: &str, is_git: bool, file_start: bool) -> bool {
        if line.starts_with("@@") || (is_git && line.starts_with("diff --git ")) {
            return false;
        }
        match self.section {
            FileSection::Skipping => {
                !file_start && matches!(line.chars().next(), Some(' ' | '+' | '-' | '\\'))
            }
            FileSection::Hunk => match &self.current {
                Some(hunk) if line.starts_with('\\') => hunk.last.is_some(),
                Some(hunk) => !hunk.is_complete(),
                None => false,
            },
            FileSection::Metadata => false,
        }
    }

    fn push_body_line(&mut self, line: &str) {
        if self.section == FileSection::Skipping {
            return;
        }
        let Some(hunk) = self.current.as_mut() else {
            return;
        };
        match line.chars().next() {
            Some('+') => hunk.push_addition(line),
            Some('-') => hunk.push_deletion(line),
            Some('\\') => hunk.mark_no_newline(),
            _ => hunk.push_context(line),
        }
    }

    fn start_hunk(&mut self, header: HunkHeader) {
        self.finish_hunk();
        self.current = Some(HunkBuilder::new(header));
        self.section = FileSection::Hunk;
    }

    fn skip_hunk(&mut self) {
        self.finish_hunk();
        self.section = FileSection::Skipping;
    }

    fn finish_hunk(&mut self) {
        if let Some(hunk) = self.current.take() {
            self.hunks.push(hunk.finish());
        }
    }

    fn read_git_header(&mut self, line: &str) {
        let rest = line
            .trim_end_matches(['\n', '\r'])
            .trim_start_matches("diff --git ");
        if let Some(split) = rest.rfind(" b/") {
            self.header.git_old = Some(strip_prefix_path(&rest[..split], "a/"));
            self.header.git_new = Some(strip_prefix_path(&rest[split + 1..], "b/"));
        } else if let Some((old, new)) = rest.split_once(' ') {
            self.header.git_old = Some(old.to_string());
            self.header.git_new = Some(new.to_string());
        }
    }

    fn read_metadata_line(&mut self, line: &str) {
        let line = line.trim_end_matches(['\n', '\r']);
        let header = &mut self.header;
        if let Some(path) = line.strip_prefix("--- ") {
            header.minus = Some(header_path(path));
        } else if let Some(path) = line.strip_prefix("+++ ") {
            header.plus = Some(header_path(path));
        } else if let Some(mode) = line.strip_prefix("new file mode ") {
            header.new_file = true;
            header.new_mode = Some(mode.trim().to_string());
        } else if let Some(mode) = line.strip_prefix("deleted file mode ") {
            header.deleted_file = true;
            header.old_mode = Some(mode.trim().to_string());
        } else if let Some(mode) = line.strip_prefix("old mode ") {
            header.old_mode = Some(mode.trim().to_string());
        } else if let Some(mode) = line.strip_prefix("new mode ") {
            header.new_mode = Some(mode.trim().to_string());
        } else if let Some(value) = line.strip_prefix("similarity index ") {
            header.similarity = value.trim().trim_end_matches('%').parse().ok();
        } else if let Some(path) = line.strip_prefix("rename from ") {
            header.rename_from = Some(path.to_string());
        } else if let Some(path) = line.strip_prefix("rename to ") {
            header.rename_to = Some(path.to_string());
        } else if let Some(rest) = line.strip_prefix("index ") {
            // `index abc..def 100644` keeps the mode on both sides.
            if let Some(mode) = rest.split_whitespace().nth(1) {
                header.old_mode.get_or_insert_with(|| mode.to_string());
                header.new_mode.get_or_insert_with(|| mode.to_string());
            }
        } else if !line.trim().is_empty() {
            log::debug!(target: "patchlens::parser", "Unrecognized file metadata: {}", line);
        }
    }

    fn finish(mut self) -> Result<FileDiffMetadata, DiffError> {
        self.finish_hunk();
        let FileHeaderInfo {
            git_old,
            git_new,
            minus,
            plus,
            rename_from,
            rename_to,
            new_file,
            deleted_file,
            similarity,
            old_mode,
            new_mode,
        } = std::mem::take(&mut self.header);

        let old_is_null = minus.as_deref() == Some(DEV_NULL);
        let new_is_null = plus.as_deref() == Some(DEV_NULL);
        let minus = minus.filter(|p| p != DEV_NULL);
        let plus = plus.filter(|p| p != DEV_NULL);
        let (minus, plus) = if self.is_git {
            (
                minus.map(|p| strip_prefix_path(&p, "a/")),
                plus.map(|p| strip_prefix_path(&p, "b/")),
            )
        } else {
            strip_plain_prefixes(minus, plus)
        };

        let is_new = new_file || old_is_null;
        let is_deleted = !is_new && (deleted_file || new_is_null);
        let renamed = rename_from.is_some() || rename_to.is_some();

        let old_name = rename_from.or(minus).or(git_old);
        let new_name = rename_to.or(plus).or(git_new);
        let name = if is_deleted {
            old_name.clone().or_else(|| new_name.clone())
        } else {
            new_name.clone().or_else(|| old_name.clone())
        };

        let Some(name) = name else {
            if self.is_git && self.hunks.is_empty() {
                return Err(DiffError::InvalidFormat(
                    "file header without paths".to_string(),
                ));
            }
            log::warn!(target: "patchlens::parser", "File diff without a name");
            return Ok(self.build(String::new(), None, ChangeType::Change, old_mode, new_mode));
        };

        let prev_name = if is_new || is_deleted {
            None
        } else {
            old_name.filter(|old| *old != name)
        };

        let change_type = if is_new {
            ChangeType::New
        } else if is_deleted {
            ChangeType::Deleted
        } else if renamed || prev_name.is_some() {
            if self.hunks.is_empty() {
                ChangeType::RenamePure
            } else {
                if similarity == Some(100) {
                    log::debug!(target: "patchlens::parser", "Rename of {} at 100% similarity carries hunks", name);
                }
                ChangeType::RenameChanged
            }
        } else {
            ChangeType::Change
        };

        Ok(self.build(name, prev_name, change_type, old_mode, new_mode))
    }

    fn build(
        self,
        name: String,
        prev_name: Option<String>,
        change_type: ChangeType,
        old_mode: Option<String>,
        new_mode: Option<String>,
    ) -> FileDiffMetadata {
        let mut file = FileDiffMetadata {
            name,
            prev_name,
            change_type,
            hunks: self.hunks,
            old_mode,
            new_mode,
            ..Default::default()
        };
        file.recompute_layout();
        file
    }
}

/// Path from a `---`/`+++` line, without a tab-separated timestamp.
fn header_path(raw: &str) -> String {
    let path = raw.split('\t').next().unwrap_or(raw).trim_end();
    path.trim_matches('"').to_string()
}

fn strip_prefix_path(path: &str, prefix: &str) -> String {
    path.strip_prefix(prefix).unwrap_or(path).to_string()
}

/// Plain diffs only carry `a/`/`b/` prefixes when both sides (or the only
/// side) use them.
fn strip_plain_prefixes(
    minus: Option<String>,
    plus: Option<String>,
) -> (Option<String>, Option<String>) {
    let minus_prefixed = minus.as_deref().is_none_or(|p| p.starts_with("a/"));
    let plus_prefixed = plus.as_deref().is_none_or(|p| p.starts_with("b/"));
    if minus_prefixed && plus_prefixed {
        (
            minus.map(|p| strip_prefix_path(&p, "a/")),
            plus.map(|p| strip_prefix_path(&p, "b/")),
        )
    } else {
        (minus, plus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = "--- a/f\n+++ b/f\n@@ -1,3 +1,3 @@\n const x = 1;\n-const y = 2;\n+const y = 3;\n const z = 4;";

    fn single_file(text: &str) -> FileDiffMetadata {
        let mut patches = parse_patch_files(text, None);
        assert_eq!(patches.len(), 1);
        let mut files = std::mem::take(&mut patches[0].files);
        assert_eq!(files.len(), 1);
        files.remove(0)
    }

    #[test]
    fn parses_simple_plain_patch() {
        let file = single_file(SIMPLE);
        assert_eq!(file.name, "f");
        assert_eq!(file.prev_name, None);
        assert_eq!(file.change_type, ChangeType::Change);
        assert_eq!(file.hunks.len(), 1);

        let hunk = &file.hunks[0];
        assert_eq!(hunk.deletion_count, 3);
        assert_eq!(hunk.addition_count, 3);
        assert_eq!(hunk.deletion_lines, 1);
        assert_eq!(hunk.addition_lines, 1);
        assert_eq!(hunk.hunk_specs, "@@ -1,3 +1,3 @@");
        assert_eq!(hunk.hunk_context, None);

        let changes: Vec<&ChangeContent> = hunk
            .hunk_content
            .iter()
            .filter_map(|c| match c {
                HunkContent::Change(change) => Some(change),
                HunkContent::Context(_) => None,
            })
            .collect();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].deletions, vec!["-const y = 2;\n"]);
        assert_eq!(changes[0].additions, vec!["+const y = 3;\n"]);

        assert_eq!(hunk.unified_line_count, 4);
        assert_eq!(hunk.split_line_count, 3);
        assert_eq!(file.unified_line_count, 4);
        assert_eq!(file.split_line_count, 3);
    }

    #[test]
    fn header_counts_default_to_one() {
        let header = parse_hunk_header("@@ -5 +7 @@ fn main() {\n").unwrap();
        assert_eq!(header.deletion_start, 5);
        assert_eq!(header.deletion_count, 1);
        assert_eq!(header.addition_start, 7);
        assert_eq!(header.addition_count, 1);
        assert_eq!(header.context.as_deref(), Some("fn main() {"));
        assert_eq!(header.specs, "@@ -5 +7 @@");
        assert!(parse_hunk_header("@@ -x,1 +1 @@").is_none());
    }

    #[test]
    fn computes_collapsed_before_between_hunks() {
        let patch = "--- a/lib.rs\n+++ b/lib.rs\n\
@@ -4,3 +4,3 @@\n a\n-b\n+B\n c\n\
@@ -20,2 +20,3 @@ impl Foo\n x\n+y\n z\n";
        let file = single_file(patch);
        assert_eq!(file.hunks.len(), 2);
        assert_eq!(file.hunks[0].collapsed_before, 3);
        // First hunk ends at new line 6.
        assert_eq!(file.hunks[1].collapsed_before, 13);
        assert_eq!(file.hunks[1].hunk_context.as_deref(), Some("impl Foo"));
        assert_eq!(file.hunks[1].split_line_start, 3 + 3 + 13);
        assert_eq!(file.hunks[1].unified_line_start, 3 + 4 + 13);
    }

    #[test]
    fn parses_git_patch_with_renames_and_modes() {
        let patch = "\
diff --git a/src/old.rs b/src/new.rs
similarity index 100%
rename from src/old.rs
rename to src/new.rs
diff --git a/src/edited.rs b/src/renamed.rs
similarity index 80%
rename from src/edited.rs
rename to src/renamed.rs
index 1111111..2222222 100644
--- a/src/edited.rs
+++ b/src/renamed.rs
@@ -1,2 +1,2 @@
-fn a() {}
+fn b() {}
 fn c() {}
diff --git a/added.txt b/added.txt
new file mode 100644
index 0000000..3333333
--- /dev/null
+++ b/added.txt
@@ -0,0 +1,2 @@
+hello
+world
diff --git a/gone.txt b/gone.txt
deleted file mode 100644
index 4444444..0000000
--- a/gone.txt
+++ /dev/null
@@ -1 +0,0 @@
-bye
diff --git a/run.sh b/run.sh
old mode 100644
new mode 100755
";
        let patches = parse_patch_files(patch, None);
        assert_eq!(patches.len(), 1);
        let files = &patches[0].files;
        assert_eq!(files.len(), 5);

        assert_eq!(files[0].name, "src/new.rs");
        assert_eq!(files[0].prev_name.as_deref(), Some("src/old.rs"));
        assert_eq!(files[0].change_type, ChangeType::RenamePure);

        assert_eq!(files[1].name, "src/renamed.rs");
        assert_eq!(files[1].prev_name.as_deref(), Some("src/edited.rs"));
        assert_eq!(files[1].change_type, ChangeType::RenameChanged);
        assert_eq!(files[1].new_mode.as_deref(), Some("100644"));

        assert_eq!(files[2].name, "added.txt");
        assert_eq!(files[2].change_type, ChangeType::New);
        assert_eq!(files[2].prev_name, None);
        assert_eq!(files[2].hunks[0].collapsed_before, 0);
        assert_eq!(files[2].hunks[0].addition_lines, 2);

        assert_eq!(files[3].name, "gone.txt");
        assert_eq!(files[3].change_type, ChangeType::Deleted);
        assert_eq!(files[3].hunks[0].deletion_lines, 1);
        assert_eq!(files[3].hunks[0].collapsed_before, 0);

        assert_eq!(files[4].name, "run.sh");
        assert_eq!(files[4].change_type, ChangeType::Change);
        assert_eq!(files[4].old_mode.as_deref(), Some("100644"));
        assert_eq!(files[4].new_mode.as_deref(), Some("100755"));
        assert!(files[4].hunks.is_empty());
    }

    #[test]
    fn plain_rename_heuristics() {
        let pure = "--- a/one.txt\n+++ b/two.txt\n";
        let file = single_file(pure);
        assert_eq!(file.change_type, ChangeType::RenamePure);
        assert_eq!(file.prev_name.as_deref(), Some("one.txt"));

        let changed = "--- a/one.txt\n+++ b/two.txt\n@@ -1 +1 @@\n-a\n+b\n";
        let file = single_file(changed);
        assert_eq!(file.change_type, ChangeType::RenameChanged);
        assert_eq!(file.name, "two.txt");
    }

    #[test]
    fn splits_format_patch_commits() {
        let patch = "\
From 0123456789abcdef0123456789abcdef01234567 Mon Sep 17 00:00:00 2001
From: Dev <dev@example.com>
Subject: [PATCH 1/2] first

---
diff --git a/a.txt b/a.txt
--- a/a.txt
+++ b/a.txt
@@ -1 +1 @@
-one
+uno
-- 
2.43.0

From fedcba9876543210fedcba9876543210fedcba98 Mon Sep 17 00:00:00 2001
From: Dev <dev@example.com>
Subject: [PATCH 2/2] second

---
diff --git a/b.txt b/b.txt
--- a/b.txt
+++ b/b.txt
@@ -1,2 +1 @@
 keep
-drop
";
        let patches = parse_patch_files(patch, Some("review"));
        assert_eq!(patches.len(), 2);
        assert!(
            patches[0]
                .patch_metadata
                .as_deref()
                .unwrap()
                .contains("Subject: [PATCH 1/2] first")
        );
        assert_eq!(patches[0].files.len(), 1);
        assert_eq!(patches[0].files[0].name, "a.txt");
        // The `-- ` signature after a complete hunk is not a deletion.
        assert_eq!(patches[0].files[0].hunks[0].deletion_lines, 1);
        assert_eq!(patches[0].files[0].cache_key.as_deref(), Some("review-0-0"));

        assert_eq!(patches[1].files[0].name, "b.txt");
        assert_eq!(patches[1].files[0].cache_key.as_deref(), Some("review-1-0"));
        let hunk = &patches[1].files[0].hunks[0];
        assert_eq!(hunk.addition_count, 1);
        assert_eq!(hunk.deletion_count, 2);
    }

    #[test]
    fn no_newline_marker_strips_preceding_line() {
        let patch = "--- a/f\n+++ b/f\n@@ -1,2 +1,2 @@\n a\n-b\n\\ No newline at end of file\n+c\n\\ No newline at end of file\n";
        let file = single_file(patch);
        let HunkContent::Change(change) = &file.hunks[0].hunk_content[1] else {
            panic!("expected change run");
        };
        assert_eq!(change.deletions, vec!["-b"]);
        assert_eq!(change.additions, vec!["+c"]);
        assert!(change.no_eof_newline_deletions);
        assert!(change.no_eof_newline_additions);
    }

    #[test]
    fn invalid_hunk_header_drops_only_that_hunk() {
        let patch = "--- a/f\n+++ b/f\n@@ -1,2 +1,2 @@\n a\n-b\n+c\n@@ -bogus @@\n-x\n+y\n@@ -10 +10 @@\n-p\n+q\n";
        let file = single_file(patch);
        assert_eq!(file.hunks.len(), 2);
        assert_eq!(file.hunks[1].deletion_start, 10);
    }

    #[test]
    fn deletion_resembling_file_header_stays_in_hunk() {
        let patch = "--- a/notes.md\n+++ b/notes.md\n@@ -1,2 +1,2 @@\n--- heading\n+++ heading\n same\n";
        let file = single_file(patch);
        assert_eq!(file.hunks.len(), 1);
        let HunkContent::Change(change) = &file.hunks[0].hunk_content[0] else {
            panic!("expected change run");
        };
        assert_eq!(change.deletions, vec!["--- heading\n"]);
        assert_eq!(change.additions, vec!["+++ heading\n"]);
    }

    #[test]
    fn stray_hunk_without_header_starts_file_record() {
        let patch = "@@ -1 +1 @@\n-a\n+b\n";
        let patches = parse_patch_files(patch, None);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].files.len(), 1);
        assert_eq!(patches[0].files[0].name, "");
        assert_eq!(patches[0].files[0].hunks.len(), 1);
    }

    #[test]
    fn separates_changes_split_by_context() {
        let patch = "--- a/f\n+++ b/f\n@@ -1,5 +1,4 @@\n-a\n+A\n b\n-c\n-d\n+C\n e\n";
        let file = single_file(patch);
        let hunk = &file.hunks[0];
        assert_eq!(hunk.hunk_content.len(), 4);
        assert_eq!(hunk.split_line_count, 1 + 1 + 2 + 1);
        assert_eq!(hunk.unified_line_count, 2 + 1 + 3 + 1);
    }

    #[test]
    fn malformed_file_block_skips_only_that_file() {
        let patch = "diff --git weird\n\
diff --git a/ok.txt b/ok.txt\n\
--- a/ok.txt\n\
+++ b/ok.txt\n\
@@ -1 +1 @@\n\
-old\n\
+new\n";
        let patches = parse_patch_files(patch, None);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].files.len(), 1);
        assert_eq!(patches[0].files[0].name, "ok.txt");
        assert_eq!(patches[0].files[0].hunks.len(), 1);
    }

    #[test]
    fn segment_with_only_malformed_files_is_skipped() {
        let patches = parse_patch_files("diff --git weird\n", None);
        assert!(patches.is_empty());
    }
}
