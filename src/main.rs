//! patchlens command line entry point.
//!
//! Parses patches, diffs two files and prints highlighted rows.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use patchlens::application::render::{
    Columns, HunkRenderEngine, LineRecord, LineType, RenderOptions, RowElement,
};
use patchlens::domain::{
    DiffHighlightResult, DiffStyle, FileContents, FileDiffMetadata, HighlightedToken,
    TokenizeOptions,
};
use patchlens::infra::app_config::{AppConfig, config_path, load_config, save_config};
use patchlens::infra::diff::{parse_diff_from_file, parse_patch_files};
use patchlens::infra::highlight::{HighlighterCache, SyntectLoader, diff_languages};
use patchlens::infra::worker::{PoolOptions, WorkerPool};

#[derive(Parser, Debug)]
#[command(name = "patchlens")]
#[command(version)]
#[command(about = "Parse, highlight and render unified diffs", long_about = None)]
struct Args {
    /// Print plain text even when stdout is a terminal
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the parsed patch as JSON
    Parse {
        /// Patch file, or `-` for stdin
        patch: String,
        /// Prefix for per-file cache keys
        #[arg(long)]
        cache_key_prefix: Option<String>,
    },

    /// Diff two files and print the highlighted rows
    Diff {
        old: PathBuf,
        new: PathBuf,
        /// Side-by-side columns instead of unified rows
        #[arg(long)]
        split: bool,
        /// Highlight in-process instead of on the worker pool
        #[arg(long)]
        local: bool,
        /// Worker threads (overrides the config file)
        #[arg(long)]
        workers: Option<usize>,
        /// Show every unchanged line
        #[arg(long)]
        expand: bool,
    },

    /// Render every file of a patch
    Show {
        /// Patch file, or `-` for stdin
        patch: String,
        #[arg(long)]
        split: bool,
    },

    /// Print the active configuration
    Config {
        /// Write the active configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let config = load_config();
    let color = !args.no_color && std::io::stdout().is_terminal();

    match args.command {
        Commands::Parse {
            patch,
            cache_key_prefix,
        } => {
            let text = read_patch(&patch)?;
            let parsed = parse_patch_files(&text, cache_key_prefix.as_deref());
            let json =
                serde_json::to_string_pretty(&parsed).context("Failed to serialize patch")?;
            println!("{json}");
        }

        Commands::Diff {
            old,
            new,
            split,
            local,
            workers,
            expand,
        } => {
            let old_file = read_file(&old)?;
            let new_file = read_file(&new)?;
            let diff = parse_diff_from_file(&old_file, &new_file)
                .with_context(|| format!("Failed to diff {} and {}", old.display(), new.display()))?;

            let options = TokenizeOptions {
                theme: config.themes.clone(),
                ..Default::default()
            };
            let tokens = if local {
                highlight_local(&config, &diff, &options).await?
            } else {
                let mut pool_options = PoolOptions::from(&config);
                if let Some(workers) = workers {
                    pool_options.pool_size = workers.max(1);
                }
                highlight_pooled(&config, pool_options, old_file, new_file, options).await?
            };

            let mut render = RenderOptions::from(&config.render);
            render.expand_unchanged |= expand;
            render.diff_style = if split {
                DiffStyle::Split
            } else {
                DiffStyle::Unified
            };
            print_diff(&diff, render, Some(&tokens), color)?;
        }

        Commands::Show { patch, split } => {
            let text = read_patch(&patch)?;
            let mut render = RenderOptions::from(&config.render);
            render.diff_style = if split {
                DiffStyle::Split
            } else {
                DiffStyle::Unified
            };

            let cache = HighlighterCache::new(Arc::new(SyntectLoader::with_custom_themes(
                &config.custom_themes,
            )));
            let options = TokenizeOptions {
                theme: config.themes.clone(),
                ..Default::default()
            };
            for parsed in parse_patch_files(&text, None) {
                if let Some(metadata) = &parsed.patch_metadata {
                    println!("{}", metadata.trim_end());
                }
                for file in &parsed.files {
                    println!("=== {} ({:?})", file.name, file.change_type);
                    let tokens = match highlight_with(&cache, file, &options).await {
                        Ok(tokens) => Some(tokens),
                        Err(err) => {
                            log::warn!("Highlighting {} failed: {:#}", file.name, err);
                            None
                        }
                    };
                    print_diff(file, render.clone(), tokens.as_ref(), color)?;
                }
            }
            cache.dispose();
        }

        Commands::Config { save } => {
            let path = config_path();
            if save {
                save_config(&config)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                eprintln!("Wrote {}", path.display());
            }
            let rendered = toml::to_string_pretty(&config).context("Failed to serialize config")?;
            println!("# {}\n{rendered}", path.display());
        }
    }

    Ok(())
}

fn read_patch(source: &str) -> Result<String> {
    if source == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        return Ok(buffer);
    }
    std::fs::read_to_string(source).with_context(|| format!("Failed to read patch {source}"))
}

fn read_file(path: &Path) -> Result<FileContents> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(FileContents::new(path.to_string_lossy(), contents))
}

async fn highlight_local(
    config: &AppConfig,
    diff: &FileDiffMetadata,
    options: &TokenizeOptions,
) -> Result<DiffHighlightResult> {
    let cache = HighlighterCache::new(Arc::new(SyntectLoader::with_custom_themes(
        &config.custom_themes,
    )));
    let result = highlight_with(&cache, diff, options).await;
    cache.dispose();
    result
}

async fn highlight_with(
    cache: &HighlighterCache,
    diff: &FileDiffMetadata,
    options: &TokenizeOptions,
) -> Result<DiffHighlightResult> {
    let (old_lang, new_lang) = diff_languages(diff, options);
    let mut langs = vec![old_lang, new_lang];
    langs.dedup();
    let highlighter = cache
        .get_or_load(&options.theme, &langs)
        .await
        .context("Failed to load highlighter")?;
    highlighter
        .tokenize_diff(diff, options)
        .with_context(|| format!("Failed to tokenize {}", diff.name))
}

async fn highlight_pooled(
    config: &AppConfig,
    pool_options: PoolOptions,
    old_file: FileContents,
    new_file: FileContents,
    options: TokenizeOptions,
) -> Result<DiffHighlightResult> {
    let loader = Arc::new(SyntectLoader::with_custom_themes(&config.custom_themes));
    let pool = WorkerPool::with_loader(pool_options, loader);
    let result = async {
        pool.initialize()
            .await
            .context("Failed to start highlight workers")?;
        let result = pool
            .highlight_diff_files(old_file, new_file, options)
            .await
            .context("Highlight task failed")?;
        log::debug!("Pool stats: {:?}", pool.get_stats().await);
        anyhow::Ok(result)
    }
    .await;
    pool.terminate().await;
    result
}

fn print_diff(
    diff: &FileDiffMetadata,
    options: RenderOptions,
    tokens: Option<&DiffHighlightResult>,
    color: bool,
) -> Result<()> {
    let engine = HunkRenderEngine::new(options);
    let rendered = engine
        .render::<()>(diff, &[], tokens)
        .with_context(|| format!("Failed to render {}", diff.name))?;

    match rendered.columns {
        Columns::Unified(rows) => {
            for row in &rows {
                println!("{}", format_row(row, color));
            }
        }
        Columns::Split {
            deletions,
            additions,
        } => {
            let left: Vec<String> = expand_rows(&deletions, color);
            let right: Vec<String> = expand_rows(&additions, color);
            for (l, r) in left.iter().zip(right.iter()) {
                println!("{l}  \u{2502}  {r}");
            }
        }
    }
    Ok(())
}

/// One printed line per display row; buffers become blank lines.
fn expand_rows(rows: &[RowElement<()>], color: bool) -> Vec<String> {
    let mut out = Vec::new();
    for row in rows {
        match row {
            RowElement::Buffer { rows } => out.extend(std::iter::repeat_n(String::new(), *rows)),
            other => out.push(format_row(other, color)),
        }
    }
    out
}

fn format_row(row: &RowElement<()>, color: bool) -> String {
    match row {
        RowElement::Line(line) => format_line(line, color),
        RowElement::Buffer { .. } => String::new(),
        RowElement::Separator(separator) => match &separator.label {
            Some(label) => format!("\u{22ef} {label}"),
            None => "\u{22ef}".to_string(),
        },
    }
}

fn format_line(line: &LineRecord<()>, color: bool) -> String {
    let marker = match line.line_type {
        LineType::Addition => '+',
        LineType::Deletion => '-',
        LineType::Context | LineType::ContextExpanded => ' ',
    };
    let number = line
        .line_number()
        .map(|n| n.to_string())
        .unwrap_or_default();
    let body = match (&line.tokens, color) {
        (Some(tokens), true) => paint(tokens),
        _ => line.text.clone(),
    };
    format!("{number:>5} {marker} {body}")
}

fn paint(tokens: &[HighlightedToken]) -> String {
    let mut out = String::new();
    for token in tokens {
        match token.style.foreground.as_deref().and_then(parse_hex) {
            Some((r, g, b)) => {
                out.push_str(&format!("\x1b[38;2;{r};{g};{b}m{}\x1b[0m", token.text));
            }
            None => out.push_str(&token.text),
        }
    }
    out
}

fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.strip_prefix('#')?;
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}
