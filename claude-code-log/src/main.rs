//! claude-code-log - convert Claude Code transcripts to browsable HTML
//!
//! Points at a transcript file, a project directory, or the whole
//! `~/.claude/projects` hierarchy and produces linked HTML (or
//! Markdown) with incremental regeneration backed by a SQLite cache.

use anyhow::{Context, Result};
use clap::Parser;
use claude_code_log_core::config::{
    default_projects_dir, get_library_version, resolve_cache_db_path, Config, OutputFormat,
    RenderConfig,
};
use claude_code_log_core::converter::{
    convert_project, convert_project_uncached, convert_single_file, process_projects_hierarchy,
};
use claude_code_log_core::db::ProjectCache;
use claude_code_log_core::loader;
use claude_code_log_core::logging;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "claude-code-log")]
#[command(about = "Convert Claude Code transcript JSONL files to HTML")]
#[command(version)]
struct Args {
    /// Transcript file, project directory, or project path to convert.
    /// Defaults to ~/.claude/projects with --all-projects behavior.
    input_path: Option<PathBuf>,

    /// Output file path (single-file conversion only)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format: html or md
    #[arg(long, default_value = "html")]
    format: String,

    /// Only include messages from this date on (YYYY-MM-DD or
    /// "YYYY-MM-DD HH:MM:SS")
    #[arg(long)]
    from_date: Option<String>,

    /// Only include messages up to this date (inclusive)
    #[arg(long)]
    to_date: Option<String>,

    /// Process every project in the projects directory and write a
    /// linked index
    #[arg(long)]
    all_projects: bool,

    /// Skip generating individual session files
    #[arg(long)]
    no_individual_sessions: bool,

    /// Skip generating the combined transcript
    #[arg(long)]
    skip_combined: bool,

    /// Disable the cache and reprocess everything
    #[arg(long)]
    no_cache: bool,

    /// Clear cached data before processing
    #[arg(long)]
    clear_cache: bool,

    /// Remove generated output files before processing
    #[arg(long, alias = "clear-html")]
    clear_output: bool,

    /// Custom projects directory (default: ~/.claude/projects)
    #[arg(long)]
    projects_dir: Option<PathBuf>,

    /// Maximum messages per combined page; sessions are never split
    #[arg(long)]
    page_size: Option<usize>,

    /// Show token usage statistics in generated output
    #[arg(long)]
    show_stats: bool,
}

fn main() {
    if let Err(error) = run() {
        eprintln!("Error: {:#}", error);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let config_file = Config::load().context("failed to load configuration")?;
    let _log_guard = logging::init(&config_file.logging).ok();
    tracing::info!(version = get_library_version(), "claude-code-log starting");

    let format: OutputFormat = args
        .format
        .parse()
        .with_context(|| format!("unknown output format: {}", args.format))?;

    let render_config = RenderConfig {
        page_size: args.page_size.unwrap_or(config_file.render.page_size),
        show_stats: args.show_stats || config_file.render.show_stats,
        skip_individual_sessions: args.no_individual_sessions,
        skip_combined: args.skip_combined,
        date_from: args.from_date.clone(),
        date_to: args.to_date.clone(),
        ..Default::default()
    };

    let (input_path, all_projects) = match &args.input_path {
        Some(path) => (path.clone(), args.all_projects),
        None => (
            args.projects_dir.clone().unwrap_or_else(default_projects_dir),
            true,
        ),
    };

    if args.clear_cache {
        clear_caches(&input_path, all_projects)?;
        if !args.clear_output && args.from_date.is_none() && args.to_date.is_none() {
            println!("Cache cleared successfully.");
            return Ok(());
        }
    }
    if args.clear_output {
        clear_output_files(&input_path, all_projects, format)?;
        if args.from_date.is_none() && args.to_date.is_none() && !input_path.is_file() {
            println!("Output files cleared successfully.");
            return Ok(());
        }
    }

    if all_projects {
        if !input_path.exists() {
            anyhow::bail!("Projects directory not found: {}", input_path.display());
        }
        println!("Processing all projects in {}...", input_path.display());
        let outcome = process_projects_hierarchy(
            &input_path,
            format,
            &render_config,
            None,
            get_library_version(),
        )?;
        println!(
            "Successfully processed {} projects and created index at {}",
            outcome.projects_processed,
            outcome.index_path.display()
        );
        return Ok(());
    }

    // A plain project path converts to its dashed transcript directory
    // when it holds no transcripts itself.
    let mut input_path = input_path;
    let needs_mapping = !input_path.exists()
        || (input_path.is_dir()
            && loader::find_transcript_files(&input_path)
                .map(|files| files.is_empty())
                .unwrap_or(true));
    if needs_mapping {
        let mapped = project_path_to_transcript_dir(
            &input_path,
            args.projects_dir.as_deref(),
        );
        if mapped.exists() {
            println!(
                "Converting project path {} to {}",
                input_path.display(),
                mapped.display()
            );
            input_path = mapped;
        } else if !input_path.exists() {
            anyhow::bail!("Neither {} nor {} exists", input_path.display(), mapped.display());
        }
    }

    if input_path.is_file() {
        let output = convert_single_file(
            &input_path,
            args.output.as_deref(),
            format,
            &render_config,
        )?;
        println!(
            "Successfully converted {} to {}",
            input_path.display(),
            output.display()
        );
        return Ok(());
    }

    let jsonl_count = loader::find_transcript_files(&input_path)?.len();
    let output = if args.no_cache {
        convert_project_uncached(&input_path, format, &render_config)?
    } else {
        let cache = ProjectCache::open(&input_path, get_library_version(), None)?;
        let outcome = convert_project(&input_path, format, &render_config, &cache)?;
        if outcome.archived_session_count > 0 {
            println!(
                "Note: {} archived session(s) exist only in the cache.",
                outcome.archived_session_count
            );
        }
        outcome
            .output_path
            .unwrap_or_else(|| input_path.clone())
    };
    tracing::info!(
        project = %input_path.display(),
        files = jsonl_count,
        "Project conversion complete"
    );
    println!(
        "Successfully combined {} transcript files from {} to {}",
        jsonl_count,
        input_path.display(),
        output.display()
    );
    Ok(())
}

/// Map a real project path to its dashed directory under the projects
/// hierarchy, e.g. /home/me/dev/app -> ~/.claude/projects/-home-me-dev-app.
fn project_path_to_transcript_dir(input: &Path, projects_dir: Option<&Path>) -> PathBuf {
    let resolved = input.canonicalize().unwrap_or_else(|_| input.to_path_buf());
    let mut name = String::new();
    for component in resolved.components() {
        match component {
            std::path::Component::RootDir => {}
            other => {
                name.push('-');
                name.push_str(&other.as_os_str().to_string_lossy());
            }
        }
    }
    let base = projects_dir
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_projects_dir);
    base.join(name)
}

fn clear_caches(input_path: &Path, all_projects: bool) -> Result<()> {
    if all_projects {
        println!("Clearing caches for all projects...");
        let cache_db = resolve_cache_db_path(&input_path.join("project"), None);
        for suffix in ["", "-wal", "-shm"] {
            let path = PathBuf::from(format!("{}{}", cache_db.display(), suffix));
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("failed to delete {}", path.display()))?;
            }
        }
        println!("  Deleted cache database: {}", cache_db.display());
    } else if input_path.is_dir() {
        println!("Clearing cache for {}...", input_path.display());
        let cache = ProjectCache::open(input_path, get_library_version(), None)?;
        cache.clear_cache()?;
    } else {
        println!("Cache clearing not applicable for single files.");
    }
    Ok(())
}

fn clear_output_files(input_path: &Path, all_projects: bool, format: OutputFormat) -> Result<()> {
    let extension = format.extension();
    let mut removed = 0usize;

    let mut dirs: Vec<PathBuf> = Vec::new();
    if all_projects {
        for entry in std::fs::read_dir(input_path)? {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        let index = input_path.join(format!("index.{}", extension));
        if index.exists() {
            std::fs::remove_file(index)?;
            removed += 1;
        }
    } else if input_path.is_dir() {
        dirs.push(input_path.to_path_buf());
    }

    for dir in dirs {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            let generated = name == format!("index.{}", extension)
                || name.starts_with("session-")
                || name.starts_with("combined_transcripts");
            if generated && path.extension().and_then(|e| e.to_str()) == Some(extension) {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
    }

    if removed > 0 {
        println!("Removed {} generated files", removed);
    } else {
        println!("No generated files found to remove");
    }
    Ok(())
}
