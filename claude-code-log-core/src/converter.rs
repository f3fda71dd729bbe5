//! Conversion driver
//!
//! Wires the pipeline together for one project or a whole projects
//! directory: synchronize the cache, build the message tree, ask the
//! freshness engine what is stale, paginate when the project outgrows
//! one page, render, and write. Within one project the order is fixed:
//! synchronizer, builder, freshness, paginator, renderer.

use crate::config::{OutputFormat, RenderConfig};
use crate::db::repo::PageCacheData;
use crate::db::ProjectCache;
use crate::error::Result;
use crate::freshness::{
    is_combined_output_stale, is_index_stale, is_page_stale, is_session_output_stale,
};
use crate::loader;
use crate::pagination::{
    assign_sessions_to_pages, enable_next_link_on_previous_page, page_output_path,
};
use crate::render::{get_renderer, PageNav, ProjectIndexEntry, RenderOptions, Renderer};
use crate::sync;
use crate::timeutil::{canonicalize_from_bound, canonicalize_to_bound, format_timestamp_range};
use crate::transcript::{build_message_tree, format_token_parts};
use crate::types::ParsedRecord;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// What one project conversion produced.
#[derive(Debug, Default)]
pub struct ConvertOutcome {
    /// Primary output file (combined page 1 when generated)
    pub output_path: Option<PathBuf>,
    /// Individual session files written this run
    pub sessions_generated: usize,
    /// Combined pages written this run
    pub pages_generated: usize,
    /// Sessions in cache with no surviving source file
    pub archived_session_count: usize,
    /// Whether the cache ingested anything this run
    pub cache_updated: bool,
}

fn render_options(config: &RenderConfig) -> RenderOptions {
    RenderOptions {
        show_stats: config.show_stats,
        image_export_mode: config.image_export_mode,
        page_nav: None,
    }
}

fn canonical_bounds(config: &RenderConfig) -> (Option<String>, Option<String>) {
    let from = config
        .date_from
        .as_deref()
        .and_then(canonicalize_from_bound);
    let to = config.date_to.as_deref().and_then(canonicalize_to_bound);
    (from, to)
}

/// Human-readable project name: prefer the least-nested, most recent
/// working directory; fall back to decoding the dashed directory name.
pub fn project_display_name(dir_name: &str, working_directories: &[String]) -> String {
    if let Some(first) = working_directories.first() {
        let mut best = first.as_str();
        let mut best_depth = Path::new(first).components().count();
        for dir in working_directories {
            let depth = Path::new(dir).components().count();
            if depth < best_depth {
                best = dir;
                best_depth = depth;
            }
        }
        if let Some(name) = Path::new(best).file_name().and_then(|n| n.to_str()) {
            return name.to_string();
        }
    }
    match dir_name.strip_prefix('-') {
        Some(stripped) => stripped.replace('-', "/"),
        None => dir_name.to_string(),
    }
}

/// Convert one project directory, using the cache for incremental
/// regeneration.
pub fn convert_project(
    project_dir: &Path,
    format: OutputFormat,
    config: &RenderConfig,
    cache: &ProjectCache,
) -> Result<ConvertOutcome> {
    let renderer = get_renderer(format);
    let extension = renderer.file_extension();
    let mut outcome = ConvertOutcome::default();

    let sync_outcome = sync::ensure_fresh_cache(project_dir, cache)?;
    outcome.cache_updated = sync_outcome.updated;
    // A cache update forces regeneration: counts may not yet have
    // propagated to every comparison the freshness engine makes.
    let force = sync_outcome.updated;

    outcome.archived_session_count = sync::archived_sessions(cache)?.len();
    if outcome.archived_session_count > 0 {
        tracing::info!(
            project = %project_dir.display(),
            count = outcome.archived_session_count,
            "Archived sessions present in cache"
        );
    }

    let (from, to) = canonical_bounds(config);
    let cache_data = cache.get_cached_project_data()?;
    let dir_name = project_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("project");
    let display_name =
        project_display_name(dir_name, &cache.get_working_directories()?);

    // Individual session pages.
    if !config.skip_individual_sessions {
        for session in cache_data.sessions.values() {
            let session_id = &session.session_id;
            let output_name = format!("session-{}.{}", session_id, extension);

            if !force {
                let check = is_session_output_stale(cache, project_dir, session_id, &output_name)?;
                if !check.stale {
                    continue;
                }
            }

            let entries = cache.load_session_entries(session_id)?;
            let tree = build_message_tree(&entries);
            if tree.roots.is_empty() {
                continue;
            }

            let short_id: String = session_id.chars().take(8).collect();
            let title = format!("{} - Session {}", display_name, short_id);
            let rendered =
                renderer.generate_session(&tree, session_id, &title, &render_options(config));
            std::fs::write(project_dir.join(&output_name), rendered)?;
            cache.update_html_cache(
                &output_name,
                Some(session_id),
                cache.session_message_count(session_id)?,
            )?;
            outcome.sessions_generated += 1;
        }
    }

    // Combined transcript, paginated when the project outgrows one page.
    if !config.skip_combined {
        let records = cache.load_project_entries(from.as_deref(), to.as_deref())?;
        let title = format!("Claude Code Transcripts - {}", display_name);
        let total_message_count: i64 = cache_data
            .sessions
            .values()
            .map(|s| s.message_count)
            .sum();

        if total_message_count > config.page_size as i64 {
            outcome.pages_generated = generate_paginated(
                project_dir,
                renderer.as_ref(),
                config,
                cache,
                &records,
                &title,
                force,
            )?;
        } else {
            // Dropping back to a single page invalidates any leftover
            // paginated output.
            if cache.get_page_count()? > 0 {
                for stale_path in cache.invalidate_all_pages()? {
                    let path = project_dir.join(&stale_path);
                    if path.exists() && stale_path != page_output_path(1, extension) {
                        std::fs::remove_file(path)?;
                    }
                }
            }

            let output_name = page_output_path(1, extension);
            let stale = force
                || is_combined_output_stale(cache, project_dir, &output_name, total_message_count)?
                    .stale;
            if stale {
                let tree = build_message_tree(&records);
                let rendered = renderer.generate(&tree, &title, &render_options(config));
                std::fs::write(project_dir.join(&output_name), rendered)?;
                cache.update_html_cache(&output_name, None, total_message_count)?;
                outcome.pages_generated = 1;
            }
        }
        outcome.output_path = Some(project_dir.join(page_output_path(1, extension)));
    }

    Ok(outcome)
}

#[allow(clippy::too_many_arguments)]
fn generate_paginated(
    project_dir: &Path,
    renderer: &dyn Renderer,
    config: &RenderConfig,
    cache: &ProjectCache,
    records: &[ParsedRecord],
    title: &str,
    force: bool,
) -> Result<usize> {
    let extension = renderer.file_extension();

    // A page-size change invalidates every page.
    let mut force = force;
    if let Some(previous_size) = cache.get_page_size_config()? {
        if previous_size != config.page_size as i64 {
            tracing::info!(
                previous_size,
                new_size = config.page_size,
                "Page size changed; regenerating all pages"
            );
            for stale_path in cache.invalidate_all_pages()? {
                let path = project_dir.join(stale_path);
                if path.exists() {
                    std::fs::remove_file(path)?;
                }
            }
            force = true;
        }
    }

    let sessions = cache.get_sessions()?;
    let assignments = assign_sessions_to_pages(&sessions, config.page_size);
    let total_pages = assignments.len() as i64;
    let mut generated = 0;

    for assignment in &assignments {
        let page_number = assignment.page_number;
        let stale = force
            || is_page_stale(cache, project_dir, page_number, config.page_size)?.stale;
        if !stale {
            continue;
        }

        let page_session_ids: HashSet<&str> =
            assignment.session_ids.iter().map(String::as_str).collect();
        let page_records: Vec<ParsedRecord> = records
            .iter()
            .filter(|entry| {
                entry
                    .record
                    .session_id()
                    .map(|sid| page_session_ids.contains(sid))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        let tree = build_message_tree(&page_records);

        let mut options = render_options(config);
        options.page_nav = Some(PageNav {
            page_number,
            is_last: page_number == total_pages,
            previous_path: (page_number > 1)
                .then(|| page_output_path(page_number - 1, extension)),
            // The last page keeps a real successor href under its hidden
            // next link, so the sentinel patch alone can reveal it when
            // that page comes into existence.
            next_path: Some(page_output_path(page_number + 1, extension)),
        });

        let page_title = if page_number > 1 {
            format!("{} (page {})", title, page_number)
        } else {
            title.to_string()
        };
        let rendered = renderer.generate(&tree, &page_title, &options);
        let output_name = page_output_path(page_number, extension);
        std::fs::write(project_dir.join(&output_name), rendered)?;

        cache.update_page_cache(&PageCacheData {
            page_number,
            output_path: output_name,
            page_size_config: config.page_size as i64,
            message_count: assignment.message_count,
            session_count: assignment.session_ids.len() as i64,
            first_timestamp: assignment.first_timestamp.clone(),
            last_timestamp: assignment.last_timestamp.clone(),
            first_session_id: assignment.first_session_id().map(|s| s.to_string()),
            last_session_id: assignment.last_session_id().map(|s| s.to_string()),
            session_ids: assignment.session_ids.clone(),
            generated_at: String::new(),
            library_version: cache.library_version.clone(),
        })?;
        generated += 1;

        // The predecessor was written believing it was last; unhide its
        // next link in place.
        if page_number > 1 {
            enable_next_link_on_previous_page(project_dir, page_number - 1, extension)?;
        }
    }

    Ok(generated)
}

/// Convert a single transcript file without cache involvement.
/// Sidechain siblings are merged in. Returns the output path.
pub fn convert_single_file(
    input: &Path,
    output: Option<&Path>,
    format: OutputFormat,
    config: &RenderConfig,
) -> Result<PathBuf> {
    let renderer = get_renderer(format);
    let output_path = match output {
        Some(path) => path.to_path_buf(),
        None => input.with_extension(renderer.file_extension()),
    };

    let loaded = loader::load_transcript_with_sidechains(input)?;
    let mut records = loaded.records;
    sort_records_chronologically(&mut records);
    let records = apply_date_bounds(records, config);

    let tree = build_message_tree(&records);
    let title = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("transcript")
        .to_string();
    let rendered = renderer.generate(&tree, &title, &render_options(config));
    std::fs::write(&output_path, rendered)?;
    Ok(output_path)
}

/// Convert a project directory without the cache: every file is loaded
/// and everything regenerates.
pub fn convert_project_uncached(
    project_dir: &Path,
    format: OutputFormat,
    config: &RenderConfig,
) -> Result<PathBuf> {
    let renderer = get_renderer(format);
    let extension = renderer.file_extension();

    let mut records = Vec::new();
    for file in loader::find_transcript_files(project_dir)? {
        match loader::load_transcript_file(&file) {
            Ok(mut loaded) => records.append(&mut loaded.records),
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "Skipping unreadable transcript file");
            }
        }
    }
    sort_records_chronologically(&mut records);
    let records = apply_date_bounds(records, config);

    let dir_name = project_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("project");
    let title = format!(
        "Claude Code Transcripts - {}",
        project_display_name(dir_name, &[])
    );

    let tree = build_message_tree(&records);

    if !config.skip_individual_sessions {
        let session_ids: Vec<String> =
            tree.session_nav.iter().map(|nav| nav.id.clone()).collect();
        for session_id in session_ids {
            let session_records: Vec<ParsedRecord> = records
                .iter()
                .filter(|entry| entry.record.session_id() == Some(session_id.as_str()))
                .cloned()
                .collect();
            let session_tree = build_message_tree(&session_records);
            if session_tree.roots.is_empty() {
                continue;
            }
            let rendered = renderer.generate_session(
                &session_tree,
                &session_id,
                &format!("Session {}", session_id),
                &render_options(config),
            );
            std::fs::write(
                project_dir.join(format!("session-{}.{}", session_id, extension)),
                rendered,
            )?;
        }
    }

    let output_path = project_dir.join(page_output_path(1, extension));
    if !config.skip_combined {
        let rendered = renderer.generate(&tree, &title, &render_options(config));
        std::fs::write(&output_path, rendered)?;
    }
    Ok(output_path)
}

fn sort_records_chronologically(records: &mut [ParsedRecord]) {
    // Canonical keys compare chronologically even when the raw strings
    // mix timezone offsets. The sort is stable, so records without
    // timestamps keep their file order at the front.
    records.sort_by_key(|entry| {
        entry
            .record
            .timestamp()
            .and_then(crate::timeutil::canonicalize_timestamp)
            .unwrap_or_default()
    });
}

fn apply_date_bounds(records: Vec<ParsedRecord>, config: &RenderConfig) -> Vec<ParsedRecord> {
    let (from, to) = canonical_bounds(config);
    if from.is_none() && to.is_none() {
        return records;
    }
    records
        .into_iter()
        .filter(|entry| {
            let Some(canonical) = entry
                .record
                .timestamp()
                .and_then(crate::timeutil::canonicalize_timestamp)
            else {
                // Records without timestamps (summaries) pass through.
                return true;
            };
            if let Some(from) = &from {
                if canonical < *from {
                    return false;
                }
            }
            if let Some(to) = &to {
                if canonical > *to {
                    return false;
                }
            }
            true
        })
        .collect()
}

// ============================================
// Projects hierarchy
// ============================================

/// Result of processing every project under a projects directory.
#[derive(Debug, Default)]
pub struct HierarchyOutcome {
    pub index_path: PathBuf,
    pub projects_processed: usize,
}

/// Process each project subdirectory that holds transcript files, then
/// write the cross-project index at the root.
pub fn process_projects_hierarchy(
    projects_dir: &Path,
    format: OutputFormat,
    config: &RenderConfig,
    db_path: Option<&Path>,
    library_version: &str,
) -> Result<HierarchyOutcome> {
    let renderer = get_renderer(format);
    let extension = renderer.file_extension();

    let mut project_dirs: Vec<PathBuf> = std::fs::read_dir(projects_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_dir()
                && loader::find_transcript_files(path)
                    .map(|files| !files.is_empty())
                    .unwrap_or(false)
        })
        .collect();
    project_dirs.sort();

    let mut entries = Vec::new();
    let mut any_updated = false;

    for project_dir in &project_dirs {
        let cache = ProjectCache::open(project_dir, library_version, db_path)?;
        let outcome = convert_project(project_dir, format, config, &cache)?;
        any_updated |= outcome.cache_updated || outcome.pages_generated > 0;

        let cache_data = cache.get_cached_project_data()?;
        let working_directories = cache.get_working_directories()?;
        let dir_name = project_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("project");

        let time_range = format_timestamp_range(
            cache_data.earliest_timestamp.as_deref().unwrap_or(""),
            cache_data.latest_timestamp.as_deref().unwrap_or(""),
        );
        let token_summary = format_token_parts(
            cache_data.total_input_tokens,
            cache_data.total_output_tokens,
            cache_data.total_cache_creation_tokens,
            cache_data.total_cache_read_tokens,
        )
        .unwrap_or_default();

        entries.push(ProjectIndexEntry {
            display_name: project_display_name(dir_name, &working_directories),
            output_file: format!("{}/{}", dir_name, page_output_path(1, extension)),
            jsonl_count: loader::find_transcript_files(project_dir)?.len(),
            message_count: cache_data.total_message_count,
            session_count: cache_data.sessions.len(),
            time_range,
            token_summary,
        });
    }

    let index_path = projects_dir.join(format!("index.{}", extension));
    if any_updated || is_index_stale(&index_path, library_version) {
        let rendered = renderer.generate_projects_index(&entries, "Claude Code Projects");
        std::fs::write(&index_path, rendered)?;
    }

    Ok(HierarchyOutcome {
        index_path,
        projects_processed: project_dirs.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_display_name_prefers_working_directory() {
        let name = project_display_name(
            "-home-dev-myproject",
            &["/home/dev/myproject".to_string(), "/home/dev/myproject/sub".to_string()],
        );
        assert_eq!(name, "myproject");
    }

    #[test]
    fn test_project_display_name_decodes_dashes() {
        assert_eq!(
            project_display_name("-home-dev-myproject", &[]),
            "home/dev/myproject"
        );
        assert_eq!(project_display_name("plain", &[]), "plain");
    }
}
