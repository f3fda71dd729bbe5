//! Artifact freshness decisions
//!
//! Decides which generated files must be rebuilt. Three artifact
//! classes: per-session output, the combined (possibly paginated)
//! output, and the project index. Decisions combine cache rows with
//! on-disk probes, including the generator-version comment every output
//! file embeds near its top. This module never mutates anything; the
//! converter acts on its answers.
//!
//! When the synchronizer reports that the cache changed this run, the
//! caller must treat everything as stale regardless of these checks,
//! since counts may not yet have propagated to every comparison path.

use crate::db::ProjectCache;
use crate::error::Result;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// How many leading lines of a generated file may hold the version
/// comment.
const VERSION_COMMENT_SCAN_LINES: usize = 5;

/// The machine-readable generator marker embedded in every output file.
pub fn version_marker(library_version: &str) -> String {
    format!("Generated by claude-code-log v{}", library_version)
}

/// Staleness verdict with the reason that tripped it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleCheck {
    pub stale: bool,
    pub reason: String,
}

impl StaleCheck {
    fn fresh() -> Self {
        Self {
            stale: false,
            reason: String::new(),
        }
    }

    fn stale(reason: &str) -> Self {
        Self {
            stale: true,
            reason: reason.to_string(),
        }
    }
}

/// True iff the file exists and carries the current version marker
/// within its first few lines.
pub fn file_has_current_version(path: &Path, library_version: &str) -> bool {
    let Ok(file) = std::fs::File::open(path) else {
        return false;
    };
    let marker = version_marker(library_version);
    let reader = BufReader::new(file);
    for line in reader.lines().take(VERSION_COMMENT_SCAN_LINES) {
        match line {
            Ok(line) if line.contains(&marker) => return true,
            Ok(_) => continue,
            Err(_) => return false,
        }
    }
    false
}

/// Per-session output staleness.
pub fn is_session_output_stale(
    cache: &ProjectCache,
    project_dir: &Path,
    session_id: &str,
    output_name: &str,
) -> Result<StaleCheck> {
    let Some(row) = cache.get_html_cache(output_name)? else {
        return Ok(StaleCheck::stale("no_cache_entry"));
    };
    if row.library_version != cache.library_version {
        return Ok(StaleCheck::stale("version_mismatch"));
    }

    let path = project_dir.join(output_name);
    if !path.exists() {
        return Ok(StaleCheck::stale("file_missing"));
    }
    if !file_has_current_version(&path, &cache.library_version) {
        return Ok(StaleCheck::stale("file_version_mismatch"));
    }

    let current_count = cache.session_message_count(session_id)?;
    if row.message_count != current_count {
        return Ok(StaleCheck::stale("message_count_changed"));
    }
    Ok(StaleCheck::fresh())
}

/// Combined single-page output staleness, compared against the
/// project's total message count.
pub fn is_combined_output_stale(
    cache: &ProjectCache,
    project_dir: &Path,
    output_name: &str,
    total_message_count: i64,
) -> Result<StaleCheck> {
    let Some(row) = cache.get_html_cache(output_name)? else {
        return Ok(StaleCheck::stale("no_cache_entry"));
    };
    if row.library_version != cache.library_version {
        return Ok(StaleCheck::stale("version_mismatch"));
    }

    let path = project_dir.join(output_name);
    if !path.exists() {
        return Ok(StaleCheck::stale("file_missing"));
    }
    if !file_has_current_version(&path, &cache.library_version) {
        return Ok(StaleCheck::stale("file_version_mismatch"));
    }

    if row.message_count != total_message_count {
        return Ok(StaleCheck::stale("message_count_changed"));
    }
    Ok(StaleCheck::fresh())
}

/// Per-page staleness for a paginated project. Each page is judged
/// independently.
pub fn is_page_stale(
    cache: &ProjectCache,
    project_dir: &Path,
    page_number: i64,
    page_size: usize,
) -> Result<StaleCheck> {
    let Some(page) = cache.get_page(page_number)? else {
        return Ok(StaleCheck::stale("no_cache_entry"));
    };
    if page.page_size_config != page_size as i64 {
        return Ok(StaleCheck::stale("page_size_changed"));
    }
    if page.library_version != cache.library_version {
        return Ok(StaleCheck::stale("version_mismatch"));
    }

    let path = project_dir.join(&page.output_path);
    if !path.exists() {
        return Ok(StaleCheck::stale("file_missing"));
    }
    if !file_has_current_version(&path, &cache.library_version) {
        return Ok(StaleCheck::stale("file_version_mismatch"));
    }

    let sessions = cache.get_cached_project_data()?.sessions;
    let mut message_count = 0i64;
    let mut max_last_timestamp: Option<String> = None;
    for session_id in &page.session_ids {
        let Some(session) = sessions.get(session_id) else {
            return Ok(StaleCheck::stale("session_missing"));
        };
        message_count += session.message_count;
        if let Some(last) = &session.last_timestamp {
            let later = max_last_timestamp
                .as_ref()
                .map(|current| last > current)
                .unwrap_or(true);
            if later {
                max_last_timestamp = Some(last.clone());
            }
        }
    }
    if message_count != page.message_count {
        return Ok(StaleCheck::stale("message_count_changed"));
    }
    if max_last_timestamp != page.last_timestamp {
        return Ok(StaleCheck::stale("timestamp_changed"));
    }
    Ok(StaleCheck::fresh())
}

/// Project index staleness: the index file only depends on the
/// generator version.
pub fn is_index_stale(index_path: &Path, library_version: &str) -> bool {
    !index_path.exists() || !file_has_current_version(index_path, library_version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{PageCacheData, SessionCacheData};
    use tempfile::TempDir;

    fn setup() -> (TempDir, std::path::PathBuf, ProjectCache) {
        let tmp = TempDir::new().unwrap();
        let project_dir = tmp.path().join("project");
        std::fs::create_dir(&project_dir).unwrap();
        let db_path = tmp.path().join("cache.db");
        let cache = ProjectCache::open(&project_dir, "1.0.0-test", Some(&db_path)).unwrap();
        (tmp, project_dir, cache)
    }

    fn write_output(dir: &Path, name: &str, version: &str) {
        std::fs::write(
            dir.join(name),
            format!(
                "<!DOCTYPE html>\n<!-- {} -->\n<html></html>\n",
                version_marker(version)
            ),
        )
        .unwrap();
    }

    #[test]
    fn test_version_marker_detection() {
        let tmp = TempDir::new().unwrap();
        write_output(tmp.path(), "a.html", "1.0.0-test");
        assert!(file_has_current_version(
            &tmp.path().join("a.html"),
            "1.0.0-test"
        ));
        assert!(!file_has_current_version(
            &tmp.path().join("a.html"),
            "2.0.0"
        ));
        assert!(!file_has_current_version(&tmp.path().join("nope.html"), "1.0.0-test"));
    }

    #[test]
    fn test_session_output_staleness_progression() {
        let (_tmp, project_dir, cache) = setup();
        let name = "session-s1.html";

        // No cache row yet.
        let check = is_session_output_stale(&cache, &project_dir, "s1", name).unwrap();
        assert!(check.stale);
        assert_eq!(check.reason, "no_cache_entry");

        // Row exists but file missing.
        cache.update_html_cache(name, Some("s1"), 0).unwrap();
        let check = is_session_output_stale(&cache, &project_dir, "s1", name).unwrap();
        assert_eq!(check.reason, "file_missing");

        // File exists with current marker and matching count: fresh.
        write_output(&project_dir, name, "1.0.0-test");
        let check = is_session_output_stale(&cache, &project_dir, "s1", name).unwrap();
        assert!(!check.stale);

        // Stale version comment in the file.
        write_output(&project_dir, name, "0.0.1");
        let check = is_session_output_stale(&cache, &project_dir, "s1", name).unwrap();
        assert_eq!(check.reason, "file_version_mismatch");
    }

    #[test]
    fn test_page_staleness_checks() {
        let (_tmp, project_dir, cache) = setup();
        cache
            .update_session_cache(&[SessionCacheData {
                session_id: "s1".to_string(),
                message_count: 10,
                last_timestamp: Some("2023-01-01T10:00:00Z".to_string()),
                ..Default::default()
            }])
            .unwrap();
        cache
            .update_page_cache(&PageCacheData {
                page_number: 1,
                output_path: "combined_transcripts.html".to_string(),
                page_size_config: 50,
                message_count: 10,
                session_count: 1,
                last_timestamp: Some("2023-01-01T10:00:00Z".to_string()),
                session_ids: vec!["s1".to_string()],
                ..Default::default()
            })
            .unwrap();
        write_output(&project_dir, "combined_transcripts.html", "1.0.0-test");

        let check = is_page_stale(&cache, &project_dir, 1, 50).unwrap();
        assert!(!check.stale, "unexpected reason: {}", check.reason);

        // Page-size change invalidates.
        let check = is_page_stale(&cache, &project_dir, 1, 100).unwrap();
        assert_eq!(check.reason, "page_size_changed");

        // Message-count drift invalidates.
        cache
            .update_session_cache(&[SessionCacheData {
                session_id: "s1".to_string(),
                message_count: 12,
                last_timestamp: Some("2023-01-01T10:00:00Z".to_string()),
                ..Default::default()
            }])
            .unwrap();
        let check = is_page_stale(&cache, &project_dir, 1, 50).unwrap();
        assert_eq!(check.reason, "message_count_changed");

        // A referenced session disappearing invalidates.
        cache.delete_session("s1").unwrap();
        let check = is_page_stale(&cache, &project_dir, 1, 50).unwrap();
        assert!(check.stale);
    }

    #[test]
    fn test_index_staleness() {
        let (_tmp, project_dir, _cache) = setup();
        let index = project_dir.join("index.html");
        assert!(is_index_stale(&index, "1.0.0-test"));
        write_output(&project_dir, "index.html", "1.0.0-test");
        assert!(!is_index_stale(&index, "1.0.0-test"));
        write_output(&project_dir, "index.html", "0.9.0");
        assert!(is_index_stale(&index, "1.0.0-test"));
    }
}
