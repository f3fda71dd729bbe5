//! Cache synchronization
//!
//! Reconciles the cache store with the transcript files on disk for one
//! project: stale files re-ingest through the loader, then session and
//! project aggregates are recomputed from the cached records.

use crate::db::{ProjectCache, SessionCacheData};
use crate::db::repo::ProjectAggregates;
use crate::error::Result;
use crate::loader;
use crate::transcript::{
    attach_session_summaries, collect_sessions, deduplicate_records, filter_records,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Result of one synchronization run.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// True iff any ingest took place; downstream artifacts must then be
    /// re-derived.
    pub updated: bool,
    /// Files re-ingested this run
    pub files_processed: usize,
    /// Files whose cache entries were already fresh
    pub files_skipped: usize,
    /// Records ingested this run
    pub messages_ingested: usize,
    /// Parse warnings accumulated across files
    pub warnings: Vec<String>,
    /// Unreadable files, skipped with their error
    pub errors: Vec<(PathBuf, String)>,
}

/// Bring the cache in lockstep with the project directory's transcript
/// files. Returns whether anything was ingested.
pub fn ensure_fresh_cache(project_dir: &Path, cache: &ProjectCache) -> Result<SyncOutcome> {
    let mut outcome = SyncOutcome::default();
    let files = loader::find_transcript_files(project_dir)?;

    for file in &files {
        if cache.is_file_cached(file) {
            outcome.files_skipped += 1;
            continue;
        }

        let loaded = match loader::load_transcript_file(file) {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "Skipping unreadable transcript file");
                outcome.errors.push((file.clone(), e.to_string()));
                continue;
            }
        };

        let record_count = loaded.records.len();
        outcome.warnings.extend(loaded.warnings);
        outcome.messages_ingested += record_count;
        cache.save_cached_entries(file, &loaded.records)?;
        outcome.files_processed += 1;

        tracing::debug!(
            file = %file.display(),
            records = record_count,
            "Ingested transcript file"
        );
    }

    outcome.updated = outcome.files_processed > 0;
    if outcome.updated {
        recompute_aggregates(cache)?;
        tracing::info!(
            project = %project_dir.display(),
            files_processed = outcome.files_processed,
            messages = outcome.messages_ingested,
            "Cache updated"
        );
    }

    Ok(outcome)
}

/// Recompute session rows and project-wide counters from the cached
/// records. Sessions no longer present in any file keep their rows;
/// that is what archiving means.
pub fn recompute_aggregates(cache: &ProjectCache) -> Result<()> {
    let records = cache.load_project_entries(None, None)?;
    let records = deduplicate_records(records);
    let summaries = attach_session_summaries(&records);
    let filtered = filter_records(&records);
    let collection = collect_sessions(&filtered, &summaries);

    cache.update_session_cache(&collection.sessions)?;

    let mut aggregates = ProjectAggregates::default();
    for session in &collection.sessions {
        aggregates.total_message_count += session.message_count;
        aggregates.total_input_tokens += session.total_input_tokens;
        aggregates.total_output_tokens += session.total_output_tokens;
        aggregates.total_cache_creation_tokens += session.total_cache_creation_tokens;
        aggregates.total_cache_read_tokens += session.total_cache_read_tokens;

        if let Some(first) = &session.first_timestamp {
            let earlier = aggregates
                .earliest_timestamp
                .as_ref()
                .map(|current| first < current)
                .unwrap_or(true);
            if earlier {
                aggregates.earliest_timestamp = Some(first.clone());
            }
        }
        if let Some(last) = &session.last_timestamp {
            let later = aggregates
                .latest_timestamp
                .as_ref()
                .map(|current| last > current)
                .unwrap_or(true);
            if later {
                aggregates.latest_timestamp = Some(last.clone());
            }
        }
    }
    cache.update_project_aggregates(&aggregates)?;
    Ok(())
}

/// Session ids still backed by a source file on disk. The complement of
/// this set over the cached sessions is the archived set.
pub fn valid_session_ids(cache: &ProjectCache) -> Result<HashSet<String>> {
    let mut valid = HashSet::new();
    for (file_name, file_path) in cache.get_cached_files()? {
        if Path::new(&file_path).exists() {
            valid.extend(cache.file_session_ids(&file_name)?);
        }
    }
    Ok(valid)
}

/// Cached sessions whose source files are gone.
pub fn archived_sessions(cache: &ProjectCache) -> Result<Vec<SessionCacheData>> {
    let valid = valid_session_ids(cache)?;
    cache.get_archived_sessions(&valid)
}

/// Reconstitute an archived session as a JSONL file in `dest_dir`.
/// Returns the written path.
pub fn export_archived_session(
    cache: &ProjectCache,
    session_id: &str,
    dest_dir: &Path,
) -> Result<PathBuf> {
    let lines = cache.export_session_to_jsonl(session_id)?;
    let path = dest_dir.join(format!("{}.jsonl", session_id));
    let mut body = lines.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    std::fs::write(&path, body)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_session_file(dir: &Path, name: &str, session: &str) {
        let lines = format!(
            concat!(
                r#"{{"type":"user","sessionId":"{sid}","uuid":"{sid}-u1","timestamp":"2023-01-01T10:00:00Z","cwd":"/work","message":{{"role":"user","content":[{{"type":"text","text":"Hello"}}]}}}}"#,
                "\n",
                r#"{{"type":"assistant","sessionId":"{sid}","uuid":"{sid}-a1","timestamp":"2023-01-01T10:01:00Z","requestId":"{sid}-r1","message":{{"role":"assistant","content":[{{"type":"text","text":"Hi"}}],"usage":{{"input_tokens":10,"output_tokens":20}}}}}}"#,
                "\n",
            ),
            sid = session
        );
        std::fs::write(dir.join(name), lines).unwrap();
    }

    fn setup() -> (TempDir, PathBuf, ProjectCache) {
        let tmp = TempDir::new().unwrap();
        let project_dir = tmp.path().join("project");
        std::fs::create_dir(&project_dir).unwrap();
        let db_path = tmp.path().join("cache.db");
        let cache = ProjectCache::open(&project_dir, "1.0.0-test", Some(&db_path)).unwrap();
        (tmp, project_dir, cache)
    }

    #[test]
    fn test_fresh_ingest_then_noop() {
        let (_tmp, project_dir, cache) = setup();
        write_session_file(&project_dir, "s1.jsonl", "session-1");

        let first = ensure_fresh_cache(&project_dir, &cache).unwrap();
        assert!(first.updated);
        assert_eq!(first.files_processed, 1);
        assert_eq!(first.messages_ingested, 2);

        // Unchanged input: the second run ingests nothing.
        let second = ensure_fresh_cache(&project_dir, &cache).unwrap();
        assert!(!second.updated);
        assert_eq!(second.files_skipped, 1);
    }

    #[test]
    fn test_aggregates_recomputed() {
        let (_tmp, project_dir, cache) = setup();
        write_session_file(&project_dir, "s1.jsonl", "session-1");
        ensure_fresh_cache(&project_dir, &cache).unwrap();

        let data = cache.get_cached_project_data().unwrap();
        let session = data.sessions.get("session-1").unwrap();
        assert_eq!(session.total_input_tokens, 10);
        assert_eq!(session.total_output_tokens, 20);
        assert_eq!(session.cwd.as_deref(), Some("/work"));
        assert_eq!(data.total_input_tokens, 10);
        assert_eq!(data.total_output_tokens, 20);
        assert_eq!(
            data.earliest_timestamp.as_deref(),
            Some("2023-01-01T10:00:00Z")
        );
        assert_eq!(
            data.latest_timestamp.as_deref(),
            Some("2023-01-01T10:01:00Z")
        );
    }

    #[test]
    fn test_archive_and_restore_roundtrip() {
        let (_tmp, project_dir, cache) = setup();
        write_session_file(&project_dir, "s1.jsonl", "session-1");
        ensure_fresh_cache(&project_dir, &cache).unwrap();

        let before = cache.get_cached_project_data().unwrap();
        let count_before = before.sessions.get("session-1").unwrap().message_count;

        // Delete the source; the session becomes archived.
        std::fs::remove_file(project_dir.join("s1.jsonl")).unwrap();
        let archived = archived_sessions(&cache).unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].session_id, "session-1");

        // Reconstitute and re-ingest.
        let restored = export_archived_session(&cache, "session-1", &project_dir).unwrap();
        assert!(restored.exists());
        let outcome = ensure_fresh_cache(&project_dir, &cache).unwrap();
        assert!(outcome.updated);

        let after = cache.get_cached_project_data().unwrap();
        assert_eq!(
            after.sessions.get("session-1").unwrap().message_count,
            count_before
        );
        assert!(archived_sessions(&cache).unwrap().is_empty());
    }

    #[test]
    fn test_modified_file_reingested() {
        let (_tmp, project_dir, cache) = setup();
        write_session_file(&project_dir, "s1.jsonl", "session-1");
        ensure_fresh_cache(&project_dir, &cache).unwrap();

        // Rewrite with one extra record and an mtime clearly outside the
        // tolerance window.
        let path = project_dir.join("s1.jsonl");
        let mut body = std::fs::read_to_string(&path).unwrap();
        body.push_str(
            concat!(
                r#"{"type":"user","sessionId":"session-1","uuid":"u2","timestamp":"2023-01-01T10:05:00Z","message":{"role":"user","content":[{"type":"text","text":"More"}]}}"#,
                "\n",
            ),
        );
        std::fs::write(&path, body).unwrap();
        let stale_mtime = std::time::SystemTime::now() - std::time::Duration::from_secs(5);
        let file = std::fs::File::options().append(true).open(&path).unwrap();
        file.set_modified(stale_mtime).unwrap();
        drop(file);

        let outcome = ensure_fresh_cache(&project_dir, &cache).unwrap();
        assert!(outcome.updated);
        assert_eq!(outcome.messages_ingested, 3);
    }
}
