//! Per-project repository over the shared cache database
//!
//! [`ProjectCache`] scopes every operation to one project row. Message
//! payloads are stored as zlib-compressed compact JSON so the cache can
//! reconstitute the original transcript lines byte-for-byte in value
//! terms (key order aside).

use crate::config::resolve_cache_db_path;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::timeutil::canonicalize_timestamp;
use crate::types::{ParsedRecord, TranscriptRecord};
use chrono::Utc;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use rusqlite::{params, OptionalExtension, Row};
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Allowed drift between a file's current mtime and the recorded one
/// before the cache entry counts as stale. Absorbs filesystem timestamp
/// jitter across copies and network mounts.
const MTIME_TOLERANCE_SECS: f64 = 1.0;

/// Cache versions incompatible with newer library versions.
/// Key: cache version pattern (exact, or `MAJOR.MINOR.x` prefix).
/// Value: minimum current version for which the pattern is invalid.
const BREAKING_CACHE_CHANGES: &[(&str, &str)] = &[("0.1.x", "0.2.0"), ("0.2.x", "0.3.0")];

// ============================================
// Data carried between cache and pipeline
// ============================================

/// Cached per-session aggregates.
#[derive(Debug, Clone, Default)]
pub struct SessionCacheData {
    pub session_id: String,
    pub summary: Option<String>,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
    pub message_count: i64,
    pub first_user_message: Option<String>,
    pub cwd: Option<String>,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_cache_creation_tokens: i64,
    pub total_cache_read_tokens: i64,
}

/// Cached project-wide aggregates plus the session map.
#[derive(Debug, Clone, Default)]
pub struct ProjectCacheData {
    pub sessions: HashMap<String, SessionCacheData>,
    pub total_message_count: i64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_cache_creation_tokens: i64,
    pub total_cache_read_tokens: i64,
    pub earliest_timestamp: Option<String>,
    pub latest_timestamp: Option<String>,
}

/// Project-wide aggregate counters written after ingest.
#[derive(Debug, Clone, Default)]
pub struct ProjectAggregates {
    pub total_message_count: i64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_cache_creation_tokens: i64,
    pub total_cache_read_tokens: i64,
    pub earliest_timestamp: Option<String>,
    pub latest_timestamp: Option<String>,
}

/// One generated HTML artifact row.
#[derive(Debug, Clone)]
pub struct HtmlCacheData {
    pub output_path: String,
    pub generated_at: String,
    /// None for the combined page
    pub session_id: Option<String>,
    pub message_count: i64,
    pub library_version: String,
}

/// One paginated slice of the combined transcript.
#[derive(Debug, Clone, Default)]
pub struct PageCacheData {
    pub page_number: i64,
    pub output_path: String,
    pub page_size_config: i64,
    pub message_count: i64,
    pub session_count: i64,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
    pub first_session_id: Option<String>,
    pub last_session_id: Option<String>,
    /// Sessions on this page, in page order
    pub session_ids: Vec<String>,
    pub generated_at: String,
    pub library_version: String,
}

/// Summary counters for cache reporting.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub file_count: i64,
    pub message_count: i64,
    pub session_count: i64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
}

// ============================================
// Payload compression
// ============================================

/// Compress a record's JSON value as compact JSON + zlib.
/// Each row is independently decompressible.
pub fn compress_payload(raw: &serde_json::Value) -> Result<Vec<u8>> {
    let compact = serde_json::to_vec(raw)?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&compact)?;
    Ok(encoder.finish()?)
}

/// Inverse of [`compress_payload`].
pub fn decompress_payload(blob: &[u8]) -> Result<serde_json::Value> {
    let mut decoder = ZlibDecoder::new(blob);
    let mut buffer = Vec::new();
    decoder.read_to_end(&mut buffer)?;
    Ok(serde_json::from_slice(&buffer)?)
}

// ============================================
// Version compatibility
// ============================================

/// Parse the numeric triple out of a version string, ignoring
/// pre-release and build suffixes.
fn parse_version(value: &str) -> (u64, u64, u64) {
    let core = value
        .split(|c| c == '-' || c == '+')
        .next()
        .unwrap_or_default();
    let mut parts = core.split('.').map(|p| p.parse::<u64>().unwrap_or(0));
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

/// Apply the breaking-change table: is data written by `cache_version`
/// usable by `current_version`?
fn is_cache_version_compatible(cache_version: &str, current_version: &str) -> bool {
    if cache_version == current_version {
        return true;
    }
    let cache = parse_version(cache_version);
    let current = parse_version(current_version);

    for (pattern, min_required) in BREAKING_CACHE_CHANGES {
        if current < parse_version(min_required) {
            continue;
        }
        if let Some(major_minor) = pattern.strip_suffix(".x") {
            let mut parts = major_minor.split('.').map(|p| p.parse::<u64>().unwrap_or(0));
            let major = parts.next().unwrap_or(0);
            let minor = parts.next().unwrap_or(0);
            if cache.0 == major && cache.1 == minor {
                return false;
            }
        } else if cache <= parse_version(pattern) {
            return false;
        }
    }
    true
}

// ============================================
// ProjectCache
// ============================================

/// Repository handle scoping cache operations to one project.
pub struct ProjectCache {
    db: Database,
    project_id: i64,
    pub project_path: PathBuf,
    pub library_version: String,
    pub db_path: PathBuf,
}

fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn mtime_seconds(path: &Path) -> Option<f64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    modified
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs_f64())
}

impl ProjectCache {
    /// Open the cache for one project directory.
    ///
    /// Runs migrations, verifies migration checksums (mismatches are
    /// logged warnings, never fatal), and applies version-incompatibility
    /// invalidation: if the cached data was written by a library version
    /// the breaking-change table rules out, the project's data is dropped
    /// and the project row recreated.
    pub fn open(
        project_path: &Path,
        library_version: &str,
        db_path: Option<&Path>,
    ) -> Result<Self> {
        let db_path = resolve_cache_db_path(project_path, db_path);
        let db = Database::open(&db_path)?;
        db.migrate()?;
        for warning in db.verify_migrations()? {
            tracing::warn!("{}", warning);
        }

        let mut cache = Self {
            db,
            project_id: 0,
            project_path: project_path.to_path_buf(),
            library_version: library_version.to_string(),
            db_path,
        };
        cache.project_id = cache.ensure_project_row()?;

        if let Some(cached_version) = cache.stored_library_version()? {
            if !is_cache_version_compatible(&cached_version, library_version) {
                tracing::warn!(
                    cached_version = %cached_version,
                    current_version = %library_version,
                    project = %cache.project_path.display(),
                    "Cache version is incompatible; dropping cached project data"
                );
                cache.clear_cache()?;
            }
        }

        Ok(cache)
    }

    fn ensure_project_row(&self) -> Result<i64> {
        let conn = self.db.connection();
        let path = self.project_path.to_string_lossy().to_string();
        let existing: Option<i64> = conn
            .query_row("SELECT id FROM projects WHERE path = ?", [&path], |row| {
                row.get(0)
            })
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        let now = now_iso();
        conn.execute(
            "INSERT INTO projects (path, library_version, created_at, last_updated)
             VALUES (?1, ?2, ?3, ?3)",
            params![path, self.library_version, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn stored_library_version(&self) -> Result<Option<String>> {
        let conn = self.db.connection();
        let version = conn
            .query_row(
                "SELECT library_version FROM projects WHERE id = ?",
                [self.project_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }

    /// Stable row id of this project.
    pub fn project_id(&self) -> i64 {
        self.project_id
    }

    // ============================================
    // File cache validity
    // ============================================

    /// A file is cached iff its row exists and the recorded source mtime
    /// matches the file's current mtime within the tolerance.
    pub fn is_file_cached(&self, path: &Path) -> bool {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let Some(current_mtime) = mtime_seconds(path) else {
            return false;
        };

        let conn = self.db.connection();
        let stored: Option<f64> = conn
            .query_row(
                "SELECT source_mtime FROM cached_files WHERE project_id = ?1 AND file_name = ?2",
                params![self.project_id, file_name],
                |row| row.get(0),
            )
            .optional()
            .unwrap_or(None);

        match stored {
            Some(stored_mtime) => (current_mtime - stored_mtime).abs() <= MTIME_TOLERANCE_SECS,
            None => false,
        }
    }

    /// Files whose cache entries are missing or stale.
    pub fn get_modified_files(&self, files: &[PathBuf]) -> Vec<PathBuf> {
        files
            .iter()
            .filter(|path| !self.is_file_cached(path))
            .cloned()
            .collect()
    }

    // ============================================
    // Message storage
    // ============================================

    /// Replace the cached contents of one transcript file.
    ///
    /// Runs in a single transaction: the cached_files row is upserted in
    /// place (preserving its id so other rows are not cascade-deleted),
    /// its messages are deleted and re-inserted, and the project's
    /// last_updated is bumped.
    pub fn save_cached_entries(&self, path: &Path, entries: &[ParsedRecord]) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Parse {
                path: path.display().to_string(),
                message: "file has no name".to_string(),
            })?;
        let source_mtime = mtime_seconds(path).unwrap_or(0.0);
        let cached_mtime = Utc::now().timestamp_millis() as f64 / 1000.0;

        let mut conn = self.db.connection();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO cached_files
                 (project_id, file_name, file_path, source_mtime, cached_mtime, message_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(project_id, file_name) DO UPDATE SET
                 file_path = excluded.file_path,
                 source_mtime = excluded.source_mtime,
                 cached_mtime = excluded.cached_mtime,
                 message_count = excluded.message_count",
            params![
                self.project_id,
                file_name,
                path.to_string_lossy().to_string(),
                source_mtime,
                cached_mtime,
                entries.len() as i64,
            ],
        )?;
        let file_id: i64 = tx.query_row(
            "SELECT id FROM cached_files WHERE project_id = ?1 AND file_name = ?2",
            params![self.project_id, file_name],
            |row| row.get(0),
        )?;

        tx.execute("DELETE FROM messages WHERE file_id = ?", [file_id])?;

        {
            let mut insert = tx.prepare(
                "INSERT INTO messages
                     (project_id, file_id, type, timestamp, session_id, uuid, parent_uuid,
                      is_sidechain, is_meta, agent_id,
                      input_tokens, output_tokens, cache_creation_tokens, cache_read_tokens,
                      level, operation, leaf_uuid, request_id, content)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                         ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            )?;

            for entry in entries {
                let record = &entry.record;
                let usage = match record {
                    TranscriptRecord::Assistant(r) => r.message.usage,
                    _ => None,
                };
                let level = match record {
                    TranscriptRecord::System(r) => r.level.clone(),
                    _ => None,
                };
                let operation = match record {
                    TranscriptRecord::QueueOperation(r) => Some(r.operation.clone()),
                    _ => None,
                };
                let leaf_uuid = match record {
                    TranscriptRecord::Summary(r) => r.leaf_uuid.clone(),
                    _ => None,
                };
                let timestamp = record.timestamp().and_then(canonicalize_timestamp);

                insert.execute(params![
                    self.project_id,
                    file_id,
                    record.kind(),
                    timestamp,
                    record.session_id(),
                    record.uuid(),
                    record.parent_uuid(),
                    record.is_sidechain() as i64,
                    record.is_meta() as i64,
                    record.agent_id(),
                    usage.and_then(|u| u.input_tokens),
                    usage.and_then(|u| u.output_tokens),
                    usage.and_then(|u| u.cache_creation_input_tokens),
                    usage.and_then(|u| u.cache_read_input_tokens),
                    level,
                    operation,
                    leaf_uuid,
                    record.request_id(),
                    compress_payload(&entry.raw)?,
                ])?;
            }
        }

        tx.execute(
            "UPDATE projects SET last_updated = ?1, library_version = ?2 WHERE id = ?3",
            params![now_iso(), self.library_version, self.project_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn rows_to_records(&self, blobs: Vec<Vec<u8>>) -> Result<Vec<ParsedRecord>> {
        let mut records = Vec::with_capacity(blobs.len());
        for blob in blobs {
            let raw = decompress_payload(&blob)?;
            match serde_json::from_value::<TranscriptRecord>(raw.clone()) {
                Ok(record) => records.push(ParsedRecord { record, raw }),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable cached record");
                }
            }
        }
        Ok(records)
    }

    /// Load the cached records of one file, or None if it has no cache row.
    pub fn load_cached_entries(&self, path: &Path) -> Result<Option<Vec<ParsedRecord>>> {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        let conn = self.db.connection();
        let file_id: Option<i64> = conn
            .query_row(
                "SELECT id FROM cached_files WHERE project_id = ?1 AND file_name = ?2",
                params![self.project_id, file_name],
                |row| row.get(0),
            )
            .optional()?;
        let Some(file_id) = file_id else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT content FROM messages WHERE file_id = ?
             ORDER BY COALESCE(timestamp, ''), id",
        )?;
        let blobs: Vec<Vec<u8>> = stmt
            .query_map([file_id], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);
        drop(conn);
        Ok(Some(self.rows_to_records(blobs)?))
    }

    /// Load one file's records restricted to a canonical timestamp range.
    /// Records without timestamps (summaries) are always included.
    pub fn load_cached_entries_filtered(
        &self,
        path: &Path,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<Option<Vec<ParsedRecord>>> {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        let conn = self.db.connection();
        let file_id: Option<i64> = conn
            .query_row(
                "SELECT id FROM cached_files WHERE project_id = ?1 AND file_name = ?2",
                params![self.project_id, file_name],
                |row| row.get(0),
            )
            .optional()?;
        let Some(file_id) = file_id else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT content FROM messages
             WHERE file_id = ?1
               AND (timestamp IS NULL
                    OR ((?2 IS NULL OR timestamp >= ?2) AND (?3 IS NULL OR timestamp <= ?3)))
             ORDER BY COALESCE(timestamp, ''), id",
        )?;
        let blobs: Vec<Vec<u8>> = stmt
            .query_map(params![file_id, from, to], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);
        drop(conn);
        Ok(Some(self.rows_to_records(blobs)?))
    }

    /// Load every record of the project, chronologically, optionally
    /// restricted to a canonical timestamp range.
    pub fn load_project_entries(
        &self,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<Vec<ParsedRecord>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT content FROM messages
             WHERE project_id = ?1
               AND (timestamp IS NULL
                    OR ((?2 IS NULL OR timestamp >= ?2) AND (?3 IS NULL OR timestamp <= ?3)))
             ORDER BY COALESCE(timestamp, ''), id",
        )?;
        let blobs: Vec<Vec<u8>> = stmt
            .query_map(params![self.project_id, from, to], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);
        drop(conn);
        self.rows_to_records(blobs)
    }

    /// Load one session's records, including summary records anchored to
    /// the session via their leaf uuid.
    pub fn load_session_entries(&self, session_id: &str) -> Result<Vec<ParsedRecord>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT content FROM messages
             WHERE project_id = ?1
               AND (session_id = ?2
                    OR (type = 'summary' AND leaf_uuid IN
                        (SELECT uuid FROM messages
                         WHERE project_id = ?1 AND session_id = ?2 AND uuid IS NOT NULL)))
             ORDER BY COALESCE(timestamp, ''), id",
        )?;
        let blobs: Vec<Vec<u8>> = stmt
            .query_map(params![self.project_id, session_id], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);
        drop(conn);
        self.rows_to_records(blobs)
    }

    /// Cached file rows as (file_name, file_path) pairs.
    pub fn get_cached_files(&self) -> Result<Vec<(String, String)>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT file_name, file_path FROM cached_files WHERE project_id = ? ORDER BY file_name",
        )?;
        let rows = stmt.query_map([self.project_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    /// Distinct session ids among one cached file's messages.
    pub fn file_session_ids(&self, file_name: &str) -> Result<HashSet<String>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT m.session_id FROM messages m
             JOIN cached_files f ON m.file_id = f.id
             WHERE f.project_id = ?1 AND f.file_name = ?2 AND m.session_id IS NOT NULL",
        )?;
        let rows = stmt.query_map(params![self.project_id, file_name], |row| {
            row.get::<_, String>(0)
        })?;
        let mut ids = HashSet::new();
        for row in rows {
            ids.insert(row?);
        }
        Ok(ids)
    }

    /// Current number of cached messages carrying the session id.
    pub fn session_message_count(&self, session_id: &str) -> Result<i64> {
        let conn = self.db.connection();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE project_id = ?1 AND session_id = ?2",
            params![self.project_id, session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ============================================
    // Session and project aggregates
    // ============================================

    /// Upsert session aggregate rows. Sessions absent from `sessions`
    /// keep their rows: that is what makes archived sessions possible.
    pub fn update_session_cache(&self, sessions: &[SessionCacheData]) -> Result<()> {
        let mut conn = self.db.connection();
        let tx = conn.transaction()?;
        {
            let mut upsert = tx.prepare(
                "INSERT INTO sessions
                     (project_id, session_id, summary, first_timestamp, last_timestamp,
                      message_count, first_user_message, cwd,
                      total_input_tokens, total_output_tokens,
                      total_cache_creation_tokens, total_cache_read_tokens)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(project_id, session_id) DO UPDATE SET
                     summary = excluded.summary,
                     first_timestamp = excluded.first_timestamp,
                     last_timestamp = excluded.last_timestamp,
                     message_count = excluded.message_count,
                     first_user_message = excluded.first_user_message,
                     cwd = excluded.cwd,
                     total_input_tokens = excluded.total_input_tokens,
                     total_output_tokens = excluded.total_output_tokens,
                     total_cache_creation_tokens = excluded.total_cache_creation_tokens,
                     total_cache_read_tokens = excluded.total_cache_read_tokens",
            )?;
            for session in sessions {
                upsert.execute(params![
                    self.project_id,
                    session.session_id,
                    session.summary,
                    session.first_timestamp,
                    session.last_timestamp,
                    session.message_count,
                    session.first_user_message,
                    session.cwd,
                    session.total_input_tokens,
                    session.total_output_tokens,
                    session.total_cache_creation_tokens,
                    session.total_cache_read_tokens,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Write project-wide aggregates.
    pub fn update_project_aggregates(&self, aggregates: &ProjectAggregates) -> Result<()> {
        let conn = self.db.connection();
        conn.execute(
            "UPDATE projects SET
                 total_message_count = ?1,
                 total_input_tokens = ?2,
                 total_output_tokens = ?3,
                 total_cache_creation_tokens = ?4,
                 total_cache_read_tokens = ?5,
                 earliest_timestamp = ?6,
                 latest_timestamp = ?7,
                 last_updated = ?8,
                 library_version = ?9
             WHERE id = ?10",
            params![
                aggregates.total_message_count,
                aggregates.total_input_tokens,
                aggregates.total_output_tokens,
                aggregates.total_cache_creation_tokens,
                aggregates.total_cache_read_tokens,
                aggregates.earliest_timestamp,
                aggregates.latest_timestamp,
                now_iso(),
                self.library_version,
                self.project_id,
            ],
        )?;
        Ok(())
    }

    fn row_to_session(row: &Row) -> rusqlite::Result<SessionCacheData> {
        Ok(SessionCacheData {
            session_id: row.get("session_id")?,
            summary: row.get("summary")?,
            first_timestamp: row.get("first_timestamp")?,
            last_timestamp: row.get("last_timestamp")?,
            message_count: row.get("message_count")?,
            first_user_message: row.get("first_user_message")?,
            cwd: row.get("cwd")?,
            total_input_tokens: row.get("total_input_tokens")?,
            total_output_tokens: row.get("total_output_tokens")?,
            total_cache_creation_tokens: row.get("total_cache_creation_tokens")?,
            total_cache_read_tokens: row.get("total_cache_read_tokens")?,
        })
    }

    /// Load the project's aggregates and session map.
    pub fn get_cached_project_data(&self) -> Result<ProjectCacheData> {
        let conn = self.db.connection();
        let mut data = conn.query_row(
            "SELECT total_message_count, total_input_tokens, total_output_tokens,
                    total_cache_creation_tokens, total_cache_read_tokens,
                    earliest_timestamp, latest_timestamp
             FROM projects WHERE id = ?",
            [self.project_id],
            |row| {
                Ok(ProjectCacheData {
                    sessions: HashMap::new(),
                    total_message_count: row.get(0)?,
                    total_input_tokens: row.get(1)?,
                    total_output_tokens: row.get(2)?,
                    total_cache_creation_tokens: row.get(3)?,
                    total_cache_read_tokens: row.get(4)?,
                    earliest_timestamp: row.get(5)?,
                    latest_timestamp: row.get(6)?,
                })
            },
        )?;

        let mut stmt = conn.prepare(
            "SELECT * FROM sessions WHERE project_id = ?
             ORDER BY COALESCE(first_timestamp, ''), id",
        )?;
        let sessions = stmt.query_map([self.project_id], Self::row_to_session)?;
        for session in sessions {
            let session = session?;
            data.sessions.insert(session.session_id.clone(), session);
        }
        Ok(data)
    }

    /// Cached sessions ordered by first timestamp.
    pub fn get_sessions(&self) -> Result<Vec<SessionCacheData>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT * FROM sessions WHERE project_id = ?
             ORDER BY COALESCE(first_timestamp, ''), id",
        )?;
        let rows = stmt.query_map([self.project_id], Self::row_to_session)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    /// Distinct session working directories, most recent first.
    pub fn get_working_directories(&self) -> Result<Vec<String>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT cwd, MAX(COALESCE(last_timestamp, '')) AS ts
             FROM sessions
             WHERE project_id = ? AND cwd IS NOT NULL
             GROUP BY cwd
             ORDER BY ts DESC",
        )?;
        let rows = stmt.query_map([self.project_id], |row| row.get::<_, String>(0))?;
        let mut cwds = Vec::new();
        for row in rows {
            cwds.push(row?);
        }
        Ok(cwds)
    }

    /// Sessions present in the cache whose source files no longer carry
    /// their records. Not an error condition; they remain exportable.
    pub fn get_archived_sessions(
        &self,
        valid_session_ids: &HashSet<String>,
    ) -> Result<Vec<SessionCacheData>> {
        Ok(self
            .get_sessions()?
            .into_iter()
            .filter(|s| !valid_session_ids.contains(&s.session_id))
            .collect())
    }

    /// Export a session's records back to compact JSONL lines, suitable
    /// for reconstituting a deleted source file.
    pub fn export_session_to_jsonl(&self, session_id: &str) -> Result<Vec<String>> {
        let entries = self.load_session_entries(session_id)?;
        let mut lines = Vec::with_capacity(entries.len());
        for entry in entries {
            lines.push(serde_json::to_string(&entry.raw)?);
        }
        Ok(lines)
    }

    // ============================================
    // Deletion
    // ============================================

    /// Remove one session from the cache.
    ///
    /// Also drops the cached_files rows of every file that carried the
    /// session's records, so those files re-ingest on the next run, and
    /// the session's html and page bookkeeping.
    pub fn delete_session(&self, session_id: &str) -> Result<()> {
        let mut conn = self.db.connection();
        let tx = conn.transaction()?;

        let file_ids: Vec<i64> = {
            let mut stmt = tx.prepare(
                "SELECT DISTINCT file_id FROM messages
                 WHERE project_id = ?1 AND session_id = ?2",
            )?;
            let rows = stmt.query_map(params![self.project_id, session_id], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        for file_id in file_ids {
            // Cascades the file's messages, including copies belonging to
            // other sessions; they come back on the next ingest.
            tx.execute("DELETE FROM cached_files WHERE id = ?", [file_id])?;
        }

        tx.execute(
            "DELETE FROM page_sessions WHERE session_id = ?1
               AND page_id IN (SELECT id FROM html_pages WHERE project_id = ?2)",
            params![session_id, self.project_id],
        )?;
        tx.execute(
            "DELETE FROM html_cache WHERE project_id = ?1 AND session_id = ?2",
            params![self.project_id, session_id],
        )?;
        tx.execute(
            "DELETE FROM sessions WHERE project_id = ?1 AND session_id = ?2",
            params![self.project_id, session_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Remove the project and everything it owns. The cascade covers
    /// files, messages, sessions, html artifacts, pages, and page links.
    pub fn delete_project(&self) -> Result<()> {
        let conn = self.db.connection();
        conn.execute("DELETE FROM projects WHERE id = ?", [self.project_id])?;
        Ok(())
    }

    /// Drop all cached data for this project and start a fresh row.
    pub fn clear_cache(&self) -> Result<()> {
        let conn = self.db.connection();
        conn.execute("DELETE FROM projects WHERE id = ?", [self.project_id])?;
        let now = now_iso();
        conn.execute(
            "INSERT INTO projects (id, path, library_version, created_at, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![
                self.project_id,
                self.project_path.to_string_lossy().to_string(),
                self.library_version,
                now,
            ],
        )?;
        Ok(())
    }

    // ============================================
    // HTML artifact cache
    // ============================================

    /// Record a generated output file.
    pub fn update_html_cache(
        &self,
        output_path: &str,
        session_id: Option<&str>,
        message_count: i64,
    ) -> Result<()> {
        let conn = self.db.connection();
        conn.execute(
            "INSERT INTO html_cache
                 (project_id, output_path, generated_at, session_id, message_count, library_version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(project_id, output_path) DO UPDATE SET
                 generated_at = excluded.generated_at,
                 session_id = excluded.session_id,
                 message_count = excluded.message_count,
                 library_version = excluded.library_version",
            params![
                self.project_id,
                output_path,
                now_iso(),
                session_id,
                message_count,
                self.library_version,
            ],
        )?;
        Ok(())
    }

    /// Fetch the artifact row for an output path.
    pub fn get_html_cache(&self, output_path: &str) -> Result<Option<HtmlCacheData>> {
        let conn = self.db.connection();
        let row = conn
            .query_row(
                "SELECT output_path, generated_at, session_id, message_count, library_version
                 FROM html_cache WHERE project_id = ?1 AND output_path = ?2",
                params![self.project_id, output_path],
                |row| {
                    Ok(HtmlCacheData {
                        output_path: row.get(0)?,
                        generated_at: row.get(1)?,
                        session_id: row.get(2)?,
                        message_count: row.get(3)?,
                        library_version: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    // ============================================
    // Page cache
    // ============================================

    /// Upsert one page row and its session links.
    pub fn update_page_cache(&self, page: &PageCacheData) -> Result<()> {
        let mut conn = self.db.connection();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO html_pages
                 (project_id, page_number, output_path, page_size_config,
                  message_count, session_count, first_timestamp, last_timestamp,
                  first_session_id, last_session_id, generated_at, library_version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(project_id, page_number) DO UPDATE SET
                 output_path = excluded.output_path,
                 page_size_config = excluded.page_size_config,
                 message_count = excluded.message_count,
                 session_count = excluded.session_count,
                 first_timestamp = excluded.first_timestamp,
                 last_timestamp = excluded.last_timestamp,
                 first_session_id = excluded.first_session_id,
                 last_session_id = excluded.last_session_id,
                 generated_at = excluded.generated_at,
                 library_version = excluded.library_version",
            params![
                self.project_id,
                page.page_number,
                page.output_path,
                page.page_size_config,
                page.message_count,
                page.session_count,
                page.first_timestamp,
                page.last_timestamp,
                page.first_session_id,
                page.last_session_id,
                now_iso(),
                self.library_version,
            ],
        )?;
        let page_id: i64 = tx.query_row(
            "SELECT id FROM html_pages WHERE project_id = ?1 AND page_number = ?2",
            params![self.project_id, page.page_number],
            |row| row.get(0),
        )?;

        tx.execute("DELETE FROM page_sessions WHERE page_id = ?", [page_id])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO page_sessions (page_id, session_id, position) VALUES (?1, ?2, ?3)",
            )?;
            for (position, session_id) in page.session_ids.iter().enumerate() {
                insert.execute(params![page_id, session_id, position as i64])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn row_to_page(row: &Row) -> rusqlite::Result<PageCacheData> {
        Ok(PageCacheData {
            page_number: row.get("page_number")?,
            output_path: row.get("output_path")?,
            page_size_config: row.get("page_size_config")?,
            message_count: row.get("message_count")?,
            session_count: row.get("session_count")?,
            first_timestamp: row.get("first_timestamp")?,
            last_timestamp: row.get("last_timestamp")?,
            first_session_id: row.get("first_session_id")?,
            last_session_id: row.get("last_session_id")?,
            session_ids: Vec::new(),
            generated_at: row.get("generated_at")?,
            library_version: row.get("library_version")?,
        })
    }

    fn page_session_ids(&self, page_number: i64) -> Result<Vec<String>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT ps.session_id FROM page_sessions ps
             JOIN html_pages hp ON ps.page_id = hp.id
             WHERE hp.project_id = ?1 AND hp.page_number = ?2
             ORDER BY ps.position",
        )?;
        let rows = stmt.query_map(params![self.project_id, page_number], |row| row.get(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Fetch one page row with its session list.
    pub fn get_page(&self, page_number: i64) -> Result<Option<PageCacheData>> {
        let row = {
            let conn = self.db.connection();
            conn.query_row(
                "SELECT * FROM html_pages WHERE project_id = ?1 AND page_number = ?2",
                params![self.project_id, page_number],
                Self::row_to_page,
            )
            .optional()?
        };
        match row {
            Some(mut page) => {
                page.session_ids = self.page_session_ids(page_number)?;
                Ok(Some(page))
            }
            None => Ok(None),
        }
    }

    /// All page rows, in page order, with session lists.
    pub fn get_all_pages(&self) -> Result<Vec<PageCacheData>> {
        let mut pages = {
            let conn = self.db.connection();
            let mut stmt = conn.prepare(
                "SELECT * FROM html_pages WHERE project_id = ? ORDER BY page_number",
            )?;
            let rows = stmt.query_map([self.project_id], Self::row_to_page)?;
            let mut pages = Vec::new();
            for row in rows {
                pages.push(row?);
            }
            pages
        };
        for page in &mut pages {
            page.session_ids = self.page_session_ids(page.page_number)?;
        }
        Ok(pages)
    }

    pub fn get_page_count(&self) -> Result<i64> {
        let conn = self.db.connection();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM html_pages WHERE project_id = ?",
            [self.project_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// The page-size configuration shared by the project's pages.
    pub fn get_page_size_config(&self) -> Result<Option<i64>> {
        let conn = self.db.connection();
        let config = conn
            .query_row(
                "SELECT page_size_config FROM html_pages
                 WHERE project_id = ? ORDER BY page_number LIMIT 1",
                [self.project_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(config)
    }

    /// Drop all page rows, returning their output paths for cleanup.
    pub fn invalidate_all_pages(&self) -> Result<Vec<String>> {
        let mut conn = self.db.connection();
        let tx = conn.transaction()?;
        let paths: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT output_path FROM html_pages WHERE project_id = ? ORDER BY page_number",
            )?;
            let rows = stmt.query_map([self.project_id], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        tx.execute("DELETE FROM html_pages WHERE project_id = ?", [self.project_id])?;
        tx.commit()?;
        Ok(paths)
    }

    // ============================================
    // Stats
    // ============================================

    pub fn get_cache_stats(&self) -> Result<CacheStats> {
        let conn = self.db.connection();
        let (file_count, message_count): (i64, i64) = conn.query_row(
            "SELECT
                 (SELECT COUNT(*) FROM cached_files WHERE project_id = ?1),
                 (SELECT COUNT(*) FROM messages WHERE project_id = ?1)",
            [self.project_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let (session_count, total_input_tokens, total_output_tokens): (i64, i64, i64) = conn
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(total_input_tokens), 0),
                        COALESCE(SUM(total_output_tokens), 0)
                 FROM sessions WHERE project_id = ?",
                [self.project_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
        Ok(CacheStats {
            file_count,
            message_count,
            session_count,
            total_input_tokens,
            total_output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AssistantMessage, AssistantRecord, ContentItem, MessageContent, SummaryRecord,
        TranscriptRecord, Usage, UserMessage, UserRecord,
    };
    use tempfile::TempDir;

    fn user_record(session: &str, uuid: &str, ts: &str, text: &str) -> ParsedRecord {
        ParsedRecord::from_record(TranscriptRecord::User(UserRecord {
            uuid: Some(uuid.to_string()),
            session_id: Some(session.to_string()),
            timestamp: Some(ts.to_string()),
            cwd: Some("/test".to_string()),
            message: UserMessage {
                role: "user".to_string(),
                content: MessageContent::Blocks(vec![ContentItem::Text {
                    text: text.to_string(),
                }]),
            },
            ..Default::default()
        }))
        .unwrap()
    }

    fn assistant_record(
        session: &str,
        uuid: &str,
        ts: &str,
        request_id: &str,
        tokens: (i64, i64),
    ) -> ParsedRecord {
        ParsedRecord::from_record(TranscriptRecord::Assistant(AssistantRecord {
            uuid: Some(uuid.to_string()),
            session_id: Some(session.to_string()),
            timestamp: Some(ts.to_string()),
            request_id: Some(request_id.to_string()),
            message: AssistantMessage {
                id: Some("msg1".to_string()),
                role: "assistant".to_string(),
                model: Some("claude-3".to_string()),
                content: vec![ContentItem::Text {
                    text: "Hi".to_string(),
                }],
                usage: Some(Usage {
                    input_tokens: Some(tokens.0),
                    output_tokens: Some(tokens.1),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }))
        .unwrap()
    }

    fn setup() -> (TempDir, ProjectCache, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let project_dir = tmp.path().join("project");
        std::fs::create_dir(&project_dir).unwrap();
        let db_path = tmp.path().join("cache.db");
        let cache = ProjectCache::open(&project_dir, "1.0.0-test", Some(&db_path)).unwrap();
        (tmp, cache, project_dir)
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let (_tmp, cache, project_dir) = setup();
        let jsonl = project_dir.join("test.jsonl");
        std::fs::write(&jsonl, "placeholder\n").unwrap();

        let entries = vec![
            user_record("s1", "u1", "2023-01-01T10:00:00Z", "Hello"),
            assistant_record("s1", "a1", "2023-01-01T10:01:00Z", "r1", (10, 20)),
        ];
        cache.save_cached_entries(&jsonl, &entries).unwrap();

        assert!(cache.is_file_cached(&jsonl));
        let loaded = cache.load_cached_entries(&jsonl).unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].record.kind(), "user");
        assert_eq!(loaded[1].record.request_id(), Some("r1"));
    }

    #[test]
    fn test_payload_compression_roundtrip() {
        let raw = serde_json::json!({
            "type": "user",
            "sessionId": "s1",
            "message": {"role": "user", "content": [{"type": "text", "text": "nested \"quotes\""}]},
        });
        let blob = compress_payload(&raw).unwrap();
        let restored = decompress_payload(&blob).unwrap();
        assert_eq!(raw, restored);
    }

    #[test]
    fn test_mtime_tolerance_boundary() {
        let (_tmp, cache, project_dir) = setup();
        let jsonl = project_dir.join("test.jsonl");
        std::fs::write(&jsonl, "x\n").unwrap();
        let entries = vec![user_record("s1", "u1", "2023-01-01T10:00:00Z", "Hello")];
        cache.save_cached_entries(&jsonl, &entries).unwrap();

        let conn = cache.db.connection();
        let current = mtime_seconds(&jsonl).unwrap();
        // 0.9 seconds of drift stays cached; 1.1 seconds does not.
        conn.execute(
            "UPDATE cached_files SET source_mtime = ?1",
            [current - 0.9],
        )
        .unwrap();
        drop(conn);
        assert!(cache.is_file_cached(&jsonl));

        let conn = cache.db.connection();
        conn.execute(
            "UPDATE cached_files SET source_mtime = ?1",
            [current - 1.1],
        )
        .unwrap();
        drop(conn);
        assert!(!cache.is_file_cached(&jsonl));
    }

    #[test]
    fn test_timestamps_stored_canonically() {
        let (_tmp, cache, project_dir) = setup();
        let jsonl = project_dir.join("test.jsonl");
        std::fs::write(&jsonl, "x\n").unwrap();
        let entries = vec![user_record(
            "s1",
            "u1",
            "2023-01-01T10:00:00.875368+02:00",
            "Hello",
        )];
        cache.save_cached_entries(&jsonl, &entries).unwrap();

        let conn = cache.db.connection();
        let stored: String = conn
            .query_row("SELECT timestamp FROM messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(stored, "2023-01-01T08:00:00Z");
    }

    #[test]
    fn test_reingest_replaces_messages_and_preserves_file_id() {
        let (_tmp, cache, project_dir) = setup();
        let jsonl = project_dir.join("test.jsonl");
        std::fs::write(&jsonl, "x\n").unwrap();

        cache
            .save_cached_entries(
                &jsonl,
                &[user_record("s1", "u1", "2023-01-01T10:00:00Z", "one")],
            )
            .unwrap();
        let first_id: i64 = cache
            .db
            .connection()
            .query_row("SELECT id FROM cached_files", [], |row| row.get(0))
            .unwrap();

        cache
            .save_cached_entries(
                &jsonl,
                &[
                    user_record("s1", "u1", "2023-01-01T10:00:00Z", "one"),
                    user_record("s1", "u2", "2023-01-01T10:02:00Z", "two"),
                ],
            )
            .unwrap();
        let (second_id, message_count): (i64, i64) = cache
            .db
            .connection()
            .query_row(
                "SELECT id, message_count FROM cached_files",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(first_id, second_id);
        assert_eq!(message_count, 2);

        let actual: i64 = cache
            .db
            .connection()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(actual, 2);
    }

    #[test]
    fn test_filtered_load_respects_bounds() {
        let (_tmp, cache, project_dir) = setup();
        let jsonl = project_dir.join("test.jsonl");
        std::fs::write(&jsonl, "x\n").unwrap();
        cache
            .save_cached_entries(
                &jsonl,
                &[
                    user_record("s1", "u1", "2023-01-01T09:00:00Z", "early"),
                    user_record("s1", "u2", "2023-01-01T10:00:00.875368Z", "middle"),
                    user_record("s1", "u3", "2023-01-01T11:00:00Z", "late"),
                ],
            )
            .unwrap();

        let filtered = cache
            .load_cached_entries_filtered(
                &jsonl,
                Some("2023-01-01T10:00:00Z"),
                Some("2023-01-01T10:30:00Z"),
            )
            .unwrap()
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].record.uuid(), Some("u2"));
    }

    #[test]
    fn test_project_cascade_deletes_dependents() {
        let (_tmp, cache, project_dir) = setup();
        let jsonl = project_dir.join("test.jsonl");
        std::fs::write(&jsonl, "x\n").unwrap();
        cache
            .save_cached_entries(
                &jsonl,
                &[user_record("s1", "u1", "2023-01-01T10:00:00Z", "Hello")],
            )
            .unwrap();
        cache
            .update_session_cache(&[SessionCacheData {
                session_id: "s1".to_string(),
                message_count: 1,
                ..Default::default()
            }])
            .unwrap();

        cache.clear_cache().unwrap();

        let conn = cache.db.connection();
        for table in ["cached_files", "messages", "sessions"] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })
                .unwrap();
            assert_eq!(count, 0, "{} should be empty after clear", table);
        }
    }

    #[test]
    fn test_export_session_is_compact_json() {
        let (_tmp, cache, project_dir) = setup();
        let jsonl = project_dir.join("test.jsonl");
        std::fs::write(&jsonl, "x\n").unwrap();
        cache
            .save_cached_entries(
                &jsonl,
                &[
                    user_record("s1", "u1", "2023-01-01T10:00:00Z", "Hello"),
                    assistant_record("s1", "a1", "2023-01-01T10:01:00Z", "r1", (10, 20)),
                ],
            )
            .unwrap();

        let lines = cache.export_session_to_jsonl("s1").unwrap();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            assert!(!line.contains(": "), "expected compact separators");
            assert!(!line.contains(", "), "expected compact separators");
            let _parsed: serde_json::Value = serde_json::from_str(line).unwrap();
        }
    }

    #[test]
    fn test_export_includes_summary_via_leaf_uuid() {
        let (_tmp, cache, project_dir) = setup();
        let jsonl = project_dir.join("test.jsonl");
        std::fs::write(&jsonl, "x\n").unwrap();
        let summary = ParsedRecord::from_record(TranscriptRecord::Summary(SummaryRecord {
            summary: "greet".to_string(),
            leaf_uuid: Some("a1".to_string()),
        }))
        .unwrap();
        cache
            .save_cached_entries(
                &jsonl,
                &[
                    user_record("s1", "u1", "2023-01-01T10:00:00Z", "Hello"),
                    assistant_record("s1", "a1", "2023-01-01T10:01:00Z", "r1", (10, 20)),
                    summary,
                ],
            )
            .unwrap();

        let lines = cache.export_session_to_jsonl("s1").unwrap();
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_archived_sessions() {
        let (_tmp, cache, _project_dir) = setup();
        cache
            .update_session_cache(&[
                SessionCacheData {
                    session_id: "live".to_string(),
                    ..Default::default()
                },
                SessionCacheData {
                    session_id: "gone".to_string(),
                    ..Default::default()
                },
            ])
            .unwrap();

        let valid: HashSet<String> = ["live".to_string()].into_iter().collect();
        let archived = cache.get_archived_sessions(&valid).unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].session_id, "gone");
    }

    #[test]
    fn test_page_cache_roundtrip_and_invalidation() {
        let (_tmp, cache, _project_dir) = setup();
        cache
            .update_page_cache(&PageCacheData {
                page_number: 1,
                output_path: "combined_transcripts.html".to_string(),
                page_size_config: 50,
                message_count: 42,
                session_count: 2,
                session_ids: vec!["s1".to_string(), "s2".to_string()],
                ..Default::default()
            })
            .unwrap();
        cache
            .update_page_cache(&PageCacheData {
                page_number: 2,
                output_path: "combined_transcripts_2.html".to_string(),
                page_size_config: 50,
                message_count: 10,
                session_count: 1,
                session_ids: vec!["s3".to_string()],
                ..Default::default()
            })
            .unwrap();

        assert_eq!(cache.get_page_count().unwrap(), 2);
        assert_eq!(cache.get_page_size_config().unwrap(), Some(50));
        let page = cache.get_page(1).unwrap().unwrap();
        assert_eq!(page.session_ids, vec!["s1", "s2"]);

        let removed = cache.invalidate_all_pages().unwrap();
        assert_eq!(
            removed,
            vec![
                "combined_transcripts.html".to_string(),
                "combined_transcripts_2.html".to_string()
            ]
        );
        assert_eq!(cache.get_page_count().unwrap(), 0);
    }

    #[test]
    fn test_version_compatibility_rules() {
        assert!(is_cache_version_compatible("1.0.0", "1.0.0"));
        assert!(is_cache_version_compatible("1.0.1", "1.0.0"));
        assert!(is_cache_version_compatible("0.3.0", "0.3.1"));
        // 0.2.x caches are ruled out once the library reaches 0.3.0
        assert!(!is_cache_version_compatible("0.2.0", "0.3.0"));
        assert!(!is_cache_version_compatible("0.2.9", "0.3.0"));
        assert!(!is_cache_version_compatible("0.1.5", "0.3.0"));
        // Pre-release suffixes parse as their numeric core
        assert!(is_cache_version_compatible("1.0.0-alpha", "1.0.0"));
    }

    #[test]
    fn test_incompatible_cache_dropped_on_open() {
        let tmp = TempDir::new().unwrap();
        let project_dir = tmp.path().join("project");
        std::fs::create_dir(&project_dir).unwrap();
        let db_path = tmp.path().join("cache.db");

        {
            let cache = ProjectCache::open(&project_dir, "0.2.0", Some(&db_path)).unwrap();
            let jsonl = project_dir.join("test.jsonl");
            std::fs::write(&jsonl, "x\n").unwrap();
            cache
                .save_cached_entries(
                    &jsonl,
                    &[user_record("s1", "u1", "2023-01-01T10:00:00Z", "Hello")],
                )
                .unwrap();
        }

        let cache = ProjectCache::open(&project_dir, "0.3.0", Some(&db_path)).unwrap();
        let stats = cache.get_cache_stats().unwrap();
        assert_eq!(stats.message_count, 0);
        assert_eq!(stats.file_count, 0);
    }
}
