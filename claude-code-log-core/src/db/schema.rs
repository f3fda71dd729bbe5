//! Schema migrations for the cache database
//!
//! Migrations are numbered SQL scripts embedded at compile time from the
//! crate's `migrations/` directory. Applied migrations are recorded in
//! `_schema_version` together with a SHA-256 digest of the script text,
//! so post-hoc modification of a script can be detected and warned about.

use crate::error::{Error, Result};
use rusqlite::Connection;
use sha2::{Digest, Sha256};

/// Embedded migration scripts as (filename, content) pairs.
/// Filenames follow `NNN_<label>.sql`; NNN is the version number.
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial.sql",
    include_str!("../../migrations/001_initial.sql"),
)];

/// SHA-256 digest of a migration script, as 64 hex characters.
fn compute_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extract the version number from a migration filename
/// (`001_initial.sql` -> 1).
fn parse_migration_version(filename: &str) -> Result<i64> {
    let prefix = filename.split('_').next().unwrap_or("");
    let version: i64 = prefix
        .parse()
        .map_err(|_| Error::Migration(format!("invalid migration filename: {}", filename)))?;
    if version <= 0 {
        return Err(Error::Migration(format!(
            "invalid migration filename: {}",
            filename
        )));
    }
    Ok(version)
}

/// Available migrations as (version, filename, content), ascending.
fn available_migrations() -> Result<Vec<(i64, &'static str, &'static str)>> {
    let mut migrations = Vec::with_capacity(MIGRATIONS.len());
    for (filename, content) in MIGRATIONS {
        migrations.push((parse_migration_version(filename)?, *filename, *content));
    }
    migrations.sort_by_key(|(version, _, _)| *version);
    Ok(migrations)
}

/// Create `_schema_version` if missing, upgrading a legacy table that
/// predates the checksum column by dropping it. The fresh start is safe:
/// the initial schema script only uses CREATE TABLE IF NOT EXISTS.
fn ensure_schema_version_table(conn: &Connection) -> Result<()> {
    let exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='_schema_version'",
            [],
            |row| row.get::<_, i64>(0).map(|n| n > 0),
        )
        .unwrap_or(false);

    if exists {
        let mut has_checksum = false;
        let mut stmt = conn.prepare("PRAGMA table_info(_schema_version)")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get(1)?;
            if name == "checksum" {
                has_checksum = true;
            }
        }
        if !has_checksum {
            tracing::warn!("legacy _schema_version table found; restarting migration tracking");
            conn.execute("DROP TABLE _schema_version", [])?;
        }
    }

    conn.execute(
        "CREATE TABLE IF NOT EXISTS _schema_version (
            version    INTEGER PRIMARY KEY,
            filename   TEXT NOT NULL,
            applied_at TEXT NOT NULL,
            checksum   TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Applied migrations as (version, checksum), ascending.
fn applied_migrations(conn: &Connection) -> Result<Vec<(i64, String)>> {
    ensure_schema_version_table(conn)?;
    let mut stmt =
        conn.prepare("SELECT version, checksum FROM _schema_version ORDER BY version")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    let mut applied = Vec::new();
    for row in rows {
        applied.push(row?);
    }
    Ok(applied)
}

/// Apply all pending migrations, each in its own transaction so a
/// partially executed script leaves the database unchanged.
///
/// Returns the number of migrations applied.
pub fn run_migrations(conn: &mut Connection) -> Result<usize> {
    ensure_schema_version_table(conn)?;
    let applied: std::collections::HashSet<i64> = applied_migrations(conn)?
        .into_iter()
        .map(|(version, _)| version)
        .collect();

    let mut count = 0;
    for (version, filename, content) in available_migrations()? {
        if applied.contains(&version) {
            continue;
        }
        tracing::info!(version, filename, "Applying migration");

        let tx = conn.transaction()?;
        tx.execute_batch(content)?;
        tx.execute(
            "INSERT INTO _schema_version (version, filename, applied_at, checksum)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                version,
                filename,
                chrono::Utc::now().to_rfc3339(),
                compute_checksum(content),
            ],
        )?;
        tx.commit()?;
        count += 1;
    }
    Ok(count)
}

/// Compare recorded checksums against the scripts in this build.
///
/// Returns one warning string per mismatch; mismatches are non-fatal.
pub fn verify_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut warnings = Vec::new();
    let available: std::collections::HashMap<i64, (&str, &str)> = available_migrations()?
        .into_iter()
        .map(|(version, filename, content)| (version, (filename, content)))
        .collect();

    for (version, stored_checksum) in applied_migrations(conn)? {
        if let Some((filename, content)) = available.get(&version) {
            let current_checksum = compute_checksum(content);
            if current_checksum != stored_checksum {
                warnings.push(format!(
                    "Migration {} ({}) has been modified since it was applied. \
                     This may indicate database inconsistency.",
                    version, filename
                ));
            }
        }
    }
    Ok(warnings)
}

/// Current schema version: highest applied migration number, or 0.
pub fn current_version(conn: &Connection) -> Result<i64> {
    ensure_schema_version_table(conn)?;
    let version: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM _schema_version", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}
