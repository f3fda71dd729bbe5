//! Database layer for the transcript cache
//!
//! A single SQLite file serves every project on the machine:
//! - Schema migrations with checksum tracking
//! - Repository pattern for per-project queries
//! - WAL journaling so concurrent readers never block

pub mod repo;
pub mod schema;

pub use repo::{
    CacheStats, HtmlCacheData, PageCacheData, ProjectCache, ProjectCacheData, SessionCacheData,
};

use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Database busy timeout. Readers may be concurrent; a writer holding the
/// lock this long means something is wrong anyway.
const BUSY_TIMEOUT_MS: u64 = 30_000;

/// Handle over a single connection to the cache database.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(&format!(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = {};",
            BUSY_TIMEOUT_MS
        ))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run pending migrations. Returns the number applied.
    pub fn migrate(&self) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        schema::run_migrations(&mut conn)
    }

    /// Verify applied migration checksums; returns warning strings.
    pub fn verify_migrations(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        schema::verify_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }
}
