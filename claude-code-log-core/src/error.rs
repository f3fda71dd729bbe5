//! Error types for claude-code-log-core

use thiserror::Error;

/// Main error type for the claude-code-log-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transcript parse error
    #[error("parse error in {path}: {message}")]
    Parse { path: String, message: String },

    /// Migration error
    #[error("migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Session not found in cache
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Unsupported output format
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),
}

/// Result type alias for claude-code-log-core
pub type Result<T> = std::result::Result<T, Error>;
