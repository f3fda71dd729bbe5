//! # claude-code-log-core
//!
//! Core library for claude-code-log: converts Claude Code transcript
//! JSONL files into browsable HTML and Markdown, backed by a persistent
//! SQLite cache shared across every project on the machine.
//!
//! ## Architecture
//!
//! ```text
//! transcript files -> loader -> sync -> cache (SQLite)
//!                                          |
//!                                      transcript (tree builder)
//!                                          |
//!                       freshness -> pagination -> render -> output
//! ```
//!
//! The cache keeps a compressed copy of every record, so sessions whose
//! source files were deleted remain exportable, and the freshness engine
//! regenerates only the artifacts whose inputs actually changed.
//!
//! ## Example
//!
//! ```rust,no_run
//! use claude_code_log_core::config::{get_library_version, OutputFormat, RenderConfig};
//! use claude_code_log_core::converter::convert_project;
//! use claude_code_log_core::db::ProjectCache;
//! use std::path::Path;
//!
//! let project_dir = Path::new("/home/me/.claude/projects/-home-me-dev-app");
//! let cache = ProjectCache::open(project_dir, get_library_version(), None)
//!     .expect("failed to open cache");
//! convert_project(project_dir, OutputFormat::Html, &RenderConfig::default(), &cache)
//!     .expect("conversion failed");
//! ```

// Re-export commonly used items at the crate root
pub use config::{get_library_version, Config, OutputFormat, RenderConfig};
pub use db::{Database, ProjectCache};
pub use error::{Error, Result};
pub use sync::{ensure_fresh_cache, SyncOutcome};

// Public modules
pub mod config;
pub mod converter;
pub mod db;
pub mod error;
pub mod freshness;
pub mod loader;
pub mod logging;
pub mod pagination;
pub mod render;
pub mod sync;
pub mod timeutil;
pub mod transcript;
pub mod types;
