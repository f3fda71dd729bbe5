//! Configuration: render pipeline options, user config file, cache paths
//!
//! User configuration is loaded from
//! `~/.config/claude-code-log/config.toml`; everything in it is optional
//! and only supplies defaults for the CLI.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding the default cache database location.
pub const CACHE_PATH_ENV_VAR: &str = "CLAUDE_CODE_LOG_CACHE_PATH";

/// File name of the machine-wide cache database.
pub const CACHE_DB_FILE_NAME: &str = "claude-code-log-cache.db";

/// Library version stamped into cache rows and generated files.
pub fn get_library_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================
// Render pipeline configuration
// ============================================

/// How image content blocks appear in generated output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageExportMode {
    /// A placeholder marker instead of image data
    #[default]
    Placeholder,
    /// Base64 data embedded in the output
    Embedded,
    /// Image written next to the output and referenced by path
    Referenced,
}

/// Output format for generated artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Html,
    Markdown,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::Markdown => "md",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "html" => Ok(OutputFormat::Html),
            "md" | "markdown" => Ok(OutputFormat::Markdown),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Options threaded through the whole rendering pipeline.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Maximum messages per combined page; sessions are never split
    pub page_size: usize,
    /// Show token usage statistics in generated output
    pub show_stats: bool,
    /// How to materialize image content
    pub image_export_mode: ImageExportMode,
    /// Skip per-session output files
    pub skip_individual_sessions: bool,
    /// Skip the combined transcript
    pub skip_combined: bool,
    /// Inclusive lower timestamp bound (canonical form)
    pub date_from: Option<String>,
    /// Inclusive upper timestamp bound (canonical form)
    pub date_to: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            show_stats: false,
            image_export_mode: ImageExportMode::default(),
            skip_individual_sessions: false,
            skip_combined: false,
            date_from: None,
            date_to: None,
        }
    }
}

fn default_page_size() -> usize {
    2000
}

// ============================================
// User config file
// ============================================

/// User configuration loaded from the config file.
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Render defaults
    #[serde(default)]
    pub render: RenderDefaults,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Defaults for render options the CLI did not override.
#[derive(Debug, Deserialize)]
pub struct RenderDefaults {
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default)]
    pub show_stats: bool,
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            show_stats: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also mirror diagnostics into a daily rotated file under the
    /// state directory
    #[serde(default)]
    pub log_to_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_to_file: false,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Config {
    /// Load configuration from the default path, falling back to defaults
    /// when no config file exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        if !config_path.exists() {
            return Ok(Config::default());
        }
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Returns the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("claude-code-log")
            .join("config.toml")
    }

    /// Returns the state directory path (for logs)
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("claude-code-log")
    }
}

/// Default location of the Claude Code projects hierarchy.
pub fn default_projects_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claude")
        .join("projects")
}

// ============================================
// Cache database path resolution
// ============================================

/// Resolve the cache database path for a project directory.
///
/// Precedence: explicit caller-supplied path, then the
/// `CLAUDE_CODE_LOG_CACHE_PATH` environment variable, then the default
/// `<projects-dir>/claude-code-log-cache.db` beside the project
/// directories. The environment override applies only to the default,
/// never to an explicit path.
pub fn resolve_cache_db_path(project_path: &Path, explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(env_path) = std::env::var_os(CACHE_PATH_ENV_VAR) {
        if !env_path.is_empty() {
            return PathBuf::from(env_path);
        }
    }
    project_path
        .parent()
        .unwrap_or(project_path)
        .join(CACHE_DB_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_render_config() {
        let config = RenderConfig::default();
        assert_eq!(config.page_size, 2000);
        assert!(!config.show_stats);
        assert_eq!(config.image_export_mode, ImageExportMode::Placeholder);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[render]
page_size = 500
show_stats = true

[logging]
level = "debug"
log_to_file = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.render.page_size, 500);
        assert!(config.render.show_stats);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.log_to_file);
    }

    #[test]
    fn test_output_format_extension() {
        assert_eq!(OutputFormat::Html.extension(), "html");
        assert_eq!(OutputFormat::Markdown.extension(), "md");
        assert_eq!(
            "markdown".parse::<OutputFormat>().unwrap(),
            OutputFormat::Markdown
        );
    }

    #[test]
    fn test_explicit_cache_path_wins() {
        let explicit = PathBuf::from("/tmp/explicit.db");
        let resolved = resolve_cache_db_path(Path::new("/data/projects/p1"), Some(&explicit));
        assert_eq!(resolved, explicit);
    }

    #[test]
    fn test_default_cache_path_is_sibling_of_project() {
        // Environment override is exercised in the integration tests to
        // avoid mutating process state here.
        if std::env::var_os(CACHE_PATH_ENV_VAR).is_none() {
            let resolved = resolve_cache_db_path(Path::new("/data/projects/p1"), None);
            assert_eq!(resolved, PathBuf::from("/data/projects/claude-code-log-cache.db"));
        }
    }
}
