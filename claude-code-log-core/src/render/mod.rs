//! Renderer contract
//!
//! Renderers consume the format-neutral message tree and session index.
//! Template and theme concerns stay out of the core: the renderers here
//! emit structural output plus the two machine-readable artifacts the
//! rest of the engine depends on, the generator-version comment (for
//! freshness checks) and the pagination sentinels (for in-place
//! next-link patching).

mod html;
mod markdown;

pub use html::HtmlRenderer;
pub use markdown::MarkdownRenderer;

use crate::config::{ImageExportMode, OutputFormat};
use crate::transcript::MessageTree;

/// Options a renderer needs beyond the tree itself.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Show token usage statistics
    pub show_stats: bool,
    /// How image content is materialized
    pub image_export_mode: ImageExportMode,
    /// Pagination navigation, present only for paginated combined pages
    pub page_nav: Option<PageNav>,
}

/// Navigation state of one paginated page.
#[derive(Debug, Clone)]
pub struct PageNav {
    pub page_number: i64,
    /// The last page's next link carries the hidden marker class
    pub is_last: bool,
    pub previous_path: Option<String>,
    pub next_path: Option<String>,
}

/// One row of the project index.
#[derive(Debug, Clone)]
pub struct ProjectIndexEntry {
    pub display_name: String,
    pub output_file: String,
    pub jsonl_count: usize,
    pub message_count: i64,
    pub session_count: usize,
    pub time_range: String,
    pub token_summary: String,
}

/// Format-specific output generation over the neutral tree.
pub trait Renderer {
    /// Extension of files this renderer produces.
    fn file_extension(&self) -> &'static str;

    /// Render the combined (or single-file) transcript.
    fn generate(&self, tree: &MessageTree, title: &str, options: &RenderOptions) -> String;

    /// Render one session's transcript.
    fn generate_session(
        &self,
        tree: &MessageTree,
        session_id: &str,
        title: &str,
        options: &RenderOptions,
    ) -> String;

    /// Render the cross-project index.
    fn generate_projects_index(&self, entries: &[ProjectIndexEntry], title: &str) -> String;
}

/// Renderer for the requested output format.
pub fn get_renderer(format: OutputFormat) -> Box<dyn Renderer> {
    match format {
        OutputFormat::Html => Box::new(HtmlRenderer::new()),
        OutputFormat::Markdown => Box::new(MarkdownRenderer::new()),
    }
}

/// Escape text for HTML output.
pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
