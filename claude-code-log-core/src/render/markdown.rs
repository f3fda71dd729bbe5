//! Structural Markdown renderer
//!
//! Message bodies are emitted under block quotes so markdown inside a
//! transcript (headings, lists, fences) cannot be reinterpreted as
//! document structure. The generator-version comment rides along as an
//! HTML comment, which Markdown passes through untouched.

use crate::config::get_library_version;
use crate::freshness::version_marker;
use crate::render::{ProjectIndexEntry, RenderOptions, Renderer};
use crate::transcript::{MessageTree, TemplateContent, TemplateMessage};

pub struct MarkdownRenderer;

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self
    }

    fn document_head(&self, title: &str) -> String {
        format!(
            "<!-- {} -->\n\n# {}\n\n",
            version_marker(get_library_version()),
            title
        )
    }

    fn table_of_contents(&self, tree: &MessageTree) -> String {
        if tree.session_nav.is_empty() {
            return String::new();
        }
        let mut out = String::from("## Contents\n\n");
        for entry in &tree.session_nav {
            let label = entry
                .summary
                .clone()
                .unwrap_or_else(|| first_line(&entry.first_user_message));
            out.push_str(&format!(
                "- [{}](#session-{})",
                label.replace('[', "\\[").replace(']', "\\]"),
                entry.id
            ));
            if !entry.timestamp_range.is_empty() {
                out.push_str(&format!(" ({})", entry.timestamp_range));
            }
            out.push('\n');
        }
        out.push('\n');
        out
    }

    /// Protect arbitrary text by quoting every line.
    fn blockquote(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for line in text.lines() {
            if line.is_empty() {
                out.push_str(">\n");
            } else {
                out.push_str("> ");
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    fn render_content(&self, message: &TemplateMessage) -> String {
        match &message.content {
            TemplateContent::Text { text } => Self::blockquote(text),
            TemplateContent::ToolUse { name, input, .. } => {
                let pretty =
                    serde_json::to_string_pretty(input).unwrap_or_else(|_| input.to_string());
                format!("> **{}**\n>\n> ```json\n{}> ```\n", name, Self::blockquote(&pretty))
            }
            TemplateContent::ToolResult {
                content, is_error, ..
            } => {
                let text = crate::transcript::tool_result_display_text(content);
                let mut out = String::new();
                if *is_error {
                    out.push_str("> **Error**\n>\n");
                }
                out.push_str(&Self::blockquote(&text));
                out
            }
            TemplateContent::Thinking { thinking } => Self::blockquote(thinking),
            TemplateContent::Image { media_type, .. } => {
                format!("> [Image: {}]\n", media_type)
            }
            TemplateContent::SessionHeader { .. } => String::new(),
            TemplateContent::DedupNotice { notice } => format!("> _{}_\n", notice),
            TemplateContent::Empty => String::new(),
        }
    }

    fn render_message(
        &self,
        tree: &MessageTree,
        index: usize,
        options: &RenderOptions,
        out: &mut String,
    ) {
        let message = &tree.messages[index];

        if message.is_session_header() {
            out.push_str(&format!(
                "<a id=\"session-{}\"></a>\n\n## {}\n\n",
                message.session_id, message.title
            ));
        } else {
            let mut heading = format!("### {}", message.title);
            if !message.formatted_timestamp.is_empty() {
                heading.push_str(&format!(" ({})", message.formatted_timestamp));
            }
            if let Some(duration) = &message.pair_duration {
                heading.push_str(&format!(" [{}]", duration));
            }
            out.push_str(&heading);
            out.push_str("\n\n");

            if options.show_stats {
                if let Some(token_usage) = &message.token_usage {
                    out.push_str(&format!("_{}_\n\n", token_usage));
                }
            }

            let content = self.render_content(message);
            if !content.is_empty() {
                out.push_str(&content);
                out.push('\n');
            }
        }

        for &child in &message.children {
            self.render_message(tree, child, options, out);
        }
    }
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or("").to_string()
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for MarkdownRenderer {
    fn file_extension(&self) -> &'static str {
        "md"
    }

    fn generate(&self, tree: &MessageTree, title: &str, options: &RenderOptions) -> String {
        let mut out = self.document_head(title);
        out.push_str(&self.table_of_contents(tree));
        for &root in &tree.roots {
            self.render_message(tree, root, options, &mut out);
        }
        out
    }

    fn generate_session(
        &self,
        tree: &MessageTree,
        _session_id: &str,
        title: &str,
        options: &RenderOptions,
    ) -> String {
        let mut out = self.document_head(title);
        for &root in &tree.roots {
            self.render_message(tree, root, options, &mut out);
        }
        out
    }

    fn generate_projects_index(&self, entries: &[ProjectIndexEntry], title: &str) -> String {
        let mut out = self.document_head(title);
        out.push_str("| Project | Files | Messages | Sessions | Activity |\n");
        out.push_str("|---|---|---|---|---|\n");
        for entry in entries {
            out.push_str(&format!(
                "| [{}]({}) | {} | {} | {} | {} |\n",
                entry.display_name,
                entry.output_file,
                entry.jsonl_count,
                entry.message_count,
                entry.session_count,
                entry.time_range,
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::MessageKind;

    #[test]
    fn test_blockquote_protects_markdown() {
        let quoted = MarkdownRenderer::blockquote("# not a heading\n\n- item");
        assert_eq!(quoted, "> # not a heading\n>\n> - item\n");
    }

    #[test]
    fn test_version_comment_present() {
        let tree = MessageTree::default();
        let md = MarkdownRenderer::new().generate(&tree, "Title", &RenderOptions::default());
        assert!(md.starts_with("<!-- Generated by claude-code-log v"));
    }

    #[test]
    fn test_session_header_anchor() {
        let mut header = TemplateMessage::new(
            MessageKind::SessionHeader,
            "abc12345",
            TemplateContent::SessionHeader {
                title: "abc12345".to_string(),
                session_id: "abc".to_string(),
                summary: None,
            },
        );
        header.session_id = "abc".to_string();
        let tree = MessageTree {
            messages: vec![header],
            roots: vec![0],
            session_nav: Vec::new(),
        };
        let md = MarkdownRenderer::new().generate(&tree, "Title", &RenderOptions::default());
        assert!(md.contains("<a id=\"session-abc\"></a>"));
        assert!(md.contains("## abc12345"));
    }
}
