//! Structural HTML renderer
//!
//! Emits self-contained HTML with the generator-version comment in the
//! first lines and, on paginated pages, the sentinel comments that allow
//! the next link to be rewritten in place.

use crate::config::{get_library_version, ImageExportMode};
use crate::freshness::version_marker;
use crate::pagination::{PAGINATION_NEXT_LINK_END, PAGINATION_NEXT_LINK_START};
use crate::render::{escape_html, PageNav, ProjectIndexEntry, RenderOptions, Renderer};
use crate::transcript::{MessageTree, TemplateContent, TemplateMessage};

pub struct HtmlRenderer;

impl HtmlRenderer {
    pub fn new() -> Self {
        Self
    }

    fn document_head(&self, title: &str) -> String {
        format!(
            "<!DOCTYPE html>\n<!-- {} -->\n<html lang=\"en\">\n<head>\n\
             <meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n\
             <h1>{}</h1>\n",
            version_marker(get_library_version()),
            escape_html(title),
            escape_html(title),
        )
    }

    fn session_nav(&self, tree: &MessageTree, options: &RenderOptions) -> String {
        if tree.session_nav.is_empty() {
            return String::new();
        }
        let mut out = String::from("<nav class=\"sessions\">\n<ul>\n");
        for entry in &tree.session_nav {
            let label = entry
                .summary
                .clone()
                .unwrap_or_else(|| entry.first_user_message.clone());
            out.push_str(&format!(
                "<li><a href=\"#session-{}\">{}</a> <span class=\"range\">{}</span>",
                escape_html(&entry.id),
                escape_html(&label),
                escape_html(&entry.timestamp_range),
            ));
            if options.show_stats && !entry.token_summary.is_empty() {
                out.push_str(&format!(
                    " <span class=\"tokens\">{}</span>",
                    escape_html(&entry.token_summary)
                ));
            }
            out.push_str("</li>\n");
        }
        out.push_str("</ul>\n</nav>\n");
        out
    }

    fn page_nav(&self, nav: &PageNav) -> String {
        let mut out = String::from("<nav class=\"pages\">\n");
        if let Some(previous) = &nav.previous_path {
            out.push_str(&format!(
                "<a href=\"{}\" class=\"page-nav-link prev\">&larr; Previous</a>\n",
                escape_html(previous)
            ));
        }
        let next_href = nav.next_path.clone().unwrap_or_else(|| "#".to_string());
        let next_class = if nav.is_last {
            "page-nav-link next last-page"
        } else {
            "page-nav-link next"
        };
        out.push_str(&format!(
            "{}\n<a href=\"{}\" class=\"{}\">Next &rarr;</a>\n{}\n",
            PAGINATION_NEXT_LINK_START,
            escape_html(&next_href),
            next_class,
            PAGINATION_NEXT_LINK_END,
        ));
        out.push_str("</nav>\n");
        out
    }

    fn render_content(&self, message: &TemplateMessage, options: &RenderOptions) -> String {
        match &message.content {
            TemplateContent::Text { text } => {
                format!("<pre class=\"text\">{}</pre>\n", escape_html(text))
            }
            TemplateContent::ToolUse { name, input, .. } => {
                let pretty =
                    serde_json::to_string_pretty(input).unwrap_or_else(|_| input.to_string());
                format!(
                    "<div class=\"tool-input\" data-tool=\"{}\"><pre>{}</pre></div>\n",
                    escape_html(name),
                    escape_html(&pretty),
                )
            }
            TemplateContent::ToolResult {
                content, is_error, ..
            } => {
                let text = crate::transcript::tool_result_display_text(content);
                let class = if *is_error {
                    "tool-result error"
                } else {
                    "tool-result"
                };
                format!(
                    "<div class=\"{}\"><pre>{}</pre></div>\n",
                    class,
                    escape_html(&text)
                )
            }
            TemplateContent::Thinking { thinking } => {
                format!("<pre class=\"thinking\">{}</pre>\n", escape_html(thinking))
            }
            TemplateContent::Image { media_type, data } => match options.image_export_mode {
                ImageExportMode::Embedded => match data {
                    Some(data) => format!(
                        "<img src=\"data:{};base64,{}\" alt=\"attached image\">\n",
                        escape_html(media_type),
                        data
                    ),
                    None => format!("<p class=\"image\">[Image: {}]</p>\n", escape_html(media_type)),
                },
                _ => format!("<p class=\"image\">[Image: {}]</p>\n", escape_html(media_type)),
            },
            TemplateContent::SessionHeader { title, .. } => {
                format!("<h2>{}</h2>\n", escape_html(title))
            }
            TemplateContent::DedupNotice { notice } => {
                format!("<p class=\"dedup-notice\"><em>{}</em></p>\n", escape_html(notice))
            }
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
        let id_attr = if message.message_id.is_empty() {
            String::new()
        } else {
            format!(" id=\"{}\"", escape_html(&message.message_id))
        };
        out.push_str(&format!(
            "<div class=\"message {}\"{}>\n",
            message.kind.count_key(),
            id_attr
        ));

        let mut header_parts: Vec<String> = Vec::new();
        if !message.title.is_empty() {
            header_parts.push(escape_html(&message.title));
        }
        if !message.formatted_timestamp.is_empty() {
            header_parts.push(format!(
                "<span class=\"timestamp\">{}</span>",
                escape_html(&message.formatted_timestamp)
            ));
        }
        if let Some(duration) = &message.pair_duration {
            header_parts.push(format!(
                "<span class=\"duration\">{}</span>",
                escape_html(duration)
            ));
        }
        if options.show_stats {
            if let Some(token_usage) = &message.token_usage {
                header_parts.push(format!(
                    "<span class=\"tokens\">{}</span>",
                    escape_html(token_usage)
                ));
            }
        }
        if message.has_children {
            header_parts.push(format!(
                "<span class=\"children\">{}</span>",
                escape_html(&message.immediate_children_label())
            ));
        }
        if !header_parts.is_empty() && !message.is_session_header() {
            out.push_str(&format!(
                "<div class=\"header\">{}</div>\n",
                header_parts.join(" ")
            ));
        }

        out.push_str(&self.render_content(message, options));

        if !message.children.is_empty() {
            out.push_str("<div class=\"children\">\n");
            for &child in &message.children {
                self.render_message(tree, child, options, out);
            }
            out.push_str("</div>\n");
        }
        out.push_str("</div>\n");
    }

    fn render_tree(&self, tree: &MessageTree, options: &RenderOptions) -> String {
        let mut out = String::new();
        for &root in &tree.roots {
            self.render_message(tree, root, options, &mut out);
        }
        out
    }
}

impl Default for HtmlRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for HtmlRenderer {
    fn file_extension(&self) -> &'static str {
        "html"
    }

    fn generate(&self, tree: &MessageTree, title: &str, options: &RenderOptions) -> String {
        let mut out = self.document_head(title);
        if let Some(nav) = &options.page_nav {
            out.push_str(&self.page_nav(nav));
        }
        out.push_str(&self.session_nav(tree, options));
        out.push_str(&self.render_tree(tree, options));
        if let Some(nav) = &options.page_nav {
            out.push_str(&self.page_nav(nav));
        }
        out.push_str("</body>\n</html>\n");
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
        out.push_str(&self.render_tree(tree, options));
        out.push_str("</body>\n</html>\n");
        out
    }

    fn generate_projects_index(&self, entries: &[ProjectIndexEntry], title: &str) -> String {
        let mut out = self.document_head(title);
        out.push_str("<table class=\"projects\">\n<thead><tr>\
            <th>Project</th><th>Files</th><th>Messages</th><th>Sessions</th><th>Activity</th>\
            </tr></thead>\n<tbody>\n");
        for entry in entries {
            out.push_str(&format!(
                "<tr><td><a href=\"{}\">{}</a></td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                escape_html(&entry.output_file),
                escape_html(&entry.display_name),
                entry.jsonl_count,
                entry.message_count,
                entry.session_count,
                escape_html(&entry.time_range),
            ));
            if !entry.token_summary.is_empty() {
                out.push_str(&format!(
                    "<tr class=\"tokens\"><td colspan=\"5\">{}</td></tr>\n",
                    escape_html(&entry.token_summary)
                ));
            }
        }
        out.push_str("</tbody>\n</table>\n</body>\n</html>\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{MessageKind, SessionNavEntry};

    fn tiny_tree() -> MessageTree {
        let mut header = TemplateMessage::new(
            MessageKind::SessionHeader,
            "abc12345",
            TemplateContent::SessionHeader {
                title: "abc12345".to_string(),
                session_id: "abc12345-full".to_string(),
                summary: None,
            },
        );
        header.session_id = "abc12345-full".to_string();
        header.message_id = "session-abc12345-full".to_string();

        let mut user = TemplateMessage::new(
            MessageKind::User,
            "User",
            TemplateContent::Text {
                text: "Hello <world>".to_string(),
            },
        );
        user.message_id = "d-0".to_string();
        user.ancestry = vec!["session-abc12345-full".to_string()];

        let mut tree = MessageTree {
            messages: vec![header, user],
            roots: vec![0],
            session_nav: vec![SessionNavEntry {
                id: "abc12345-full".to_string(),
                summary: None,
                timestamp_range: String::new(),
                first_timestamp: None,
                last_timestamp: None,
                message_count: 1,
                first_user_message: "Hello <world>".to_string(),
                token_summary: String::new(),
            }],
        };
        tree.messages[0].children = vec![1];
        tree
    }

    #[test]
    fn test_version_comment_in_first_lines() {
        let html = HtmlRenderer::new().generate(&tiny_tree(), "Test", &RenderOptions::default());
        let head: Vec<&str> = html.lines().take(3).collect();
        assert!(head
            .iter()
            .any(|line| line.contains("Generated by claude-code-log v")));
    }

    #[test]
    fn test_content_is_escaped() {
        let html = HtmlRenderer::new().generate(&tiny_tree(), "Test", &RenderOptions::default());
        assert!(html.contains("Hello &lt;world&gt;"));
        assert!(!html.contains("Hello <world>"));
    }

    #[test]
    fn test_page_nav_sentinels_and_last_page_class() {
        let mut options = RenderOptions::default();
        options.page_nav = Some(PageNav {
            page_number: 4,
            is_last: true,
            previous_path: Some("combined_transcripts_3.html".to_string()),
            next_path: None,
        });
        let html = HtmlRenderer::new().generate(&tiny_tree(), "Test", &options);
        assert!(html.contains(PAGINATION_NEXT_LINK_START));
        assert!(html.contains(PAGINATION_NEXT_LINK_END));
        assert!(html.contains("last-page"));

        options.page_nav = Some(PageNav {
            page_number: 1,
            is_last: false,
            previous_path: None,
            next_path: Some("combined_transcripts_2.html".to_string()),
        });
        let html = HtmlRenderer::new().generate(&tiny_tree(), "Test", &options);
        assert!(!html.contains("last-page"));
        assert!(html.contains("combined_transcripts_2.html"));
    }
}
