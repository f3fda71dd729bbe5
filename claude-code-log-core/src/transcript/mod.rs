//! Message tree construction
//!
//! Turns the flat, chronologically sorted record stream of a project into
//! a renderable tree: filtered, deduplicated, regrouped by session,
//! paired, sidechain-inserted, and levelled. The pipeline operates on an
//! arena (`Vec<TemplateMessage>`) with integer indices; reordering passes
//! shuffle an index vector rather than moving messages, and the final
//! tree stores children as arena indices.

mod builder;
mod dedup;
mod filters;
mod hierarchy;
mod pairing;
mod sessions;
mod sidechain;

pub use builder::build_message_tree;
pub use dedup::deduplicate_records;
pub use filters::{
    create_session_preview, get_warmup_session_ids, is_bash_input, is_bash_output,
    is_command_message, is_compacted_summary, is_local_command_output, is_system_message,
    should_skip_message, should_use_as_session_starter,
};
pub use sessions::{
    attach_session_summaries, collect_sessions, filter_records, select_session_cwd,
    SessionCollection,
};

use std::collections::BTreeMap;

/// Flatten a tool_result content value (string or block list) to text.
pub fn tool_result_display_text(content: &serde_json::Value) -> String {
    builder::tool_result_text(content)
}

// ============================================
// Template message model
// ============================================

/// Display kind of a template message. Derived from record discriminators
/// and content items during rendering; closed by design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    SessionHeader,
    User,
    Assistant,
    System,
    Thinking,
    ToolUse,
    ToolResult,
    Image,
    BashInput,
    BashOutput,
    Unknown,
}

impl MessageKind {
    /// Key used for child-count labels.
    pub fn count_key(&self) -> &'static str {
        match self {
            MessageKind::SessionHeader => "session",
            MessageKind::User => "user",
            MessageKind::Assistant => "assistant",
            MessageKind::System => "system",
            MessageKind::Thinking => "thinking",
            MessageKind::ToolUse => "tool_use",
            MessageKind::ToolResult => "tool_result",
            MessageKind::Image => "image",
            MessageKind::BashInput => "bash-input",
            MessageKind::BashOutput => "bash-output",
            MessageKind::Unknown => "unknown",
        }
    }
}

/// Display modifiers orthogonal to the message kind.
#[derive(Debug, Clone, Default)]
pub struct MessageModifiers {
    pub is_sidechain: bool,
    pub is_slash_command: bool,
    pub is_command_output: bool,
    pub is_compacted: bool,
    pub is_steering: bool,
    pub is_error: bool,
    /// System message severity (info, warning, error)
    pub system_level: Option<String>,
}

/// Which end of a display pair a message is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairRole {
    First,
    Last,
}

/// Format-neutral content carried by a template message.
#[derive(Debug, Clone)]
pub enum TemplateContent {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: serde_json::Value,
        is_error: bool,
        /// Name of the tool that produced this result, when known
        tool_name: Option<String>,
        /// file_path from the tool input, for Read/Edit/Write results
        file_path: Option<String>,
    },
    Thinking {
        thinking: String,
    },
    Image {
        media_type: String,
        data: Option<String>,
    },
    SessionHeader {
        title: String,
        session_id: String,
        summary: Option<String>,
    },
    /// Replaces a sidechain assistant message whose text duplicated the
    /// Task tool result it reported to.
    DedupNotice {
        notice: String,
    },
    Empty,
}

/// One renderable message in the arena.
#[derive(Debug, Clone)]
pub struct TemplateMessage {
    pub kind: MessageKind,
    pub title: String,
    pub content: TemplateContent,
    pub formatted_timestamp: String,
    pub raw_timestamp: Option<String>,
    pub session_id: String,
    pub session_summary: Option<String>,
    pub token_usage: Option<String>,
    pub tool_use_id: Option<String>,
    pub uuid: Option<String>,
    pub parent_uuid: Option<String>,
    pub agent_id: Option<String>,
    pub modifiers: MessageModifiers,
    /// Raw text, kept for sidechain/Task deduplication
    pub raw_text: Option<String>,

    // Pairing
    pub pair_role: Option<PairRole>,
    pub pair_duration: Option<String>,

    // Hierarchy (assigned after all reordering)
    pub message_id: String,
    pub ancestry: Vec<String>,
    pub has_children: bool,
    pub immediate_children_count: usize,
    pub total_descendants_count: usize,
    pub immediate_children_by_type: BTreeMap<&'static str, usize>,
    pub total_descendants_by_type: BTreeMap<&'static str, usize>,
    /// Direct children as arena indices
    pub children: Vec<usize>,
}

impl TemplateMessage {
    pub fn new(kind: MessageKind, title: impl Into<String>, content: TemplateContent) -> Self {
        Self {
            kind,
            title: title.into(),
            content,
            formatted_timestamp: String::new(),
            raw_timestamp: None,
            session_id: String::new(),
            session_summary: None,
            token_usage: None,
            tool_use_id: None,
            uuid: None,
            parent_uuid: None,
            agent_id: None,
            modifiers: MessageModifiers::default(),
            raw_text: None,
            pair_role: None,
            pair_duration: None,
            message_id: String::new(),
            ancestry: Vec::new(),
            has_children: false,
            immediate_children_count: 0,
            total_descendants_count: 0,
            immediate_children_by_type: BTreeMap::new(),
            total_descendants_by_type: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn is_session_header(&self) -> bool {
        self.kind == MessageKind::SessionHeader
    }

    /// Human-readable label for direct children.
    pub fn immediate_children_label(&self) -> String {
        format_type_counts(&self.immediate_children_by_type)
    }

    /// Human-readable label for all descendants.
    pub fn total_descendants_label(&self) -> String {
        format_type_counts(&self.total_descendants_by_type)
    }
}

/// One entry of the session navigation list.
#[derive(Debug, Clone)]
pub struct SessionNavEntry {
    pub id: String,
    pub summary: Option<String>,
    pub timestamp_range: String,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
    pub message_count: i64,
    pub first_user_message: String,
    pub token_summary: String,
}

/// The builder's output: an arena of messages, the root indices, and the
/// session navigation list.
#[derive(Debug, Default)]
pub struct MessageTree {
    pub messages: Vec<TemplateMessage>,
    pub roots: Vec<usize>,
    pub session_nav: Vec<SessionNavEntry>,
}

impl MessageTree {
    /// Pre-order traversal of the tree as arena indices.
    pub fn flatten(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.messages.len());
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(index) = stack.pop() {
            order.push(index);
            for &child in self.messages[index].children.iter().rev() {
                stack.push(child);
            }
        }
        order
    }
}

// ============================================
// Child-count labels
// ============================================

/// Format type counts into a short label like "3 assistant, 4 tools".
/// Equal tool_use/tool_result counts collapse into "N tool pairs".
pub fn format_type_counts(type_counts: &BTreeMap<&'static str, usize>) -> String {
    if type_counts.is_empty() {
        return "0 messages".to_string();
    }

    let mut counts: BTreeMap<&str, usize> = type_counts
        .iter()
        .map(|(key, count)| (*key, *count))
        .collect();
    if let (Some(&uses), Some(&results)) = (counts.get("tool_use"), counts.get("tool_result")) {
        if uses == results {
            counts.remove("tool_use");
            counts.remove("tool_result");
            counts.insert("tool_pair", uses);
        }
    }

    fn label_for(key: &str, count: usize) -> String {
        let (singular, plural) = match key {
            "assistant" => ("assistant", "assistants"),
            "user" => ("user", "users"),
            "tool_use" => ("tool", "tools"),
            "tool_result" => ("result", "results"),
            "tool_pair" => ("tool pair", "tool pairs"),
            "thinking" => ("thought", "thoughts"),
            "system" => ("system", "systems"),
            "image" => ("image", "images"),
            other => return format!("{} {}", count, other),
        };
        format!("{} {}", count, if count == 1 { singular } else { plural })
    }

    let mut sorted: Vec<(&str, usize)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    let parts: Vec<String> = sorted
        .iter()
        .map(|(key, count)| label_for(key, *count))
        .collect();
    match parts.len() {
        1 => parts[0].clone(),
        2 => format!("{}, {}", parts[0], parts[1]),
        _ => {
            let remaining: usize = sorted.iter().skip(2).map(|(_, count)| count).sum();
            format!("{}, {}, {} more", parts[0], parts[1], remaining)
        }
    }
}

/// Token usage string shared by navigation entries and message headers.
pub(crate) fn format_token_parts(
    input: i64,
    output: i64,
    cache_creation: i64,
    cache_read: i64,
) -> Option<String> {
    if input <= 0 && output <= 0 {
        return None;
    }
    let mut parts = Vec::new();
    if input > 0 {
        parts.push(format!("Input: {}", input));
    }
    if output > 0 {
        parts.push(format!("Output: {}", output));
    }
    if cache_creation > 0 {
        parts.push(format!("Cache Creation: {}", cache_creation));
    }
    if cache_read > 0 {
        parts.push(format!("Cache Read: {}", cache_read));
    }
    Some(parts.join(" | "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_counts_tool_pairs() {
        let mut counts = BTreeMap::new();
        counts.insert("tool_use", 2);
        counts.insert("tool_result", 2);
        assert_eq!(format_type_counts(&counts), "2 tool pairs");
    }

    #[test]
    fn test_type_counts_mixed() {
        let mut counts = BTreeMap::new();
        counts.insert("assistant", 3);
        counts.insert("tool_use", 4);
        assert_eq!(format_type_counts(&counts), "4 tools, 3 assistants");
    }

    #[test]
    fn test_type_counts_overflow_label() {
        let mut counts = BTreeMap::new();
        counts.insert("assistant", 5);
        counts.insert("thinking", 3);
        counts.insert("user", 2);
        counts.insert("system", 1);
        assert_eq!(format_type_counts(&counts), "5 assistants, 3 thoughts, 3 more");
    }

    #[test]
    fn test_empty_counts() {
        assert_eq!(format_type_counts(&BTreeMap::new()), "0 messages");
    }
}
