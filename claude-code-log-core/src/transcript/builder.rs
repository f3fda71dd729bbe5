//! The build pipeline: records in, renderable tree out
//!
//! Transformation order matters and none of the steps commute with its
//! neighbors: warmup filtering, summary attachment, filtering, token
//! deduplication, session collection, template rendering, session
//! regrouping, pair identification, pair reordering, sidechain
//! insertion, hierarchy assignment, child counting, tree linking.

use crate::timeutil::{format_timestamp, format_timestamp_range};
use crate::transcript::filters::{
    get_warmup_session_ids, is_bash_input, is_bash_output, is_command_message,
    is_compacted_summary, is_local_command_output,
};
use crate::transcript::hierarchy::{assign_hierarchy, count_children, link_tree};
use crate::transcript::pairing::{identify_pairs, reorder_pairs};
use crate::transcript::sessions::{
    attach_session_summaries, collect_sessions, filter_records, SessionCollection,
};
use crate::transcript::sidechain::reorder_sidechains;
use crate::transcript::{
    format_token_parts, MessageKind, MessageModifiers, MessageTree, SessionNavEntry,
    TemplateContent, TemplateMessage,
};
use crate::types::{
    extract_text_content, ContentItem, ParsedRecord, SystemRecord, TranscriptRecord,
};
use std::collections::{HashMap, HashSet};

/// Build the renderable message tree and session navigation list from a
/// project's chronologically sorted records.
pub fn build_message_tree(records: &[ParsedRecord]) -> MessageTree {
    // Warmup-only sessions drop out entirely before anything else sees
    // them.
    let warmup_sessions = get_warmup_session_ids(records);
    let records: Vec<ParsedRecord> = records
        .iter()
        .filter(|entry| {
            entry
                .record
                .session_id()
                .map(|sid| !warmup_sessions.contains(sid))
                .unwrap_or(true)
        })
        .cloned()
        .collect();

    // Collapse editor-version duplicates before anything counts or
    // renders them.
    let records = crate::transcript::deduplicate_records(records);

    let summaries = attach_session_summaries(&records);
    let filtered = filter_records(&records);
    let collection = collect_sessions(&filtered, &summaries);

    let mut arena = render_messages(&filtered, &collection, &summaries);
    let mut order: Vec<usize> = (0..arena.len()).collect();

    order = reorder_sessions(&arena, order);
    identify_pairs(&mut arena, &order);
    order = reorder_pairs(&mut arena, order);
    order = reorder_sidechains(&mut arena, order);
    assign_hierarchy(&mut arena, &order);
    count_children(&mut arena, &order);
    let roots = link_tree(&mut arena, &order);

    let session_nav = build_session_nav(&collection);

    MessageTree {
        messages: arena,
        roots,
        session_nav,
    }
}

// ============================================
// Template rendering
// ============================================

/// Per-tool context remembered from tool_use items so the matching
/// tool_result can render with knowledge of its source tool.
#[derive(Debug, Clone)]
struct ToolUseContext {
    name: String,
    file_path: Option<String>,
}

fn render_messages(
    records: &[ParsedRecord],
    collection: &SessionCollection,
    summaries: &HashMap<String, String>,
) -> Vec<TemplateMessage> {
    let mut arena: Vec<TemplateMessage> = Vec::with_capacity(records.len());
    let mut seen_sessions: HashSet<String> = HashSet::new();
    let mut tool_context: HashMap<String, ToolUseContext> = HashMap::new();

    for entry in records {
        if let TranscriptRecord::System(system) = &entry.record {
            if let Some(message) = process_system_message(system) {
                arena.push(message);
            }
            continue;
        }

        let session_id = entry.record.session_id().unwrap_or("unknown").to_string();
        let session_summary = summaries.get(&session_id).cloned();

        if seen_sessions.insert(session_id.clone()) {
            arena.push(session_header(&session_id, session_summary.clone()));
        }

        let items = entry.record.content_items().unwrap_or_default();
        let mut text = extract_text_content(&items);

        // Sidechain user records that survived filtering carry tool
        // results; their text is the duplicated Task prompt.
        let is_sidechain = entry.record.is_sidechain();
        if is_sidechain && matches!(entry.record, TranscriptRecord::User(_)) {
            text.clear();
        }

        let raw_timestamp = entry.record.timestamp().map(|t| t.to_string());
        let formatted_timestamp = raw_timestamp
            .as_deref()
            .map(format_timestamp)
            .unwrap_or_default();
        let agent_id = effective_agent_id(entry);
        let msg_uuid = entry.record.uuid().map(|u| u.to_string());

        let token_usage = token_usage_for(entry, collection);

        if !text.trim().is_empty() {
            let (kind, title, modifiers) = classify_text_message(entry, &text, is_sidechain);
            let mut message = TemplateMessage::new(
                kind,
                title,
                TemplateContent::Text { text: text.clone() },
            );
            message.formatted_timestamp = formatted_timestamp.clone();
            message.raw_timestamp = raw_timestamp.clone();
            message.session_id = session_id.clone();
            message.session_summary = session_summary.clone();
            message.token_usage = token_usage.clone();
            message.uuid = msg_uuid.clone();
            message.parent_uuid = entry.record.parent_uuid().map(|u| u.to_string());
            message.agent_id = agent_id.clone();
            message.modifiers = modifiers;
            message.raw_text = Some(text.clone());
            arena.push(message);
        }

        // Each tool / thinking / image item becomes its own sibling
        // message.
        for item in &items {
            let Some(mut message) = render_content_item(item, &mut tool_context) else {
                continue;
            };
            message.formatted_timestamp = formatted_timestamp.clone();
            message.raw_timestamp = raw_timestamp.clone();
            message.session_id = session_id.clone();
            message.session_summary = session_summary.clone();
            message.agent_id = agent_id.clone();
            message.modifiers.is_sidechain = is_sidechain;
            if message.uuid.is_none() {
                message.uuid = msg_uuid
                    .as_ref()
                    .map(|uuid| format!("{}-tool-{}", uuid, arena.len()));
            }
            arena.push(message);
        }
    }

    arena
}

fn session_header(session_id: &str, summary: Option<String>) -> TemplateMessage {
    let short_id: String = session_id.chars().take(8).collect();
    let title = match &summary {
        Some(summary) => format!("{} \u{2022} {}", summary, short_id),
        None => short_id,
    };
    let mut message = TemplateMessage::new(
        MessageKind::SessionHeader,
        title.clone(),
        TemplateContent::SessionHeader {
            title,
            session_id: session_id.to_string(),
            summary: summary.clone(),
        },
    );
    message.session_id = session_id.to_string();
    message.session_summary = summary;
    message
}

/// Kind, title, and modifiers for the text part of a record.
fn classify_text_message(
    entry: &ParsedRecord,
    text: &str,
    is_sidechain: bool,
) -> (MessageKind, String, MessageModifiers) {
    let mut modifiers = MessageModifiers {
        is_sidechain,
        ..Default::default()
    };

    if is_command_message(text) {
        modifiers.is_slash_command = true;
        return (MessageKind::User, "Slash Command".to_string(), modifiers);
    }
    if is_local_command_output(text) {
        modifiers.is_command_output = true;
        return (MessageKind::User, "Command Output".to_string(), modifiers);
    }
    if is_bash_input(text) {
        return (MessageKind::BashInput, "Bash".to_string(), modifiers);
    }
    if is_bash_output(text) {
        return (MessageKind::BashOutput, "Bash".to_string(), modifiers);
    }

    match &entry.record {
        TranscriptRecord::Assistant(_) => {
            let title = if is_sidechain {
                "Sub-assistant".to_string()
            } else {
                "Assistant".to_string()
            };
            (MessageKind::Assistant, title, modifiers)
        }
        TranscriptRecord::QueueOperation(_) => {
            // Only the `remove` variant survives filtering; it renders as
            // a user steering message.
            modifiers.is_steering = true;
            (MessageKind::User, "User (steering)".to_string(), modifiers)
        }
        TranscriptRecord::User(user) => {
            if user.is_meta.unwrap_or(false) {
                modifiers.is_slash_command = true;
                (
                    MessageKind::User,
                    "User (slash command)".to_string(),
                    modifiers,
                )
            } else if is_compacted_summary(text) {
                modifiers.is_compacted = true;
                (
                    MessageKind::User,
                    "User (compacted conversation)".to_string(),
                    modifiers,
                )
            } else {
                (MessageKind::User, "User".to_string(), modifiers)
            }
        }
        _ => (MessageKind::Unknown, "Unknown".to_string(), modifiers),
    }
}

fn render_content_item(
    item: &ContentItem,
    tool_context: &mut HashMap<String, ToolUseContext>,
) -> Option<TemplateMessage> {
    match item {
        ContentItem::Text { .. } => None,
        ContentItem::ToolUse { id, name, input } => {
            let file_path = match name.as_str() {
                "Read" | "Edit" | "Write" => input
                    .get("file_path")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
                _ => None,
            };
            tool_context.insert(
                id.clone(),
                ToolUseContext {
                    name: name.clone(),
                    file_path,
                },
            );
            let mut message = TemplateMessage::new(
                MessageKind::ToolUse,
                name.clone(),
                TemplateContent::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                },
            );
            message.tool_use_id = Some(id.clone());
            message.uuid = Some(id.clone());
            Some(message)
        }
        ContentItem::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => {
            let is_error = is_error.unwrap_or(false);
            let context = tool_context.get(tool_use_id);
            let tool_name = context.map(|c| c.name.clone());
            let file_path = context.and_then(|c| c.file_path.clone());

            let mut message = TemplateMessage::new(
                MessageKind::ToolResult,
                if is_error { "Error" } else { "" },
                TemplateContent::ToolResult {
                    tool_use_id: tool_use_id.clone(),
                    content: content.clone(),
                    is_error,
                    tool_name: tool_name.clone(),
                    file_path,
                },
            );
            message.tool_use_id = Some(tool_use_id.clone());
            message.uuid = Some(tool_use_id.clone());
            message.modifiers.is_error = is_error;

            // Task results remember their text so the sidechain pass can
            // deduplicate the sub-assistant's final report.
            if tool_name.as_deref() == Some("Task") {
                let text = tool_result_text(content);
                if !text.trim().is_empty() {
                    message.raw_text = Some(text);
                }
            }
            Some(message)
        }
        ContentItem::Thinking { thinking, .. } => {
            let mut message = TemplateMessage::new(
                MessageKind::Thinking,
                "Thinking",
                TemplateContent::Thinking {
                    thinking: thinking.trim().to_string(),
                },
            );
            message.raw_text = Some(thinking.clone());
            Some(message)
        }
        ContentItem::Image { source } => Some(TemplateMessage::new(
            MessageKind::Image,
            "Image",
            TemplateContent::Image {
                media_type: source.media_type.clone(),
                data: source.data.clone(),
            },
        )),
        ContentItem::Unknown => Some(TemplateMessage::new(
            MessageKind::Unknown,
            "Unknown Content",
            TemplateContent::Empty,
        )),
    }
}

/// Flatten a tool_result content value to text.
pub(crate) fn tool_result_text(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Array(items) => {
            let mut parts = Vec::new();
            for item in items {
                if let Some(text) = item.get("text").and_then(|v| v.as_str()) {
                    parts.push(text);
                }
            }
            parts.join("\n")
        }
        _ => String::new(),
    }
}

fn process_system_message(system: &SystemRecord) -> Option<TemplateMessage> {
    let content = system.content.clone()?;
    let level = system.level.clone().unwrap_or_else(|| "info".to_string());

    let mut title_level = level.clone();
    if let Some(first) = title_level.get_mut(0..1) {
        first.make_ascii_uppercase();
    }

    let mut message = TemplateMessage::new(
        MessageKind::System,
        format!("System {}", title_level),
        TemplateContent::Text { text: content },
    );
    message.session_id = system.session_id.clone().unwrap_or_else(|| "unknown".to_string());
    message.raw_timestamp = system.timestamp.clone();
    message.formatted_timestamp = system
        .timestamp
        .as_deref()
        .map(format_timestamp)
        .unwrap_or_default();
    message.uuid = system.uuid.clone();
    message.parent_uuid = system.parent_uuid.clone();
    message.modifiers.system_level = Some(level);
    message.modifiers.is_sidechain = system.is_sidechain.unwrap_or(false);
    Some(message)
}

fn token_usage_for(entry: &ParsedRecord, collection: &SessionCollection) -> Option<String> {
    let TranscriptRecord::Assistant(assistant) = &entry.record else {
        return None;
    };
    let uuid = assistant.uuid.as_deref()?;
    if !collection.show_tokens_for.contains(uuid) {
        return None;
    }
    let usage = assistant.message.usage?;
    format_token_parts(
        usage.input_tokens.unwrap_or(0),
        usage.output_tokens.unwrap_or(0),
        usage.cache_creation_input_tokens.unwrap_or(0),
        usage.cache_read_input_tokens.unwrap_or(0),
    )
}

fn effective_agent_id(entry: &ParsedRecord) -> Option<String> {
    if let Some(agent_id) = entry.record.agent_id() {
        return Some(agent_id.to_string());
    }
    // Task tool results carry the spawned agent's id inside the
    // toolUseResult payload.
    entry
        .raw
        .get("toolUseResult")
        .and_then(|v| v.get("agentId"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

// ============================================
// Session regrouping
// ============================================

/// Group every message contiguously after its session header.
///
/// Resuming session A inside session B copies A's records into B's file;
/// after global chronological sorting those copies interleave with B's
/// own messages. Regrouping by session id repairs the interleaving while
/// preserving intra-session chronological order.
pub(crate) fn reorder_sessions(arena: &[TemplateMessage], order: Vec<usize>) -> Vec<usize> {
    let mut headers: Vec<usize> = Vec::new();
    let mut by_session: HashMap<String, Vec<usize>> = HashMap::new();

    for &index in &order {
        let message = &arena[index];
        if message.is_session_header() {
            headers.push(index);
            by_session.entry(message.session_id.clone()).or_default();
        } else {
            by_session
                .entry(message.session_id.clone())
                .or_default()
                .push(index);
        }
    }

    if headers.is_empty() {
        return order;
    }

    let mut result: Vec<usize> = Vec::with_capacity(order.len());
    let mut used: HashSet<String> = HashSet::new();

    for &header in &headers {
        result.push(header);
        let session_id = &arena[header].session_id;
        if used.insert(session_id.clone()) {
            if let Some(messages) = by_session.get(session_id) {
                result.extend(messages.iter().copied());
            }
        }
    }

    // Messages whose session never produced a header keep their original
    // relative order at the end.
    for &index in &order {
        let message = &arena[index];
        if !message.is_session_header() && !used.contains(&message.session_id) {
            result.push(index);
        }
    }

    result
}

// ============================================
// Session navigation
// ============================================

fn build_session_nav(collection: &SessionCollection) -> Vec<SessionNavEntry> {
    let mut nav = Vec::new();
    for session in &collection.sessions {
        // Sessions with no user message (agent-only) stay out of
        // navigation.
        let Some(first_user_message) = session.first_user_message.clone() else {
            continue;
        };
        if first_user_message.is_empty() {
            continue;
        }

        let timestamp_range = format_timestamp_range(
            session.first_timestamp.as_deref().unwrap_or(""),
            session.last_timestamp.as_deref().unwrap_or(""),
        );
        let token_summary = format_token_parts(
            session.total_input_tokens,
            session.total_output_tokens,
            session.total_cache_creation_tokens,
            session.total_cache_read_tokens,
        )
        .map(|parts| format!("Token usage: {}", parts))
        .unwrap_or_default();

        nav.push(SessionNavEntry {
            id: session.session_id.clone(),
            summary: session.summary.clone(),
            timestamp_range,
            first_timestamp: session.first_timestamp.clone(),
            last_timestamp: session.last_timestamp.clone(),
            message_count: session.message_count,
            first_user_message,
            token_summary,
        });
    }
    nav
}
