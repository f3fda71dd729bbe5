//! Record filtering and session metadata collection
//!
//! Shared between the cache synchronizer (which persists session
//! aggregates) and the tree builder (which renders them).

use crate::db::SessionCacheData;
use crate::timeutil::canonicalize_timestamp;
use crate::transcript::filters::{
    create_session_preview, should_skip_message, should_use_as_session_starter,
};
use crate::types::{
    extract_text_content, has_renderable_content, ContentItem, ParsedRecord, TranscriptRecord,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Collected session metadata in first-seen order, plus the token
/// display bookkeeping.
#[derive(Debug, Default)]
pub struct SessionCollection {
    /// Sessions in first-seen order
    pub sessions: Vec<SessionCacheData>,
    /// UUIDs of assistant messages that display token usage (first
    /// occurrence of each request id)
    pub show_tokens_for: HashSet<String>,
}

impl SessionCollection {
    pub fn get(&self, session_id: &str) -> Option<&SessionCacheData> {
        self.sessions.iter().find(|s| s.session_id == session_id)
    }
}

// ============================================
// Summary attachment
// ============================================

/// Resolve summary records to session ids via their leaf uuid.
///
/// The uuid-to-session mapping from assistant records takes precedence;
/// mappings from other record types only fill sessions the assistant map
/// did not resolve. Summaries are generated from the assistant's last
/// message, so when a uuid appears on both, the assistant row is the one
/// the summary anchors to.
pub fn attach_session_summaries(records: &[ParsedRecord]) -> HashMap<String, String> {
    let mut uuid_to_session: HashMap<&str, &str> = HashMap::new();
    let mut uuid_to_session_backup: HashMap<&str, &str> = HashMap::new();

    for entry in records {
        let (Some(uuid), Some(session_id)) = (entry.record.uuid(), entry.record.session_id())
        else {
            continue;
        };
        if matches!(entry.record, TranscriptRecord::Assistant(_)) {
            uuid_to_session.insert(uuid, session_id);
        } else {
            uuid_to_session_backup.insert(uuid, session_id);
        }
    }

    let mut summaries: HashMap<String, String> = HashMap::new();
    for entry in records {
        let TranscriptRecord::Summary(summary) = &entry.record else {
            continue;
        };
        let Some(leaf_uuid) = summary.leaf_uuid.as_deref() else {
            continue;
        };
        if let Some(session_id) = uuid_to_session.get(leaf_uuid) {
            summaries.insert(session_id.to_string(), summary.summary.clone());
        } else if let Some(session_id) = uuid_to_session_backup.get(leaf_uuid) {
            if !summaries.contains_key(*session_id) {
                summaries.insert(session_id.to_string(), summary.summary.clone());
            }
        }
    }
    summaries
}

// ============================================
// Filtering
// ============================================

/// Drop records that do not render: summaries (already attached to
/// sessions), queue operations other than `remove`, contentless records,
/// system noise, and sidechain user prompts that merely repeat the Task
/// tool input.
pub fn filter_records(records: &[ParsedRecord]) -> Vec<ParsedRecord> {
    let mut filtered = Vec::with_capacity(records.len());

    for entry in records {
        match &entry.record {
            TranscriptRecord::Summary(_) => continue,
            TranscriptRecord::QueueOperation(op) => {
                if op.operation != "remove" {
                    continue;
                }
            }
            TranscriptRecord::System(_) => {
                filtered.push(entry.clone());
                continue;
            }
            _ => {}
        }

        let items = entry.record.content_items().unwrap_or_default();
        let text = extract_text_content(&items);

        if text.trim().is_empty() && !has_renderable_content(&items) {
            continue;
        }
        if should_skip_message(&text) {
            continue;
        }

        // Sidechain user records without tool results are the duplicated
        // Task prompts.
        if matches!(entry.record, TranscriptRecord::User(_)) && entry.record.is_sidechain() {
            let has_tool_result = items
                .iter()
                .any(|item| matches!(item, ContentItem::ToolResult { .. }));
            if !has_tool_result {
                continue;
            }
        }

        filtered.push(entry.clone());
    }

    filtered
}

// ============================================
// Session collection
// ============================================

/// Collect per-session metadata and the token-display set from
/// pre-filtered records.
///
/// Token counters deduplicate on request id: when multiple assistant
/// records share one, only the first contributes to the sums and only
/// its uuid lands in `show_tokens_for`.
pub fn collect_sessions(
    records: &[ParsedRecord],
    summaries: &HashMap<String, String>,
) -> SessionCollection {
    let mut collection = SessionCollection::default();
    let mut index_by_session: HashMap<String, usize> = HashMap::new();
    let mut seen_request_ids: HashSet<String> = HashSet::new();
    let mut cwds_by_session: HashMap<String, Vec<(String, String)>> = HashMap::new();

    for entry in records {
        // System records render but do not shape session metadata.
        if matches!(entry.record, TranscriptRecord::System(_)) {
            continue;
        }

        let session_id = entry.record.session_id().unwrap_or("unknown").to_string();
        let timestamp = entry
            .record
            .timestamp()
            .and_then(canonicalize_timestamp);

        let index = match index_by_session.get(&session_id) {
            Some(&index) => index,
            None => {
                let index = collection.sessions.len();
                collection.sessions.push(SessionCacheData {
                    session_id: session_id.clone(),
                    summary: summaries.get(&session_id).cloned(),
                    first_timestamp: timestamp.clone(),
                    last_timestamp: timestamp.clone(),
                    ..Default::default()
                });
                index_by_session.insert(session_id.clone(), index);
                index
            }
        };
        {
            let session = &mut collection.sessions[index];
            session.message_count += 1;
            if let Some(ts) = &timestamp {
                if session.first_timestamp.is_none() {
                    session.first_timestamp = Some(ts.clone());
                }
                session.last_timestamp = Some(ts.clone());
            }

            if let TranscriptRecord::User(user) = &entry.record {
                if session.first_user_message.is_none() {
                    let text = extract_text_content(&user.message.content.items());
                    if should_use_as_session_starter(&text) {
                        session.first_user_message = Some(create_session_preview(&text));
                    }
                }
            }
        }

        if let Some(cwd) = entry.record.cwd() {
            cwds_by_session
                .entry(session_id.clone())
                .or_default()
                .push((cwd.to_string(), timestamp.clone().unwrap_or_default()));
        }

        if let TranscriptRecord::Assistant(assistant) = &entry.record {
            let (Some(usage), Some(request_id)) =
                (assistant.message.usage, assistant.request_id.as_deref())
            else {
                continue;
            };
            if !seen_request_ids.insert(request_id.to_string()) {
                continue;
            }
            if let Some(uuid) = &assistant.uuid {
                collection.show_tokens_for.insert(uuid.clone());
            }
            let session = &mut collection.sessions[index];
            session.total_input_tokens += usage.input_tokens.unwrap_or(0);
            session.total_output_tokens += usage.output_tokens.unwrap_or(0);
            session.total_cache_creation_tokens += usage.cache_creation_input_tokens.unwrap_or(0);
            session.total_cache_read_tokens += usage.cache_read_input_tokens.unwrap_or(0);
        }
    }

    for session in &mut collection.sessions {
        if let Some(cwds) = cwds_by_session.get(&session.session_id) {
            session.cwd = select_session_cwd(cwds);
        }
    }

    collection
}

/// Pick a session's working directory from the cwd values its records
/// carried: least nested wins, recency breaks depth ties, and insertion
/// order breaks exact ties.
pub fn select_session_cwd(cwds: &[(String, String)]) -> Option<String> {
    // Deduplicate, keeping the latest timestamp per directory and the
    // original insertion order.
    let mut latest: HashMap<String, String> = HashMap::new();
    let mut insertion: Vec<String> = Vec::new();
    for (cwd, timestamp) in cwds {
        let entry = latest.entry(cwd.clone()).or_default();
        if timestamp > entry {
            *entry = timestamp.clone();
        }
        if !insertion.contains(cwd) {
            insertion.push(cwd.clone());
        }
    }

    // Most recent first; insertion order breaks exact timestamp ties.
    let mut candidates: Vec<(String, String, usize)> = insertion
        .into_iter()
        .enumerate()
        .map(|(position, cwd)| {
            let timestamp = latest.get(&cwd).cloned().unwrap_or_default();
            (cwd, timestamp, position)
        })
        .collect();
    candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    let mut best: Option<(usize, usize, String)> = None;
    for (recency, (cwd, _timestamp, _position)) in candidates.iter().enumerate() {
        let depth = Path::new(cwd).components().count();
        let better = match &best {
            Some((best_depth, best_recency, _)) => (depth, recency) < (*best_depth, *best_recency),
            None => true,
        };
        if better {
            best = Some((depth, recency, cwd.clone()));
        }
    }
    best.map(|(_, _, cwd)| cwd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AssistantMessage, AssistantRecord, MessageContent, QueueOperationRecord, SummaryRecord,
        Usage, UserMessage, UserRecord,
    };

    fn user(session: &str, uuid: &str, ts: &str, text: &str) -> ParsedRecord {
        ParsedRecord::from_record(TranscriptRecord::User(UserRecord {
            uuid: Some(uuid.to_string()),
            session_id: Some(session.to_string()),
            timestamp: Some(ts.to_string()),
            message: UserMessage {
                role: "user".to_string(),
                content: MessageContent::Text(text.to_string()),
            },
            ..Default::default()
        }))
        .unwrap()
    }

    fn assistant(
        session: &str,
        uuid: &str,
        ts: &str,
        request_id: Option<&str>,
        tokens: (i64, i64),
    ) -> ParsedRecord {
        ParsedRecord::from_record(TranscriptRecord::Assistant(AssistantRecord {
            uuid: Some(uuid.to_string()),
            session_id: Some(session.to_string()),
            timestamp: Some(ts.to_string()),
            request_id: request_id.map(|r| r.to_string()),
            message: AssistantMessage {
                role: "assistant".to_string(),
                content: vec![ContentItem::Text {
                    text: "reply".to_string(),
                }],
                usage: Some(Usage {
                    input_tokens: Some(tokens.0),
                    output_tokens: Some(tokens.1),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }))
        .unwrap()
    }

    fn summary(leaf: &str, text: &str) -> ParsedRecord {
        ParsedRecord::from_record(TranscriptRecord::Summary(SummaryRecord {
            summary: text.to_string(),
            leaf_uuid: Some(leaf.to_string()),
        }))
        .unwrap()
    }

    #[test]
    fn test_summary_prefers_assistant_mapping() {
        // The same uuid appears on a user and an assistant record in
        // different sessions; the assistant's session gets the summary.
        let mut user_dup = user("session-user", "shared", "2023-01-01T10:00:00Z", "hi");
        if let TranscriptRecord::User(u) = &mut user_dup.record {
            u.uuid = Some("shared".to_string());
        }
        let records = vec![
            user_dup,
            assistant(
                "session-assistant",
                "shared",
                "2023-01-01T10:01:00Z",
                Some("r1"),
                (1, 1),
            ),
            summary("shared", "the summary"),
        ];
        let summaries = attach_session_summaries(&records);
        assert_eq!(
            summaries.get("session-assistant").map(String::as_str),
            Some("the summary")
        );
        assert!(!summaries.contains_key("session-user"));
    }

    #[test]
    fn test_filter_drops_summaries_and_queue_noise() {
        let queue_keep = ParsedRecord::from_record(TranscriptRecord::QueueOperation(
            QueueOperationRecord {
                session_id: Some("s1".to_string()),
                operation: "remove".to_string(),
                content: Some(MessageContent::Text("cancel that".to_string())),
                ..Default::default()
            },
        ))
        .unwrap();
        let queue_drop = ParsedRecord::from_record(TranscriptRecord::QueueOperation(
            QueueOperationRecord {
                session_id: Some("s1".to_string()),
                operation: "add".to_string(),
                content: Some(MessageContent::Text("queued".to_string())),
                ..Default::default()
            },
        ))
        .unwrap();
        let records = vec![
            user("s1", "u1", "2023-01-01T10:00:00Z", "hello"),
            summary("u1", "s"),
            queue_keep,
            queue_drop,
        ];
        let filtered = filter_records(&records);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].record.kind(), "user");
        assert_eq!(filtered[1].record.kind(), "queue-operation");
    }

    #[test]
    fn test_filter_drops_empty_records() {
        let empty = user("s1", "u1", "2023-01-01T10:00:00Z", "   ");
        let filtered = filter_records(&[empty]);
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_token_dedup_by_request_id() {
        let records = vec![
            user("s1", "u1", "2023-01-01T10:00:00Z", "question"),
            assistant("s1", "a1", "2023-01-01T10:01:00Z", Some("r1"), (10, 20)),
            // Editor version stutter: same request id, duplicated record.
            assistant("s1", "a2", "2023-01-01T10:01:00Z", Some("r1"), (10, 20)),
            assistant("s1", "a3", "2023-01-01T10:02:00Z", Some("r2"), (5, 5)),
        ];
        let collection = collect_sessions(&records, &HashMap::new());
        let session = collection.get("s1").unwrap();
        assert_eq!(session.total_input_tokens, 15);
        assert_eq!(session.total_output_tokens, 25);
        assert!(collection.show_tokens_for.contains("a1"));
        assert!(!collection.show_tokens_for.contains("a2"));
        assert!(collection.show_tokens_for.contains("a3"));
    }

    #[test]
    fn test_first_user_message_preview() {
        let records = vec![
            user("s1", "u1", "2023-01-01T10:00:00Z", "Warmup"),
            user("s1", "u2", "2023-01-01T10:01:00Z", "Real question"),
        ];
        let collection = collect_sessions(&records, &HashMap::new());
        assert_eq!(
            collection.get("s1").unwrap().first_user_message.as_deref(),
            Some("Real question")
        );
    }

    #[test]
    fn test_select_session_cwd_least_nested_then_recent() {
        let cwds = vec![
            (
                "/home/user/project/sub".to_string(),
                "2023-01-01T12:00:00Z".to_string(),
            ),
            (
                "/home/user/project".to_string(),
                "2023-01-01T10:00:00Z".to_string(),
            ),
        ];
        assert_eq!(
            select_session_cwd(&cwds).as_deref(),
            Some("/home/user/project")
        );

        let tie = vec![
            ("/a/b".to_string(), "2023-01-01T10:00:00Z".to_string()),
            ("/c/d".to_string(), "2023-01-01T11:00:00Z".to_string()),
        ];
        // Same depth: the more recent one wins.
        assert_eq!(select_session_cwd(&tie).as_deref(), Some("/c/d"));
    }
}
