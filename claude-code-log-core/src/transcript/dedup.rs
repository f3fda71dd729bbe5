//! Record-level deduplication
//!
//! Editor version upgrades replay the tail of a session into the log, so
//! the same logical message can appear under two record uuids. Three
//! duplicate shapes occur:
//!
//! - assistant records sharing a `message.id` within a session
//! - user tool-result records sharing tool_use ids and a timestamp
//! - user text records at the same timestamp where one record's text
//!   items are a subset of another's (content split across entries)
//!
//! The richer record wins; on a tie the first one seen keeps its place.

use crate::types::{ContentItem, ParsedRecord, TranscriptRecord};
use std::collections::{HashMap, HashSet};

fn content_item_count(entry: &ParsedRecord) -> usize {
    entry
        .record
        .content_items()
        .map(|items| items.len())
        .unwrap_or(0)
}

fn text_items(entry: &ParsedRecord) -> HashSet<String> {
    entry
        .record
        .content_items()
        .unwrap_or_default()
        .iter()
        .filter_map(|item| match item {
            ContentItem::Text { text } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

fn tool_result_ids(entry: &ParsedRecord) -> Vec<String> {
    let mut ids: Vec<String> = entry
        .record
        .content_items()
        .unwrap_or_default()
        .iter()
        .filter_map(|item| match item {
            ContentItem::ToolResult { tool_use_id, .. } => Some(tool_use_id.clone()),
            _ => None,
        })
        .collect();
    ids.sort();
    ids
}

/// Drop editor-version duplicates, preserving record order. The
/// surviving record keeps the position of the first occurrence.
pub fn deduplicate_records(records: Vec<ParsedRecord>) -> Vec<ParsedRecord> {
    let mut slots: Vec<Option<ParsedRecord>> = Vec::with_capacity(records.len());
    // Keys point at the slot holding the current survivor.
    let mut assistant_by_message_id: HashMap<(String, String), usize> = HashMap::new();
    let mut tool_result_by_ids: HashMap<(String, String, Vec<String>), usize> = HashMap::new();
    let mut user_text_groups: HashMap<(String, String), Vec<usize>> = HashMap::new();

    for entry in records {
        let session_id = entry.record.session_id().unwrap_or("").to_string();

        match &entry.record {
            TranscriptRecord::Assistant(assistant) => {
                if let Some(message_id) = assistant.message.id.clone() {
                    let key = (session_id, message_id);
                    if let Some(&slot) = assistant_by_message_id.get(&key) {
                        let richer = slots[slot]
                            .as_ref()
                            .map(|kept| content_item_count(&entry) > content_item_count(kept))
                            .unwrap_or(true);
                        if richer {
                            slots[slot] = Some(entry);
                        }
                        continue;
                    }
                    assistant_by_message_id.insert(key, slots.len());
                }
            }
            TranscriptRecord::User(user) => {
                let timestamp = user.timestamp.clone().unwrap_or_default();
                let result_ids = tool_result_ids(&entry);
                if !result_ids.is_empty() {
                    let key = (session_id, timestamp, result_ids);
                    if let Some(&slot) = tool_result_by_ids.get(&key) {
                        let richer = slots[slot]
                            .as_ref()
                            .map(|kept| content_item_count(&entry) > content_item_count(kept))
                            .unwrap_or(true);
                        if richer {
                            slots[slot] = Some(entry);
                        }
                        continue;
                    }
                    tool_result_by_ids.insert(key, slots.len());
                } else if !timestamp.is_empty() {
                    user_text_groups
                        .entry((session_id, timestamp))
                        .or_default()
                        .push(slots.len());
                }
            }
            _ => {}
        }

        slots.push(Some(entry));
    }

    // Same-timestamp user text records: a record whose text items are a
    // subset of the richest sibling's is the split-off duplicate.
    for group in user_text_groups.values() {
        if group.len() < 2 {
            continue;
        }
        let mut best: Option<usize> = None;
        for &slot in group {
            let Some(entry) = &slots[slot] else { continue };
            let richer = match best {
                Some(best_slot) => {
                    let kept = slots[best_slot].as_ref().map(content_item_count).unwrap_or(0);
                    content_item_count(entry) > kept
                }
                None => true,
            };
            if richer {
                best = Some(slot);
            }
        }
        let Some(best) = best else { continue };
        let best_texts = slots[best].as_ref().map(text_items).unwrap_or_default();
        for &slot in group {
            if slot == best {
                continue;
            }
            let subsumed = slots[slot]
                .as_ref()
                .map(|entry| text_items(entry).is_subset(&best_texts))
                .unwrap_or(false);
            if subsumed {
                slots[slot] = None;
            }
        }
    }

    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AssistantMessage, AssistantRecord, MessageContent, UserMessage, UserRecord,
    };

    fn assistant_with(message_id: &str, uuid: &str, version: &str, text: &str) -> ParsedRecord {
        ParsedRecord::from_record(TranscriptRecord::Assistant(AssistantRecord {
            uuid: Some(uuid.to_string()),
            session_id: Some("s1".to_string()),
            timestamp: Some("2023-01-01T10:00:00Z".to_string()),
            version: Some(version.to_string()),
            request_id: Some("r1".to_string()),
            message: AssistantMessage {
                id: Some(message_id.to_string()),
                role: "assistant".to_string(),
                content: vec![ContentItem::ToolUse {
                    id: "toolu_edit".to_string(),
                    name: "Edit".to_string(),
                    input: serde_json::json!({"file_path": text}),
                }],
                ..Default::default()
            },
            ..Default::default()
        }))
        .unwrap()
    }

    fn user_text(uuid: &str, texts: &[&str]) -> ParsedRecord {
        ParsedRecord::from_record(TranscriptRecord::User(UserRecord {
            uuid: Some(uuid.to_string()),
            session_id: Some("s1".to_string()),
            timestamp: Some("2023-01-01T11:44:08.771Z".to_string()),
            message: UserMessage {
                role: "user".to_string(),
                content: MessageContent::Blocks(
                    texts
                        .iter()
                        .map(|t| ContentItem::Text {
                            text: t.to_string(),
                        })
                        .collect(),
                ),
            },
            ..Default::default()
        }))
        .unwrap()
    }

    #[test]
    fn test_assistant_stutter_collapses_either_order() {
        let v1 = assistant_with("msg_duplicate", "uuid-v1", "2.0.31", "/test/file.py");
        let v2 = assistant_with("msg_duplicate", "uuid-v2", "2.0.34", "/test/file.py");

        for records in [vec![v1.clone(), v2.clone()], vec![v2, v1]] {
            let deduped = deduplicate_records(records);
            assert_eq!(deduped.len(), 1);
        }
    }

    #[test]
    fn test_distinct_message_ids_survive() {
        let a = assistant_with("msg_a", "u1", "2.0.31", "/a.py");
        let b = assistant_with("msg_b", "u2", "2.0.31", "/b.py");
        assert_eq!(deduplicate_records(vec![a, b]).len(), 2);
    }

    #[test]
    fn test_user_text_subset_elimination() {
        let full = user_text("m1", &["<ide_opened_file>test.md</ide_opened_file>", "The actual content."]);
        let text_only = user_text("m2", &["The actual content."]);
        let tag_only = user_text("m3", &["<ide_opened_file>test.md</ide_opened_file>"]);

        for records in [
            vec![full.clone(), text_only.clone(), tag_only.clone()],
            vec![text_only.clone(), full.clone(), tag_only.clone()],
            vec![tag_only, text_only, full],
        ] {
            let deduped = deduplicate_records(records);
            assert_eq!(deduped.len(), 1);
            let texts = text_items(&deduped[0]);
            assert!(texts.contains("The actual content."));
            assert_eq!(texts.len(), 2, "richest record must survive");
        }
    }

    #[test]
    fn test_unrelated_user_messages_not_deduplicated() {
        let a = user_text("m1", &["first question"]);
        let mut b = user_text("m2", &["second question"]);
        if let TranscriptRecord::User(u) = &mut b.record {
            u.timestamp = Some("2023-01-01T11:44:09Z".to_string());
        }
        assert_eq!(deduplicate_records(vec![a, b]).len(), 2);
    }
}
