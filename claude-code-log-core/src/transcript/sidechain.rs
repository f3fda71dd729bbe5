//! Sidechain insertion and Task-result deduplication
//!
//! Sub-agent records carry an agent id tying them to the Task tool
//! result that spawned them. Each agent's messages move to directly
//! after the first main-chain tool result bearing that agent id. When
//! the sidechain's final assistant text equals the Task result text, the
//! duplicate is replaced by a notice so the same report is not shown
//! twice.

use crate::transcript::{MessageKind, TemplateContent, TemplateMessage};
use std::collections::{HashMap, HashSet};

const DEDUP_NOTICE: &str = "(Task summary, already displayed in the Task tool result above)";

/// Insert sidechain message groups after their Task results.
///
/// Must run after pair reordering: that pass moves tool results next to
/// their tool uses, which is where the agent-id anchors end up. A
/// sidechain whose agent id never appears on a main-chain tool result is
/// appended at the end.
pub(crate) fn reorder_sidechains(arena: &mut [TemplateMessage], order: Vec<usize>) -> Vec<usize> {
    let mut main: Vec<usize> = Vec::new();
    let mut sidechains: HashMap<String, Vec<usize>> = HashMap::new();
    let mut agent_sequence: Vec<String> = Vec::new();

    for &index in &order {
        let message = &arena[index];
        match (&message.agent_id, message.modifiers.is_sidechain) {
            (Some(agent_id), true) => {
                if !sidechains.contains_key(agent_id) {
                    agent_sequence.push(agent_id.clone());
                }
                sidechains.entry(agent_id.clone()).or_default().push(index);
            }
            _ => main.push(index),
        }
    }

    if sidechains.is_empty() {
        return order;
    }

    let mut result: Vec<usize> = Vec::with_capacity(order.len());
    let mut used_agents: HashSet<String> = HashSet::new();

    for &index in &main {
        result.push(index);

        let anchor = &arena[index];
        if anchor.kind != MessageKind::ToolResult {
            continue;
        }
        let Some(agent_id) = anchor.agent_id.clone() else {
            continue;
        };
        // Only the first tool result bearing an agent id receives the
        // sidechain; later results with the same id get nothing.
        if used_agents.contains(&agent_id) {
            continue;
        }
        let Some(members) = sidechains.get(&agent_id).cloned() else {
            continue;
        };

        dedupe_final_report(arena, index, &members);
        result.extend(members);
        used_agents.insert(agent_id);
    }

    for agent_id in &agent_sequence {
        if !used_agents.contains(agent_id) {
            if let Some(members) = sidechains.get(agent_id) {
                result.extend(members.iter().copied());
            }
        }
    }

    result
}

/// If the last assistant message of the sidechain repeats the Task
/// result text, replace its content with a dedup notice.
fn dedupe_final_report(arena: &mut [TemplateMessage], anchor: usize, members: &[usize]) {
    let Some(task_text) = arena[anchor].raw_text.as_ref().map(|t| t.trim().to_string()) else {
        return;
    };
    if task_text.is_empty() {
        return;
    }

    for &member in members.iter().rev() {
        if arena[member].kind != MessageKind::Assistant {
            continue;
        }
        let matches = arena[member]
            .raw_text
            .as_ref()
            .map(|text| text.trim() == task_text)
            .unwrap_or(false);
        if matches {
            arena[member].content = TemplateContent::DedupNotice {
                notice: DEDUP_NOTICE.to_string(),
            };
            arena[member].raw_text = None;
        }
        break;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(kind: MessageKind) -> TemplateMessage {
        TemplateMessage::new(kind, "t", TemplateContent::Empty)
    }

    fn sidechain_assistant(agent: &str, text: &str) -> TemplateMessage {
        let mut m = message(MessageKind::Assistant);
        m.modifiers.is_sidechain = true;
        m.agent_id = Some(agent.to_string());
        m.raw_text = Some(text.to_string());
        m
    }

    #[test]
    fn test_sidechain_inserted_after_first_matching_result() {
        let mut task_result = message(MessageKind::ToolResult);
        task_result.agent_id = Some("agent-x".to_string());
        task_result.raw_text = Some("final report".to_string());

        let trailing = message(MessageKind::User);

        let mut arena = vec![
            task_result,
            trailing,
            sidechain_assistant("agent-x", "working on it"),
            sidechain_assistant("agent-x", "final report"),
        ];
        let order: Vec<usize> = vec![0, 1, 2, 3];
        let reordered = reorder_sidechains(&mut arena, order);

        assert_eq!(reordered, vec![0, 2, 3, 1]);
        // The last sidechain assistant duplicated the Task result and got
        // replaced with the notice.
        assert!(matches!(
            arena[3].content,
            TemplateContent::DedupNotice { .. }
        ));
        assert!(arena[3].raw_text.is_none());
        assert!(arena[2].raw_text.is_some());
    }

    #[test]
    fn test_orphan_sidechain_appended_at_end() {
        let user = message(MessageKind::User);
        let mut arena = vec![user, sidechain_assistant("nobody", "hello")];
        let order: Vec<usize> = vec![0, 1];
        let reordered = reorder_sidechains(&mut arena, order);
        assert_eq!(reordered, vec![0, 1]);
    }

    #[test]
    fn test_second_result_with_same_agent_gets_nothing() {
        let mut first = message(MessageKind::ToolResult);
        first.agent_id = Some("a".to_string());
        let mut second = message(MessageKind::ToolResult);
        second.agent_id = Some("a".to_string());

        let mut arena = vec![first, second, sidechain_assistant("a", "report")];
        let order: Vec<usize> = vec![0, 1, 2];
        let reordered = reorder_sidechains(&mut arena, order);
        assert_eq!(reordered, vec![0, 2, 1]);
    }
}
