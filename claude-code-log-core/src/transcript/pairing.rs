//! Message pair identification and reordering
//!
//! A pair is two messages displayed as one unit: a slash command and its
//! output, a bash command and its result, a thinking block and the
//! assistant reply, or a tool use and its result. Adjacent rules consume
//! both messages; indexed rules match at any distance within a session.

use crate::timeutil::format_pair_duration;
use crate::transcript::{MessageKind, PairRole, TemplateMessage};
use std::collections::{HashMap, HashSet};

/// Lookup indices for pairing, built in one pass. Values are arena
/// indices.
struct PairingIndices {
    /// (session_id, tool_use_id) -> tool_result message
    tool_result: HashMap<(String, String), usize>,
    /// uuid -> system message
    system_by_uuid: HashMap<String, usize>,
    /// parent_uuid -> slash-command user message
    slash_by_parent: HashMap<String, usize>,
}

fn build_pairing_indices(arena: &[TemplateMessage], order: &[usize]) -> PairingIndices {
    let mut tool_result = HashMap::new();
    let mut system_by_uuid = HashMap::new();
    let mut slash_by_parent = HashMap::new();

    for &index in order {
        let message = &arena[index];

        if let Some(tool_use_id) = &message.tool_use_id {
            if !message.session_id.is_empty() && message.kind == MessageKind::ToolResult {
                tool_result.insert((message.session_id.clone(), tool_use_id.clone()), index);
            }
        }

        if message.kind == MessageKind::System {
            if let Some(uuid) = &message.uuid {
                system_by_uuid.insert(uuid.clone(), index);
            }
        }

        if message.modifiers.is_slash_command {
            if let Some(parent_uuid) = &message.parent_uuid {
                slash_by_parent.insert(parent_uuid.clone(), index);
            }
        }
    }

    PairingIndices {
        tool_result,
        system_by_uuid,
        slash_by_parent,
    }
}

fn mark_pair(arena: &mut [TemplateMessage], first: usize, last: usize) {
    arena[first].pair_role = Some(PairRole::First);
    arena[last].pair_role = Some(PairRole::Last);
}

/// Adjacent pairing rules. Returns true when the two messages paired.
fn try_pair_adjacent(arena: &mut [TemplateMessage], current: usize, next: usize) -> bool {
    let paired = {
        let a = &arena[current];
        let b = &arena[next];
        (a.modifiers.is_slash_command && b.modifiers.is_command_output)
            || (a.kind == MessageKind::BashInput && b.kind == MessageKind::BashOutput)
            || (a.kind == MessageKind::Thinking && b.kind == MessageKind::Assistant)
    };
    if paired {
        mark_pair(arena, current, next);
    }
    paired
}

/// Indexed pairing rules; these do not consume the scan position.
fn try_pair_by_index(arena: &mut [TemplateMessage], indices: &PairingIndices, current: usize) {
    // Tool use + tool result, keyed within the session so resumed-session
    // copies never pair across sessions.
    if arena[current].kind == MessageKind::ToolUse {
        let key = match (&arena[current].session_id, &arena[current].tool_use_id) {
            (session_id, Some(tool_use_id)) if !session_id.is_empty() => {
                Some((session_id.clone(), tool_use_id.clone()))
            }
            _ => None,
        };
        if let Some(key) = key {
            if let Some(&result_index) = indices.tool_result.get(&key) {
                mark_pair(arena, current, result_index);
            }
        }
    }

    if arena[current].kind == MessageKind::System {
        // System child finding its parent via parent_uuid.
        if let Some(parent_uuid) = arena[current].parent_uuid.clone() {
            if let Some(&parent_index) = indices.system_by_uuid.get(&parent_uuid) {
                mark_pair(arena, parent_index, current);
            }
        }
        // System command finding the slash command whose parent it is.
        if let Some(uuid) = arena[current].uuid.clone() {
            if let Some(&slash_index) = indices.slash_by_parent.get(&uuid) {
                mark_pair(arena, current, slash_index);
            }
        }
    }
}

/// Identify and mark message pairs in display order.
pub(crate) fn identify_pairs(arena: &mut Vec<TemplateMessage>, order: &[usize]) {
    let indices = build_pairing_indices(arena, order);

    let mut position = 0;
    while position < order.len() {
        let current = order[position];

        if arena[current].is_session_header() {
            position += 1;
            continue;
        }

        if position + 1 < order.len() && try_pair_adjacent(arena, current, order[position + 1]) {
            position += 2;
            continue;
        }

        try_pair_by_index(arena, &indices, current);
        position += 1;
    }
}

/// Move every pair's last message to immediately follow its first,
/// recording the pair duration. Everything else keeps its order.
pub(crate) fn reorder_pairs(arena: &mut [TemplateMessage], order: Vec<usize>) -> Vec<usize> {
    // Index pair-last messages by (session_id, tool_use_id) and by
    // parent_uuid for slash commands.
    let mut last_by_tool: HashMap<(String, String), usize> = HashMap::new();
    let mut last_by_parent: HashMap<String, usize> = HashMap::new();

    for &index in &order {
        let message = &arena[index];
        if message.pair_role != Some(PairRole::Last) {
            continue;
        }
        if let Some(tool_use_id) = &message.tool_use_id {
            if !message.session_id.is_empty() {
                last_by_tool.insert((message.session_id.clone(), tool_use_id.clone()), index);
            }
        }
        if message.modifiers.is_slash_command {
            if let Some(parent_uuid) = &message.parent_uuid {
                last_by_parent.insert(parent_uuid.clone(), index);
            }
        }
    }

    let mut result: Vec<usize> = Vec::with_capacity(order.len());
    let mut consumed: HashSet<usize> = HashSet::new();

    for &index in &order {
        if consumed.contains(&index) {
            continue;
        }
        result.push(index);

        if arena[index].pair_role != Some(PairRole::First) {
            continue;
        }

        let mut last: Option<usize> = None;
        if let Some(tool_use_id) = arena[index].tool_use_id.clone() {
            if !arena[index].session_id.is_empty() {
                let key = (arena[index].session_id.clone(), tool_use_id);
                last = last_by_tool.get(&key).copied();
            }
        }
        if last.is_none() {
            if let Some(uuid) = arena[index].uuid.clone() {
                last = last_by_parent.get(&uuid).copied();
            }
        }

        let Some(last_index) = last else {
            continue;
        };
        if consumed.contains(&last_index) {
            continue;
        }

        result.push(last_index);
        consumed.insert(last_index);

        // Adjacency within the pair shows how long the operation took.
        let duration = match (
            arena[index].raw_timestamp.as_deref(),
            arena[last_index].raw_timestamp.as_deref(),
        ) {
            (Some(first_ts), Some(last_ts)) => format_pair_duration(first_ts, last_ts),
            _ => None,
        };
        arena[last_index].pair_duration = duration;
    }

    result
}
