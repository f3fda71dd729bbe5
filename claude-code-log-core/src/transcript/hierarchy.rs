//! Hierarchy assignment, child counting, and tree linking
//!
//! Levels are positional, derived from message kind and modifiers after
//! all reordering; parent-uuid references play no part here. A stack
//! walk turns the level sequence into ancestry lists, a second pass
//! accumulates child counters, and a third pass materializes explicit
//! parent-to-children edges.

use crate::transcript::{MessageKind, PairRole, TemplateMessage};
use std::collections::HashMap;

/// Nesting level by kind and modifiers:
///
/// | Level | Contents |
/// |---|---|
/// | 0 | session headers |
/// | 1 | user messages (non-sidechain) |
/// | 2 | main assistant, main thinking, system commands/errors |
/// | 3 | main tool use/result, system info/warning |
/// | 4 | sidechain assistant and thinking |
/// | 5 | sidechain tool use and tool result |
fn hierarchy_level(message: &TemplateMessage) -> usize {
    if message.is_session_header() {
        return 0;
    }

    let sidechain = message.modifiers.is_sidechain;
    match message.kind {
        MessageKind::User if !sidechain => 1,
        MessageKind::System if !sidechain => {
            match message.modifiers.system_level.as_deref() {
                Some("info") | Some("warning") => 3,
                _ => 2,
            }
        }
        MessageKind::Assistant | MessageKind::Thinking => {
            if sidechain {
                4
            } else {
                2
            }
        }
        MessageKind::ToolUse | MessageKind::ToolResult => {
            if sidechain {
                5
            } else {
                3
            }
        }
        _ => 1,
    }
}

/// Assign message ids and ancestry from the final display order.
///
/// Session headers get a session-stable id for navigation anchors;
/// everything else gets a counter-based id.
pub(crate) fn assign_hierarchy(arena: &mut [TemplateMessage], order: &[usize]) {
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut counter = 0usize;

    for &index in order {
        let level = hierarchy_level(&arena[index]);

        while stack.last().map(|(l, _)| *l >= level).unwrap_or(false) {
            stack.pop();
        }

        let message_id = if arena[index].is_session_header() && !arena[index].session_id.is_empty()
        {
            format!("session-{}", arena[index].session_id)
        } else {
            let id = format!("d-{}", counter);
            counter += 1;
            id
        };

        arena[index].ancestry = stack.iter().map(|(_, id)| id.clone()).collect();
        arena[index].message_id = message_id.clone();
        stack.push((level, message_id));
    }
}

/// Accumulate immediate-children and total-descendant counters on every
/// ancestor. Pair-last messages do not count: a pair displays as one
/// unit, so only its first message contributes.
pub(crate) fn count_children(arena: &mut [TemplateMessage], order: &[usize]) {
    let index_by_id: HashMap<String, usize> = order
        .iter()
        .map(|&index| (arena[index].message_id.clone(), index))
        .collect();

    for &index in order {
        if arena[index].ancestry.is_empty() {
            continue;
        }
        if arena[index].pair_role == Some(PairRole::Last) {
            continue;
        }

        let ancestry = arena[index].ancestry.clone();
        let count_key = arena[index].kind.count_key();

        if let Some(&parent) = ancestry.last().and_then(|id| index_by_id.get(id)) {
            arena[parent].immediate_children_count += 1;
            arena[parent].has_children = true;
            *arena[parent]
                .immediate_children_by_type
                .entry(count_key)
                .or_insert(0) += 1;
        }

        for ancestor_id in &ancestry {
            if let Some(&ancestor) = index_by_id.get(ancestor_id) {
                arena[ancestor].total_descendants_count += 1;
                *arena[ancestor]
                    .total_descendants_by_type
                    .entry(count_key)
                    .or_insert(0) += 1;
            }
        }
    }
}

/// Populate children edges from ancestry and return the root indices.
pub(crate) fn link_tree(arena: &mut [TemplateMessage], order: &[usize]) -> Vec<usize> {
    let index_by_id: HashMap<String, usize> = order
        .iter()
        .map(|&index| (arena[index].message_id.clone(), index))
        .collect();

    for &index in order {
        arena[index].children.clear();
    }

    let mut roots = Vec::new();
    for &index in order {
        match arena[index].ancestry.last() {
            None => roots.push(index),
            Some(parent_id) => {
                if let Some(&parent) = index_by_id.get(parent_id) {
                    arena[parent].children.push(index);
                } else {
                    roots.push(index);
                }
            }
        }
    }
    roots
}
