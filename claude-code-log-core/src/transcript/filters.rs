//! Message text classification
//!
//! Transcript user messages smuggle several kinds of editor traffic in
//! their text bodies, marked by XML-ish tags or known prefixes. These
//! helpers classify them for filtering, pairing, and preview selection.

use crate::types::{extract_text_content, ParsedRecord, TranscriptRecord};
use std::collections::{HashMap, HashSet};

/// Marker left by the editor when it injects local-command context.
const LOCAL_COMMAND_CAVEAT: &str =
    "Caveat: The messages below were generated by the user while running local commands";

/// Prefix of a synthetic user message standing in for a compacted
/// (previously compressed) conversation.
const COMPACTED_PREFIX: &str = "This session is being continued from a previous conversation";

/// Maximum length of the first-user-message preview.
pub const FIRST_USER_MESSAGE_PREVIEW_LENGTH: usize = 1000;

/// Slash command invocation, e.g. `/context` (rendered as a user message).
pub fn is_command_message(text: &str) -> bool {
    text.contains("<command-name>")
}

/// Output of a slash command.
pub fn is_local_command_output(text: &str) -> bool {
    text.contains("<local-command-stdout>")
}

/// Bash input typed through the `!` prefix.
pub fn is_bash_input(text: &str) -> bool {
    text.contains("<bash-input>")
}

/// Output of a bash input message.
pub fn is_bash_output(text: &str) -> bool {
    text.contains("<bash-stdout>") || text.contains("<bash-stderr>")
}

/// Editor-generated system noise carried in user messages.
pub fn is_system_message(text: &str) -> bool {
    text.starts_with(LOCAL_COMMAND_CAVEAT)
        || text.starts_with("[Request interrupted by user")
        || text.contains("<system-reminder>")
}

/// Synthetic compacted-conversation summary message.
pub fn is_compacted_summary(text: &str) -> bool {
    text.starts_with(COMPACTED_PREFIX)
}

/// Centralized skip rule: system noise that is neither a slash command
/// nor command output does not render.
pub fn should_skip_message(text: &str) -> bool {
    is_system_message(text) && !is_command_message(text) && !is_local_command_output(text)
}

/// Whether a user message text qualifies as the session-starter preview.
/// Warmup, system noise, and slash commands do not; the `init` command is
/// the exception.
pub fn should_use_as_session_starter(text: &str) -> bool {
    if text.trim() == "Warmup" {
        return false;
    }
    if is_system_message(text) {
        return false;
    }
    if text.contains("<command-name>") {
        return text.contains("<command-name>init");
    }
    true
}

/// Truncated preview of the first user message for session lists.
pub fn create_session_preview(text: &str) -> String {
    let preview = if text.contains("<command-name>init") && text.contains("<command-contents>") {
        "Claude Initializes Codebase Documentation Guide (/init command)".to_string()
    } else {
        text.to_string()
    };

    if preview.chars().count() > FIRST_USER_MESSAGE_PREVIEW_LENGTH {
        let truncated: String = preview.chars().take(FIRST_USER_MESSAGE_PREVIEW_LENGTH).collect();
        format!("{}...", truncated)
    } else {
        preview
    }
}

/// Session ids whose every user message is exactly `Warmup`.
/// Such sessions are editor keep-alives and drop out of rendering.
pub fn get_warmup_session_ids(records: &[ParsedRecord]) -> HashSet<String> {
    let mut session_user_texts: HashMap<String, Vec<String>> = HashMap::new();

    for entry in records {
        if let TranscriptRecord::User(user) = &entry.record {
            if let Some(session_id) = &user.session_id {
                let text = extract_text_content(&user.message.content.items())
                    .trim()
                    .to_string();
                session_user_texts
                    .entry(session_id.clone())
                    .or_default()
                    .push(text);
            }
        }
    }

    session_user_texts
        .into_iter()
        .filter(|(_, texts)| !texts.is_empty() && texts.iter().all(|t| t == "Warmup"))
        .map(|(session_id, _)| session_id)
        .collect()
}
