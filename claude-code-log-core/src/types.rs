//! Transcript record types for Claude Code JSONL logs
//!
//! Each line of a transcript file is one record, discriminated by its
//! `type` field. The discriminator space is closed: unknown record types
//! are skipped at load time rather than modeled as an open variant.
//!
//! Content items inside a message (`text`, `tool_use`, `tool_result`,
//! `thinking`, `image`) form a second closed sum type, [`ContentItem`].

use serde::{Deserialize, Serialize};

// ============================================
// Records
// ============================================

/// One transcript record, tagged by the JSONL `type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TranscriptRecord {
    #[serde(rename = "user")]
    User(UserRecord),
    #[serde(rename = "assistant")]
    Assistant(AssistantRecord),
    #[serde(rename = "summary")]
    Summary(SummaryRecord),
    #[serde(rename = "system")]
    System(SystemRecord),
    #[serde(rename = "queue-operation")]
    QueueOperation(QueueOperationRecord),
}

impl TranscriptRecord {
    /// The discriminator string as stored in the cache.
    pub fn kind(&self) -> &'static str {
        match self {
            TranscriptRecord::User(_) => "user",
            TranscriptRecord::Assistant(_) => "assistant",
            TranscriptRecord::Summary(_) => "summary",
            TranscriptRecord::System(_) => "system",
            TranscriptRecord::QueueOperation(_) => "queue-operation",
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            TranscriptRecord::User(r) => r.session_id.as_deref(),
            TranscriptRecord::Assistant(r) => r.session_id.as_deref(),
            TranscriptRecord::Summary(_) => None,
            TranscriptRecord::System(r) => r.session_id.as_deref(),
            TranscriptRecord::QueueOperation(r) => r.session_id.as_deref(),
        }
    }

    pub fn uuid(&self) -> Option<&str> {
        match self {
            TranscriptRecord::User(r) => r.uuid.as_deref(),
            TranscriptRecord::Assistant(r) => r.uuid.as_deref(),
            TranscriptRecord::Summary(_) => None,
            TranscriptRecord::System(r) => r.uuid.as_deref(),
            TranscriptRecord::QueueOperation(r) => r.uuid.as_deref(),
        }
    }

    pub fn parent_uuid(&self) -> Option<&str> {
        match self {
            TranscriptRecord::User(r) => r.parent_uuid.as_deref(),
            TranscriptRecord::Assistant(r) => r.parent_uuid.as_deref(),
            TranscriptRecord::Summary(_) => None,
            TranscriptRecord::System(r) => r.parent_uuid.as_deref(),
            TranscriptRecord::QueueOperation(_) => None,
        }
    }

    pub fn timestamp(&self) -> Option<&str> {
        match self {
            TranscriptRecord::User(r) => r.timestamp.as_deref(),
            TranscriptRecord::Assistant(r) => r.timestamp.as_deref(),
            TranscriptRecord::Summary(_) => None,
            TranscriptRecord::System(r) => r.timestamp.as_deref(),
            TranscriptRecord::QueueOperation(r) => r.timestamp.as_deref(),
        }
    }

    pub fn cwd(&self) -> Option<&str> {
        match self {
            TranscriptRecord::User(r) => r.cwd.as_deref(),
            TranscriptRecord::Assistant(r) => r.cwd.as_deref(),
            TranscriptRecord::System(r) => r.cwd.as_deref(),
            _ => None,
        }
    }

    pub fn is_sidechain(&self) -> bool {
        match self {
            TranscriptRecord::User(r) => r.is_sidechain.unwrap_or(false),
            TranscriptRecord::Assistant(r) => r.is_sidechain.unwrap_or(false),
            TranscriptRecord::System(r) => r.is_sidechain.unwrap_or(false),
            _ => false,
        }
    }

    pub fn is_meta(&self) -> bool {
        match self {
            TranscriptRecord::User(r) => r.is_meta.unwrap_or(false),
            TranscriptRecord::System(r) => r.is_meta.unwrap_or(false),
            _ => false,
        }
    }

    pub fn agent_id(&self) -> Option<&str> {
        match self {
            TranscriptRecord::User(r) => r.agent_id.as_deref(),
            TranscriptRecord::Assistant(r) => r.agent_id.as_deref(),
            TranscriptRecord::System(r) => r.agent_id.as_deref(),
            _ => None,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            TranscriptRecord::Assistant(r) => r.request_id.as_deref(),
            _ => None,
        }
    }

    /// Content items of the record's message body, if it has one.
    pub fn content_items(&self) -> Option<Vec<ContentItem>> {
        match self {
            TranscriptRecord::User(r) => Some(r.message.content.items()),
            TranscriptRecord::Assistant(r) => Some(r.message.content.clone()),
            TranscriptRecord::QueueOperation(r) => {
                Some(r.content.as_ref().map(|c| c.items()).unwrap_or_default())
            }
            _ => None,
        }
    }
}

/// A `user` record: human prompts, tool results, and slash-command traffic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserRecord {
    pub uuid: Option<String>,
    pub parent_uuid: Option<String>,
    pub session_id: Option<String>,
    pub timestamp: Option<String>,
    pub cwd: Option<String>,
    pub version: Option<String>,
    pub user_type: Option<String>,
    pub is_sidechain: Option<bool>,
    pub is_meta: Option<bool>,
    pub agent_id: Option<String>,
    pub message: UserMessage,
}

/// An `assistant` record: model output, tool calls, thinking blocks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssistantRecord {
    pub uuid: Option<String>,
    pub parent_uuid: Option<String>,
    pub session_id: Option<String>,
    pub timestamp: Option<String>,
    pub cwd: Option<String>,
    pub version: Option<String>,
    pub is_sidechain: Option<bool>,
    pub agent_id: Option<String>,
    pub request_id: Option<String>,
    pub message: AssistantMessage,
}

/// A `summary` record: anchors a conversation summary to a leaf message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummaryRecord {
    pub summary: String,
    pub leaf_uuid: Option<String>,
}

/// A `system` record: editor notices with a severity level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemRecord {
    pub uuid: Option<String>,
    pub parent_uuid: Option<String>,
    pub session_id: Option<String>,
    pub timestamp: Option<String>,
    pub cwd: Option<String>,
    pub is_sidechain: Option<bool>,
    pub is_meta: Option<bool>,
    pub agent_id: Option<String>,
    pub subtype: Option<String>,
    pub level: Option<String>,
    pub content: Option<String>,
}

/// A `queue-operation` record. Only the `remove` operation is rendered
/// (as a user "steering" message); other operations are bookkeeping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueOperationRecord {
    pub uuid: Option<String>,
    pub session_id: Option<String>,
    pub timestamp: Option<String>,
    pub operation: String,
    pub content: Option<MessageContent>,
}

// ============================================
// Message bodies
// ============================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserMessage {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantMessage {
    pub id: Option<String>,
    pub role: String,
    pub model: Option<String>,
    pub content: Vec<ContentItem>,
    pub usage: Option<Usage>,
}

/// User message content is either a bare string or a list of blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentItem>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Blocks(Vec::new())
    }
}

impl MessageContent {
    /// Normalize to a block list; a bare string becomes one text item.
    pub fn items(&self) -> Vec<ContentItem> {
        match self {
            MessageContent::Text(s) => {
                if s.trim().is_empty() {
                    Vec::new()
                } else {
                    vec![ContentItem::Text { text: s.clone() }]
                }
            }
            MessageContent::Blocks(items) => items.clone(),
        }
    }
}

/// One content block inside a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
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
        #[serde(default)]
        content: serde_json::Value,
        #[serde(default)]
        is_error: Option<bool>,
    },
    Thinking {
        thinking: String,
        #[serde(default)]
        signature: Option<String>,
    },
    Image {
        source: ImageSource,
    },
    #[serde(other)]
    Unknown,
}

/// Source descriptor for an image content block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub media_type: String,
    pub data: Option<String>,
}

/// Token usage counters on an assistant message. All nullable: older
/// transcripts omit the cache counters entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub cache_creation_input_tokens: Option<i64>,
    pub cache_read_input_tokens: Option<i64>,
}

// ============================================
// Parsed record wrapper
// ============================================

/// A record paired with its original JSON value.
///
/// The raw value is what the cache compresses and preserves; the typed
/// record is what the pipeline works with. The two must describe the
/// same line.
#[derive(Debug, Clone)]
pub struct ParsedRecord {
    pub record: TranscriptRecord,
    pub raw: serde_json::Value,
}

impl ParsedRecord {
    /// Build from a typed record, deriving the raw value from it.
    /// Used by tests and by callers that synthesize records.
    pub fn from_record(record: TranscriptRecord) -> crate::error::Result<Self> {
        let raw = serde_json::to_value(&record)?;
        Ok(Self { record, raw })
    }
}

// ============================================
// Text extraction
// ============================================

/// Join the text blocks of a content list, skipping thinking blocks.
pub fn extract_text_content(items: &[ContentItem]) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for item in items {
        if let ContentItem::Text { text } = item {
            parts.push(text);
        }
    }
    parts.join("\n")
}

/// True when the content list carries anything worth rendering.
pub fn has_renderable_content(items: &[ContentItem]) -> bool {
    items.iter().any(|item| match item {
        ContentItem::Text { text } => !text.trim().is_empty(),
        ContentItem::ToolUse { .. }
        | ContentItem::ToolResult { .. }
        | ContentItem::Thinking { .. }
        | ContentItem::Image { .. } => true,
        ContentItem::Unknown => false,
    })
}
