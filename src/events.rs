//! Host event shapes for the stdin hook protocol.
//!
//! The host emits one JSON object per line, tagged on `"type"`. Each event
//! kind carries its own payload struct rather than a shared property bag, so
//! handlers never probe for fields that cannot exist for their kind.

use serde::Deserialize;
use serde_json::Value;

/// One host-emitted event, discriminated by the `type` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum HostEvent {
    /// A tool invocation finished.
    #[serde(rename = "tool.execute.after")]
    ToolExecuteAfter(ToolExecuteAfter),
    /// A message was created or updated.
    #[serde(rename = "message.updated")]
    MessageUpdated(MessageUpdated),
    /// A message part was created or updated.
    #[serde(rename = "message.part.updated")]
    MessagePartUpdated(MessagePartUpdated),
    /// The session went idle.
    #[serde(rename = "session.idle")]
    SessionIdle(SessionRef),
    /// The session was deleted by the user.
    #[serde(rename = "session.deleted")]
    SessionDeleted(SessionRef),
}

impl HostEvent {
    /// The session this event belongs to.
    pub fn session_id(&self) -> &str {
        match self {
            HostEvent::ToolExecuteAfter(e) => &e.session_id,
            HostEvent::MessageUpdated(e) => &e.session_id,
            HostEvent::MessagePartUpdated(e) => &e.session_id,
            HostEvent::SessionIdle(e) | HostEvent::SessionDeleted(e) => &e.session_id,
        }
    }
}

/// Payload for `tool.execute.after`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolExecuteAfter {
    pub session_id: String,
    pub tool: String,
    #[serde(default)]
    pub output: Option<ToolOutput>,
}

/// Execution output attached to a finished tool call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolOutput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl ToolOutput {
    /// Best-effort file path for this execution.
    ///
    /// Checks the metadata keys `filePath`, `filepath` and `file`, then a
    /// nested `filediff.file`, and finally falls back to the display title.
    pub fn file_hint(&self) -> Option<String> {
        if let Some(meta) = &self.metadata {
            for key in ["filePath", "filepath", "file"] {
                if let Some(path) = meta.get(key).and_then(Value::as_str) {
                    if !path.is_empty() {
                        return Some(path.to_string());
                    }
                }
            }
            if let Some(path) = meta
                .get("filediff")
                .and_then(|d| d.get("file"))
                .and_then(Value::as_str)
            {
                if !path.is_empty() {
                    return Some(path.to_string());
                }
            }
        }
        self.title.clone().filter(|t| !t.is_empty())
    }
}

/// Payload for `message.updated`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageUpdated {
    pub session_id: String,
    pub role: String,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub provider_id: Option<String>,
    /// Execution mode, i.e. which agent produced the message.
    #[serde(default)]
    pub mode: Option<String>,
}

/// Payload for `message.part.updated`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagePartUpdated {
    pub session_id: String,
    pub part_type: String,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub tokens: Option<PartTokens>,
    #[serde(default)]
    pub cost: Option<f64>,
}

/// Token breakdown attached to a `step-finish` part.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PartTokens {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(default)]
    pub reasoning: u64,
    #[serde(default)]
    pub cache: CacheTokens,
}

/// Cache read/write token counts.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct CacheTokens {
    #[serde(default)]
    pub read: u64,
    #[serde(default)]
    pub write: u64,
}

/// Session-scoped lifecycle payload (`session.idle`, `session.deleted`).
#[derive(Debug, Clone, Deserialize)]
pub struct SessionRef {
    pub session_id: String,
}
