//! Host boundary: fetching a session's conversation and todos, and sending
//! toast notifications back.
//!
//! The production implementation reads the host's on-disk storage tree
//! (`storage/message/{session}/`, `storage/part/{session}/{message}/`,
//! `storage/todo/{session}.json`, `storage/session/{project}/{session}.json`)
//! and emits toast requests as JSON lines on stdout, which is the only thing
//! this process ever writes there.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Severity of a toast notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Success,
    Error,
}

impl NotifyLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            NotifyLevel::Info => "info",
            NotifyLevel::Success => "success",
            NotifyLevel::Error => "error",
        }
    }
}

/// One message of a session's conversation, with its text parts.
#[derive(Debug, Clone)]
pub struct HostMessage {
    pub role: String,
    pub parts: Vec<MessagePart>,
}

/// A text-bearing part of a message.
#[derive(Debug, Clone)]
pub struct MessagePart {
    pub kind: String,
    pub text: String,
    /// Auto-injected content (file dumps, tool-resource text) rather than
    /// something the user typed.
    pub synthetic: bool,
}

/// One todo-list entry.
#[derive(Debug, Clone)]
pub struct TodoItem {
    pub content: String,
}

/// Failure talking to the host.
#[derive(Debug)]
pub enum HostError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for HostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostError::Io { path, source } => {
                write!(f, "host storage read failed at {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for HostError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HostError::Io { source, .. } => Some(source),
        }
    }
}

/// Everything the tracker needs from the host runtime.
pub trait Host {
    /// All messages of a session, oldest first.
    fn messages(&self, session_id: &str) -> Result<Vec<HostMessage>, HostError>;
    /// The session's todo list, in list order.
    fn todos(&self, session_id: &str) -> Result<Vec<TodoItem>, HostError>;
    /// The host's conversation summary title for the session, if any.
    fn session_title(&self, session_id: &str) -> Option<String>;
    /// Request a toast notification. Best-effort, never fails.
    fn notify(&self, message: &str, level: NotifyLevel);
}

/// Production [`Host`] backed by the host's storage directory.
#[derive(Debug, Clone)]
pub struct StorageHost {
    root: PathBuf,
}

#[derive(Debug, Deserialize)]
struct StoredMessage {
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StoredPart {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    synthetic: bool,
}

#[derive(Debug, Deserialize)]
struct StoredTodo {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StoredSession {
    #[serde(default)]
    title: Option<String>,
}

impl StorageHost {
    /// Default storage location under the invoking user's home directory.
    pub fn default_root() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Path::new(&home).join(".local/share/opencode/storage")
    }

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Read every `.json` file in `dir`, sorted by file name. Message and
    /// part ids sort chronologically, so name order is creation order.
    fn sorted_json_files(dir: &Path) -> Result<Vec<PathBuf>, HostError> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(HostError::Io {
                    path: dir.to_path_buf(),
                    source: e,
                })
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Parse one JSON file, skipping it with a debug log when malformed.
    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
        let contents = std::fs::read(path).ok()?;
        match serde_json::from_slice(&contents) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(
                    error = %e,
                    path = %path.display(),
                    "skipping malformed storage file"
                );
                None
            }
        }
    }

    fn parts_for(&self, session_id: &str, message_id: &str) -> Vec<MessagePart> {
        let dir = self.root.join("part").join(session_id).join(message_id);
        let files = match Self::sorted_json_files(&dir) {
            Ok(files) => files,
            Err(_) => return Vec::new(),
        };
        files
            .iter()
            .filter_map(|path| Self::read_json::<StoredPart>(path))
            .filter_map(|part| {
                let text = part.text?;
                Some(MessagePart {
                    kind: part.kind.unwrap_or_default(),
                    text,
                    synthetic: part.synthetic,
                })
            })
            .collect()
    }
}

impl Host for StorageHost {
    fn messages(&self, session_id: &str) -> Result<Vec<HostMessage>, HostError> {
        let dir = self.root.join("message").join(session_id);
        let mut messages = Vec::new();
        for path in Self::sorted_json_files(&dir)? {
            let Some(stored) = Self::read_json::<StoredMessage>(&path) else {
                continue;
            };
            let message_id = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            messages.push(HostMessage {
                role: stored.role.unwrap_or_default(),
                parts: self.parts_for(session_id, &message_id),
            });
        }
        Ok(messages)
    }

    fn todos(&self, session_id: &str) -> Result<Vec<TodoItem>, HostError> {
        let path = self.root.join("todo").join(format!("{session_id}.json"));
        if !path.exists() {
            return Ok(Vec::new());
        }
        let todos: Vec<StoredTodo> = Self::read_json(&path).unwrap_or_default();
        Ok(todos
            .into_iter()
            .filter_map(|t| t.content)
            .map(|content| TodoItem { content })
            .collect())
    }

    fn session_title(&self, session_id: &str) -> Option<String> {
        // Session files are grouped by project directory; scan them all.
        let session_root = self.root.join("session");
        let projects = std::fs::read_dir(&session_root).ok()?;
        for project in projects.filter_map(|e| e.ok()) {
            let candidate = project.path().join(format!("{session_id}.json"));
            if candidate.exists() {
                return Self::read_json::<StoredSession>(&candidate)
                    .and_then(|s| s.title)
                    .filter(|t| !t.is_empty());
            }
        }
        None
    }

    fn notify(&self, message: &str, level: NotifyLevel) {
        let payload = serde_json::json!({
            "type": "toast",
            "message": message,
            "variant": level.as_str(),
        });
        println!("{payload}");
    }
}
