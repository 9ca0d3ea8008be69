/// Ticket extraction: scan session conversation text and todo items for a
/// work-item key like `PROJ-123`.
///
/// Looks at user-authored message text first (newest first, skipping
/// synthetic parts so example patterns inside pasted documents don't count),
/// then todo items. Host fetch failures degrade to "no match".
use regex::Regex;
use std::sync::LazyLock;

use crate::host::Host;

/// Two-or-more uppercase letters, a hyphen, digits. Single-letter prefixes
/// like `X-9` never match.
static DEFAULT_TICKET_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]{2,}-[0-9]+\b").unwrap());

/// Common tokens that look like ticket keys but never are. Only consulted for
/// the default pattern; a configured project whitelist overrides this.
const NON_TICKET_PREFIXES: &[&str] = &["UTF", "ISO", "SHA", "AES", "RSA", "IPV"];

/// Finds ticket keys in session text, optionally restricted to a set of
/// configured project prefixes.
#[derive(Debug)]
pub struct TicketExtractor {
    /// Present when `valid_projects` is configured; replaces the default
    /// pattern with an alternation of the literal prefixes.
    project_pattern: Option<Regex>,
}

impl TicketExtractor {
    pub fn new(valid_projects: Option<&[String]>) -> Self {
        let project_pattern = valid_projects.and_then(|prefixes| {
            let prefixes: Vec<String> = prefixes
                .iter()
                .filter(|p| !p.is_empty())
                .map(|p| regex::escape(p))
                .collect();
            if prefixes.is_empty() {
                return None;
            }
            let pattern = format!(r"\b(?:{})-[0-9]+\b", prefixes.join("|"));
            match Regex::new(&pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(error = %e, "invalid valid_projects pattern, using default");
                    None
                }
            }
        });
        Self { project_pattern }
    }

    /// First ticket-like token found for this session, or None.
    pub fn extract(&self, host: &dyn Host, session_id: &str) -> Option<String> {
        if let Some(ticket) = self.extract_from_messages(host, session_id) {
            return Some(ticket);
        }
        self.extract_from_todos(host, session_id)
    }

    fn extract_from_messages(&self, host: &dyn Host, session_id: &str) -> Option<String> {
        let messages = match host.messages(session_id) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::debug!(error = %e, session_id, "message fetch failed during extraction");
                return None;
            }
        };

        for message in messages.iter().rev() {
            if message.role != "user" {
                continue;
            }
            for part in message.parts.iter().rev() {
                if part.kind != "text" || part.synthetic {
                    continue;
                }
                if let Some(ticket) = self.find_ticket(&part.text) {
                    return Some(ticket);
                }
            }
        }
        None
    }

    fn extract_from_todos(&self, host: &dyn Host, session_id: &str) -> Option<String> {
        let todos = match host.todos(session_id) {
            Ok(todos) => todos,
            Err(e) => {
                tracing::debug!(error = %e, session_id, "todo fetch failed during extraction");
                return None;
            }
        };

        todos
            .iter()
            .rev()
            .find_map(|todo| self.find_ticket(&todo.content))
    }

    /// First acceptable ticket token in `text`.
    pub fn find_ticket(&self, text: &str) -> Option<String> {
        if let Some(pattern) = &self.project_pattern {
            return pattern.find(text).map(|m| m.as_str().to_string());
        }

        DEFAULT_TICKET_PATTERN
            .find_iter(text)
            .map(|m| m.as_str())
            .find(|token| {
                let prefix = token.split('-').next().unwrap_or("");
                !NON_TICKET_PREFIXES.contains(&prefix)
            })
            .map(str::to_string)
    }
}
