/// In-memory session store: one aggregated state per live session id,
/// created on first event, removed exactly once at finalization.
use chrono::{DateTime, Local};
use std::collections::HashMap;

use crate::events::PartTokens;

/// Cumulative token counts for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenTally {
    pub input: u64,
    pub output: u64,
    pub reasoning: u64,
    pub cache_read: u64,
    pub cache_write: u64,
}

impl TokenTally {
    /// Tokens counted toward the CSV `tokens_used` field.
    pub fn used(&self) -> u64 {
        self.input + self.output + self.reasoning
    }

    /// Whether any counter is positive.
    pub fn any(&self) -> bool {
        self.input > 0
            || self.output > 0
            || self.reasoning > 0
            || self.cache_read > 0
            || self.cache_write > 0
    }

    pub fn add(&mut self, delta: &PartTokens) {
        self.input += delta.input;
        self.output += delta.output;
        self.reasoning += delta.reasoning;
        self.cache_read += delta.cache.read;
        self.cache_write += delta.cache.write;
    }
}

/// One recorded tool invocation.
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub tool: String,
    pub at: DateTime<Local>,
    pub file: Option<String>,
}

/// Model identifiers detected from the first assistant message.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub model_id: String,
    pub provider_id: String,
}

/// Agent detected for the session, with the detection timestamp.
#[derive(Debug, Clone)]
pub struct AgentInfo {
    pub name: String,
    pub detected_at: DateTime<Local>,
}

/// Aggregated state for one live session.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub ticket: Option<String>,
    pub start: DateTime<Local>,
    pub activities: Vec<ActivityRecord>,
    pub tokens: TokenTally,
    pub cost: f64,
    pub model: Option<ModelInfo>,
    pub agent: Option<AgentInfo>,
}

impl SessionState {
    fn new(ticket: Option<String>) -> Self {
        Self {
            ticket,
            start: Local::now(),
            activities: Vec::new(),
            tokens: TokenTally::default(),
            cost: 0.0,
            model: None,
            agent: None,
        }
    }

    /// Whether this session has anything worth logging.
    pub fn has_recorded_work(&self) -> bool {
        !self.activities.is_empty() || self.tokens.any()
    }
}

/// Owns the map from session id to [`SessionState`].
///
/// All mutation goes through these methods; the update operations are no-ops
/// for unknown ids since events can race with lifecycle boundaries.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<String, SessionState>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh state for `id`, or leave an existing one untouched.
    /// Returns the state now stored for `id`.
    pub fn create(&mut self, id: &str, ticket: Option<String>) -> &mut SessionState {
        self.sessions
            .entry(id.to_string())
            .or_insert_with(|| SessionState::new(ticket))
    }

    pub fn get(&self, id: &str) -> Option<&SessionState> {
        self.sessions.get(id)
    }

    pub fn has(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn add_activity(&mut self, id: &str, record: ActivityRecord) {
        if let Some(state) = self.sessions.get_mut(id) {
            state.activities.push(record);
        }
    }

    pub fn add_token_usage(&mut self, id: &str, delta: &PartTokens) {
        if let Some(state) = self.sessions.get_mut(id) {
            state.tokens.add(delta);
        }
    }

    pub fn add_cost(&mut self, id: &str, cost: f64) {
        if let Some(state) = self.sessions.get_mut(id) {
            state.cost += cost;
        }
    }

    /// Set the ticket only when `ticket` is Some; a later extraction that
    /// finds nothing never clears an earlier discovery.
    pub fn update_ticket(&mut self, id: &str, ticket: Option<String>) {
        if let (Some(state), Some(ticket)) = (self.sessions.get_mut(id), ticket) {
            state.ticket = Some(ticket);
        }
    }

    /// First detected model wins.
    pub fn set_model(&mut self, id: &str, model: ModelInfo) {
        if let Some(state) = self.sessions.get_mut(id) {
            if state.model.is_none() {
                state.model = Some(model);
            }
        }
    }

    /// First detected agent wins; later switches are ignored.
    pub fn set_agent(&mut self, id: &str, name: &str) {
        if let Some(state) = self.sessions.get_mut(id) {
            if state.agent.is_none() {
                state.agent = Some(AgentInfo {
                    name: name.to_string(),
                    detected_at: Local::now(),
                });
            }
        }
    }

    pub fn delete(&mut self, id: &str) {
        self.sessions.remove(id);
    }

    /// Remove and return the state in one step, so a duplicated idle event
    /// finds nothing to finalize.
    pub fn get_and_delete(&mut self, id: &str) -> Option<SessionState> {
        self.sessions.remove(id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}
