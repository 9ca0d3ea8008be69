//! Event dispatch: drives session accumulation from host events and
//! finalizes sessions into CSV rows when they go idle.
//!
//! Nothing here propagates an error to the host. Failures either degrade
//! quietly (log only) or surface as a toast, and in-memory state is always
//! discarded at finalization so a lost write cannot queue up forever.

use chrono::Local;
use std::path::Path;

use crate::config::TimeTrackingConfig;
use crate::csv::{resolve_csv_path, CsvRecord, CsvWriter};
use crate::describe;
use crate::events::{HostEvent, MessagePartUpdated, MessageUpdated, SessionRef, ToolExecuteAfter};
use crate::host::{Host, NotifyLevel};
use crate::resolver::{is_ignored_agent, TicketResolver};
use crate::session::{ActivityRecord, ModelInfo, SessionManager, SessionState};
use crate::ticket::TicketExtractor;

/// Ties the session store, extraction, resolution and the CSV log together
/// behind one event entry point.
pub struct Tracker<H: Host> {
    config: TimeTrackingConfig,
    host: H,
    sessions: SessionManager,
    extractor: TicketExtractor,
    writer: CsvWriter,
}

impl<H: Host> Tracker<H> {
    pub fn new(config: TimeTrackingConfig, host: H, project_root: &Path) -> Self {
        let extractor = TicketExtractor::new(config.valid_projects.as_deref());
        let writer = CsvWriter::new(resolve_csv_path(&config.csv_file, project_root));
        Self {
            config,
            host,
            sessions: SessionManager::new(),
            extractor,
            writer,
        }
    }

    /// One-time startup: make sure the CSV file and header are in place.
    pub fn activate(&self) {
        if let Err(e) = self.writer.ensure_header() {
            tracing::warn!(error = %e, "csv header setup failed");
            self.host
                .notify(&format!("Time tracking file setup failed: {e}"), NotifyLevel::Error);
        } else {
            tracing::info!(path = %self.writer.path().display(), "time tracking active");
        }
    }

    /// Entry point for every host event.
    pub fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::ToolExecuteAfter(e) => self.on_tool_execute(e),
            HostEvent::MessageUpdated(e) => self.on_message_updated(e),
            HostEvent::MessagePartUpdated(e) => self.on_message_part_updated(e),
            HostEvent::SessionIdle(e) => self.on_session_idle(e),
            HostEvent::SessionDeleted(e) => self.on_session_deleted(e),
        }
    }

    fn on_tool_execute(&mut self, event: ToolExecuteAfter) {
        let id = event.session_id.as_str();
        self.sessions.create(id, None);

        // Re-extract on every tool call; set-if-present keeps an earlier
        // discovery when this pass finds nothing.
        let ticket = self.extractor.extract(&self.host, id);
        self.sessions.update_ticket(id, ticket);

        let file = event.output.as_ref().and_then(|o| o.file_hint());
        self.sessions.add_activity(
            id,
            ActivityRecord {
                tool: event.tool,
                at: Local::now(),
                file,
            },
        );
    }

    fn on_message_updated(&mut self, event: MessageUpdated) {
        if event.role != "assistant" {
            return;
        }
        let id = event.session_id.as_str();
        self.sessions.create(id, None);

        if let (Some(model_id), Some(provider_id)) = (event.model_id, event.provider_id) {
            self.sessions.set_model(
                id,
                ModelInfo {
                    model_id,
                    provider_id,
                },
            );
        }
        if let Some(mode) = event.mode {
            self.sessions.set_agent(id, &mode);
        }
    }

    fn on_message_part_updated(&mut self, event: MessagePartUpdated) {
        if event.part_type != "step-finish" {
            return;
        }
        let id = event.session_id.as_str();
        self.sessions.create(id, None);

        if let Some(tokens) = event.tokens {
            self.sessions.add_token_usage(id, &tokens);
        }
        if let Some(cost) = event.cost {
            self.sessions.add_cost(id, cost);
        }
        if let Some(agent) = event.agent {
            self.sessions.set_agent(id, &agent);
        }
    }

    fn on_session_idle(&mut self, event: SessionRef) {
        let id = event.session_id.as_str();
        // Atomic pop: a second idle for the same id finds nothing.
        let Some(state) = self.sessions.get_and_delete(id) else {
            return;
        };
        if !state.has_recorded_work() {
            tracing::debug!(session_id = id, "idle session had no recorded work");
            return;
        }
        self.finalize(id, state);
    }

    fn on_session_deleted(&mut self, event: SessionRef) {
        // Deletion is purely a cleanup trigger; only idle ever writes.
        if self.sessions.has(&event.session_id) {
            tracing::debug!(session_id = %event.session_id, "discarding deleted session");
            self.sessions.delete(&event.session_id);
        }
    }

    fn finalize(&self, id: &str, state: SessionState) {
        let agent = state.agent.as_ref().map(|a| a.name.clone());

        if let Some(agent) = agent.as_deref() {
            if is_ignored_agent(agent, &self.config.ignored_agents) {
                tracing::info!(session_id = id, agent, "session by ignored agent, skipping");
                self.host.notify(
                    &format!("Session by {agent} not tracked"),
                    NotifyLevel::Info,
                );
                return;
            }
        }

        let end = Local::now();
        let duration_seconds = (end - state.start).num_seconds().max(0);

        let resolver = TicketResolver::new(&self.config);
        let resolved = resolver.resolve(state.ticket.as_deref(), agent.as_deref());

        let description = self
            .host
            .session_title(id)
            .unwrap_or_else(|| describe::generate(&state.activities));
        let tool_summary = describe::generate_tool_summary(&state.activities);
        let notes = if tool_summary.is_empty() {
            "Auto-tracked".to_string()
        } else {
            format!("Auto-tracked: {tool_summary}")
        };
        let model = state
            .model
            .as_ref()
            .map(|m| format!("{}/{}", m.provider_id, m.model_id))
            .unwrap_or_default();

        let record = CsvRecord {
            start: state.start,
            end,
            user: self.config.user_email.clone(),
            ticket: resolved.ticket.clone(),
            account_key: resolved.account_key,
            duration_seconds,
            tokens: state.tokens,
            description,
            notes,
            model,
            agent: agent.unwrap_or_default(),
            cost: state.cost,
        };

        match self.writer.write(&record) {
            Ok(()) => {
                let minutes = duration_seconds / 60;
                let ticket = resolved.ticket.as_deref().unwrap_or("no ticket");
                tracing::info!(
                    session_id = id,
                    duration_seconds,
                    tokens = state.tokens.used(),
                    ticket,
                    "session logged"
                );
                self.host.notify(
                    &format!(
                        "Logged {minutes}m · {} tokens · {ticket}",
                        state.tokens.used()
                    ),
                    NotifyLevel::Success,
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, session_id = id, "csv write failed");
                self.host.notify(
                    &format!("Time tracking write failed: {e}"),
                    NotifyLevel::Error,
                );
            }
        }
    }
}
