/// Layered ticket and account-key resolution, applied once at session
/// finalization.
///
/// Ticket: context extraction, then the agent's configured default, then the
/// global default. Account key: agent override, then the global default,
/// which config loading guarantees is present.
use crate::config::TimeTrackingConfig;

/// The final ticket/account pair written to a CSV row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTicketInfo {
    pub ticket: Option<String>,
    pub account_key: String,
}

/// Normalize an agent name to the canonical `@name` form, so configured keys
/// match host-supplied names with or without the leading `@`.
pub fn normalize_agent_name(name: &str) -> String {
    let name = name.trim();
    if name.starts_with('@') {
        name.to_string()
    } else {
        format!("@{name}")
    }
}

/// Whether `agent` matches any entry of `ignored`, tolerant of the `@` prefix
/// on either side.
pub fn is_ignored_agent(agent: &str, ignored: &[String]) -> bool {
    let agent = normalize_agent_name(agent);
    ignored
        .iter()
        .any(|entry| normalize_agent_name(entry) == agent)
}

/// Applies the configured fallback chains.
#[derive(Debug)]
pub struct TicketResolver<'a> {
    config: &'a TimeTrackingConfig,
}

impl<'a> TicketResolver<'a> {
    pub fn new(config: &'a TimeTrackingConfig) -> Self {
        Self { config }
    }

    /// Resolve the ticket and account key for a finalizing session.
    ///
    /// `extracted` is the context ticket already discovered for the session,
    /// `agent` the detected agent name, if any.
    pub fn resolve(&self, extracted: Option<&str>, agent: Option<&str>) -> ResolvedTicketInfo {
        let agent_default = agent.and_then(|name| {
            let key = normalize_agent_name(name);
            self.config
                .agent_defaults
                .iter()
                .find(|(configured, _)| normalize_agent_name(configured) == key)
                .map(|(_, default)| default)
        });

        let ticket = extracted
            .map(str::to_string)
            .or_else(|| agent_default.map(|d| d.issue_key.clone()))
            .or_else(|| {
                let key = self.config.global_default.issue_key.trim();
                if key.is_empty() {
                    None
                } else {
                    Some(key.to_string())
                }
            });

        let account_key = agent_default
            .and_then(|d| d.account_key.clone())
            .unwrap_or_else(|| self.config.global_default.account_key.clone());

        ResolvedTicketInfo {
            ticket,
            account_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentDefault, GlobalDefault};
    use std::collections::HashMap;

    fn config() -> TimeTrackingConfig {
        let mut agent_defaults = HashMap::new();
        agent_defaults.insert(
            "build".to_string(),
            AgentDefault {
                issue_key: "DEF-2".to_string(),
                account_key: Some("ACCT-BLD".to_string()),
            },
        );
        agent_defaults.insert(
            "@plan".to_string(),
            AgentDefault {
                issue_key: "PLN-1".to_string(),
                account_key: None,
            },
        );
        TimeTrackingConfig {
            csv_file: "tracking.csv".to_string(),
            global_default: GlobalDefault {
                issue_key: "GHI-3".to_string(),
                account_key: "ACCT-MAIN".to_string(),
            },
            agent_defaults,
            ignored_agents: vec!["time-tracking".to_string()],
            valid_projects: None,
            user_email: "dev@example.com".to_string(),
        }
    }

    #[test]
    fn test_context_ticket_wins() {
        let config = config();
        let resolver = TicketResolver::new(&config);
        let resolved = resolver.resolve(Some("ABC-1"), Some("build"));
        assert_eq!(resolved.ticket.as_deref(), Some("ABC-1"));
    }

    #[test]
    fn test_agent_default_then_global() {
        let config = config();
        let resolver = TicketResolver::new(&config);

        let resolved = resolver.resolve(None, Some("build"));
        assert_eq!(resolved.ticket.as_deref(), Some("DEF-2"));

        let resolved = resolver.resolve(None, Some("review"));
        assert_eq!(resolved.ticket.as_deref(), Some("GHI-3"));

        let resolved = resolver.resolve(None, None);
        assert_eq!(resolved.ticket.as_deref(), Some("GHI-3"));
    }

    #[test]
    fn test_account_key_override_wins() {
        let config = config();
        let resolver = TicketResolver::new(&config);

        assert_eq!(
            resolver.resolve(None, Some("build")).account_key,
            "ACCT-BLD"
        );
        // Agent default without an account override falls through.
        assert_eq!(
            resolver.resolve(None, Some("plan")).account_key,
            "ACCT-MAIN"
        );
        assert_eq!(resolver.resolve(None, None).account_key, "ACCT-MAIN");
    }

    #[test]
    fn test_agent_lookup_is_prefix_tolerant() {
        let config = config();
        let resolver = TicketResolver::new(&config);

        // Configured "build" matches host-supplied "@build"; configured
        // "@plan" matches host-supplied "plan".
        assert_eq!(
            resolver.resolve(None, Some("@build")).ticket.as_deref(),
            Some("DEF-2")
        );
        assert_eq!(
            resolver.resolve(None, Some("plan")).ticket.as_deref(),
            Some("PLN-1")
        );
    }

    #[test]
    fn test_empty_global_issue_key_yields_no_ticket() {
        let mut config = config();
        config.global_default.issue_key = String::new();
        config.agent_defaults.clear();
        let resolver = TicketResolver::new(&config);
        assert_eq!(resolver.resolve(None, Some("review")).ticket, None);
    }

    #[test]
    fn test_ignored_agent_prefix_tolerance() {
        let ignored = vec!["time-tracking".to_string()];
        assert!(is_ignored_agent("time-tracking", &ignored));
        assert!(is_ignored_agent("@time-tracking", &ignored));

        let ignored = vec!["@time-tracking".to_string()];
        assert!(is_ignored_agent("time-tracking", &ignored));
        assert!(!is_ignored_agent("build", &ignored));
    }
}
