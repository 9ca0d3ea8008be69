//! Time-tracking configuration: JSON file loading, validation, and the
//! user-email fallback chain.
//!
//! A missing or invalid config file means the tracker stays inactive; the
//! caller decides that, this module only reports why loading failed.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Top-level configuration, loaded once per activation and immutable after.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeTrackingConfig {
    /// Output CSV path: `~/`-relative, absolute, or project-relative.
    pub csv_file: String,
    pub global_default: GlobalDefault,
    #[serde(default)]
    pub agent_defaults: HashMap<String, AgentDefault>,
    #[serde(default)]
    pub ignored_agents: Vec<String>,
    /// Ticket prefixes to restrict extraction to, e.g. `["PROJ", "OPS"]`.
    #[serde(default)]
    pub valid_projects: Option<Vec<String>>,
    /// Resolved after deserialization, not part of the file format.
    #[serde(skip)]
    pub user_email: String,
}

/// Fallback ticket and billing key applied when nothing more specific matches.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalDefault {
    pub issue_key: String,
    pub account_key: String,
}

/// Per-agent fallback ticket, with an optional billing-key override.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentDefault {
    pub issue_key: String,
    #[serde(default)]
    pub account_key: Option<String>,
}

/// Errors that can occur while loading the configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The file is not valid JSON or is missing a required field.
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// A required field is present but empty.
    EmptyField { field: &'static str },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::EmptyField { field } => {
                write!(f, "config field `{field}` must not be empty")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::EmptyField { .. } => None,
        }
    }
}

impl TimeTrackingConfig {
    /// Load and validate the config file, then resolve `user_email`.
    ///
    /// `project_root` is where a `.env` file is looked up during email
    /// resolution.
    pub fn load(path: &Path, project_root: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut config: TimeTrackingConfig =
            serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
        config.validate()?;
        config.user_email = resolve_user_email(project_root);
        Ok(config)
    }

    /// Reject configs whose required fields deserialized to empty strings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.csv_file.trim().is_empty() {
            return Err(ConfigError::EmptyField { field: "csv_file" });
        }
        if self.global_default.account_key.trim().is_empty() {
            return Err(ConfigError::EmptyField {
                field: "global_default.account_key",
            });
        }
        Ok(())
    }
}

/// Resolve the email written to each row's `user` field.
///
/// Candidate sources, first present wins:
/// 1. the `USER_EMAIL` environment variable
/// 2. a `USER_EMAIL=` entry in `{project_root}/.env`
/// 3. the OS account name (`USER`, then `USERNAME`)
pub fn resolve_user_email(project_root: &Path) -> String {
    if let Ok(email) = std::env::var("USER_EMAIL") {
        if !email.trim().is_empty() {
            return email.trim().to_string();
        }
    }
    if let Some(email) = user_email_from_dotenv(&project_root.join(".env")) {
        return email;
    }
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Scan a dotenv-style file for a `USER_EMAIL=` line.
///
/// Only the minimal syntax is supported: `KEY=value`, optional surrounding
/// quotes on the value, `#` comment lines. Anything unreadable is None.
fn user_email_from_dotenv(path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(value) = line.strip_prefix("USER_EMAIL=") {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("time-tracking.json");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_full_config() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            r#"{
                "csv_file": "~/tracking.csv",
                "global_default": {"issue_key": "OPS-1", "account_key": "ACCT-MAIN"},
                "agent_defaults": {"@build": {"issue_key": "BLD-7", "account_key": "ACCT-BLD"}},
                "ignored_agents": ["time-tracking"],
                "valid_projects": ["PROJ", "OPS"]
            }"#,
        );

        let config = TimeTrackingConfig::load(&path, tmp.path()).unwrap();
        assert_eq!(config.csv_file, "~/tracking.csv");
        assert_eq!(config.global_default.issue_key, "OPS-1");
        assert_eq!(config.global_default.account_key, "ACCT-MAIN");
        assert_eq!(config.agent_defaults["@build"].issue_key, "BLD-7");
        assert_eq!(config.ignored_agents, vec!["time-tracking"]);
        assert_eq!(
            config.valid_projects.as_deref(),
            Some(&["PROJ".to_string(), "OPS".to_string()][..])
        );
        assert!(!config.user_email.is_empty());
    }

    #[test]
    fn test_minimal_config_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            r#"{
                "csv_file": "tracking.csv",
                "global_default": {"issue_key": "OPS-1", "account_key": "ACCT"}
            }"#,
        );

        let config = TimeTrackingConfig::load(&path, tmp.path()).unwrap();
        assert!(config.agent_defaults.is_empty());
        assert!(config.ignored_agents.is_empty());
        assert!(config.valid_projects.is_none());
    }

    #[test]
    fn test_missing_account_key_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            r#"{"csv_file": "tracking.csv", "global_default": {"issue_key": "OPS-1"}}"#,
        );

        let err = TimeTrackingConfig::load(&path, tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_empty_account_key_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            r#"{"csv_file": "tracking.csv", "global_default": {"issue_key": "OPS-1", "account_key": "  "}}"#,
        );

        let err = TimeTrackingConfig::load(&path, tmp.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::EmptyField {
                field: "global_default.account_key"
            }
        ));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = TimeTrackingConfig::load(&tmp.path().join("nope.json"), tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_dotenv_parse() {
        let tmp = tempfile::tempdir().unwrap();
        let env_path = tmp.path().join(".env");
        std::fs::write(
            &env_path,
            "# local overrides\nAPI_KEY=secret\nUSER_EMAIL=\"dev@example.com\"\n",
        )
        .unwrap();
        assert_eq!(
            user_email_from_dotenv(&env_path).as_deref(),
            Some("dev@example.com")
        );
    }

    #[test]
    fn test_dotenv_missing_or_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(user_email_from_dotenv(&tmp.path().join(".env")), None);

        let env_path = tmp.path().join(".env");
        std::fs::write(&env_path, "USER_EMAIL=\n").unwrap();
        assert_eq!(user_email_from_dotenv(&env_path), None);
    }
}
