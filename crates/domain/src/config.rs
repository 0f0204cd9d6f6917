//! Runtime configuration.
//!
//! Loaded from a TOML file with full defaults, so an empty file (or no file
//! at all) boots a working core. Every tunable the state machine depends on
//! lives here — session expiry, retry budgets, dedup window, worker pool
//! sizing — never as hardcoded constants in the engine.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub flow: FlowConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
}

impl Config {
    /// Load a config file. A missing file yields the defaults; a present but
    /// malformed file is an error (silently falling back would mask typos).
    pub fn load(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Session lifecycle tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Inactivity window in minutes. A session idle longer than this reverts
    /// to Idle (discarding any open flow) on the next inbound message.
    /// `None` disables expiry.
    #[serde(default = "d_expiry_minutes")]
    pub expiry_minutes: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiry_minutes: d_expiry_minutes(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Flows
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Multi-turn field-collection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Per-field strike budget: the flow aborts on the Nth consecutive
    /// invalid answer, so the default of 3 allows two re-prompts.
    #[serde(default = "d_max_field_retries")]
    pub max_field_retries: u32,
    /// The one token recognized while a flow is open. Matching is
    /// case-insensitive after whitespace normalization.
    #[serde(default = "d_cancel_token")]
    pub cancel_token: String,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_field_retries: d_max_field_retries(),
            cancel_token: d_cancel_token(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Execution-engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Window in seconds during which an identical `(user, action, input)`
    /// request is served from the invocation log. `0` disables dedup.
    #[serde(default = "d_dedup_window_secs")]
    pub dedup_window_secs: u64,
    /// Hard execution budget per handler invocation, in seconds.
    #[serde(default = "d_handler_timeout_secs")]
    pub handler_timeout_secs: u64,
    /// Calculation handlers allowed to run at once. Bounds the blocking
    /// worker pool so heavy bursts cannot starve routing turns.
    #[serde(default = "d_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: d_dedup_window_secs(),
            handler_timeout_secs: d_handler_timeout_secs(),
            max_concurrent: d_max_concurrent(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Catalog & storage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CatalogConfig {
    /// Operator-supplied catalog file. `None` uses the embedded catalog.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root for on-disk state (`sessions/`, `users/`, `invocations/`).
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
    /// When false, all stores stay purely in memory (tests, demo REPL).
    #[serde(default = "d_true")]
    pub persist: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
            persist: true,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// User-facing copy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fixed phrases the engine emits on its own (apologies, cancellations).
/// Rendering/templating proper is the delivery collaborator's job; these
/// are only the fallbacks the core cannot avoid producing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesConfig {
    #[serde(default = "d_msg_unrecognized")]
    pub unrecognized: String,
    #[serde(default = "d_msg_unavailable")]
    pub unavailable: String,
    #[serde(default = "d_msg_failure")]
    pub failure: String,
    #[serde(default = "d_msg_cancelled")]
    pub cancelled: String,
    #[serde(default = "d_msg_gave_up")]
    pub gave_up: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            unrecognized: d_msg_unrecognized(),
            unavailable: d_msg_unavailable(),
            failure: d_msg_failure(),
            cancelled: d_msg_cancelled(),
            gave_up: d_msg_gave_up(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues. Empty means
    /// everything looks good; the boot path aborts on any `Error`.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.session.expiry_minutes == Some(0) {
            issues.push(error(
                "session.expiry_minutes",
                "must be greater than 0 (omit the key to disable expiry)",
            ));
        }
        if self.session.expiry_minutes.is_none() {
            issues.push(warning(
                "session.expiry_minutes",
                "expiry disabled — abandoned flows will linger until the next message",
            ));
        }

        if self.flow.max_field_retries == 0 {
            issues.push(error(
                "flow.max_field_retries",
                "must allow at least one attempt",
            ));
        }
        if self.flow.cancel_token.trim().is_empty() {
            issues.push(error(
                "flow.cancel_token",
                "must not be empty — users could never leave a flow",
            ));
        }

        if self.dispatch.handler_timeout_secs == 0 {
            issues.push(error(
                "dispatch.handler_timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.dispatch.max_concurrent == 0 {
            issues.push(error(
                "dispatch.max_concurrent",
                "worker pool needs at least one slot",
            ));
        }
        if self.dispatch.dedup_window_secs == 0 {
            issues.push(warning(
                "dispatch.dedup_window_secs",
                "dedup disabled — repeated identical requests will re-run their handlers",
            ));
        }

        if let Some(path) = &self.catalog.path {
            if !path.exists() {
                issues.push(error(
                    "catalog.path",
                    &format!("{} does not exist", path.display()),
                ));
            }
        }

        issues
    }
}

fn error(field: &str, message: &str) -> ConfigIssue {
    ConfigIssue {
        severity: ConfigSeverity::Error,
        field: field.into(),
        message: message.into(),
    }
}

fn warning(field: &str, message: &str) -> ConfigIssue {
    ConfigIssue {
        severity: ConfigSeverity::Warning,
        field: field.into(),
        message: message.into(),
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_expiry_minutes() -> Option<u32> {
    Some(240)
}
fn d_max_field_retries() -> u32 {
    3
}
fn d_cancel_token() -> String {
    "cancel".into()
}
fn d_dedup_window_secs() -> u64 {
    300
}
fn d_handler_timeout_secs() -> u64 {
    30
}
fn d_max_concurrent() -> usize {
    4
}
fn d_state_path() -> PathBuf {
    PathBuf::from("./data/state")
}
fn d_true() -> bool {
    true
}
fn d_msg_unrecognized() -> String {
    "Sorry, I did not recognize that request. Here is what I can do:".into()
}
fn d_msg_unavailable() -> String {
    "That reading is currently unavailable. Please try another one.".into()
}
fn d_msg_failure() -> String {
    "Something went wrong preparing your reading. Please try again in a moment.".into()
}
fn d_msg_cancelled() -> String {
    "Okay, I have cancelled that. What would you like instead?".into()
}
fn d_msg_gave_up() -> String {
    "I could not make sense of that answer after several tries, so I stopped. \
     Pick an option to start over:"
        .into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_config_empty_toml_uses_default_expiry() {
        let cfg: SessionConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.expiry_minutes, Some(240));
    }

    #[test]
    fn flow_config_parses_custom_budget() {
        let toml_str = r#"
            max_field_retries = 5
            cancel_token = "stop"
        "#;
        let cfg: FlowConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.max_field_retries, 5);
        assert_eq!(cfg.cancel_token, "stop");
    }

    #[test]
    fn dispatch_config_empty_toml_uses_all_defaults() {
        let cfg: DispatchConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.dedup_window_secs, 300);
        assert_eq!(cfg.handler_timeout_secs, 30);
        assert_eq!(cfg.max_concurrent, 4);
    }

    #[test]
    fn storage_config_empty_toml_persists_by_default() {
        let cfg: StorageConfig = toml::from_str("").unwrap();
        assert!(cfg.persist);
        assert_eq!(cfg.state_path, PathBuf::from("./data/state"));
    }

    #[test]
    fn messages_config_overrides_single_phrase() {
        let toml_str = r#"
            failure = "Try again soon."
        "#;
        let cfg: MessagesConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.failure, "Try again soon.");
        assert_eq!(cfg.cancelled, d_msg_cancelled());
    }

    #[test]
    fn zero_budgets_are_errors() {
        let mut cfg = Config::default();
        cfg.flow.max_field_retries = 0;
        cfg.dispatch.handler_timeout_secs = 0;
        cfg.dispatch.max_concurrent = 0;
        let errors = cfg
            .validate()
            .iter()
            .filter(|i| i.severity == ConfigSeverity::Error)
            .count();
        assert_eq!(errors, 3);
    }

    #[test]
    fn disabled_dedup_is_a_warning_not_an_error() {
        let mut cfg = Config::default();
        cfg.dispatch.dedup_window_secs = 0;
        let issues = cfg.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, ConfigSeverity::Warning);
        assert_eq!(issues[0].field, "dispatch.dedup_window_secs");
    }

    #[test]
    fn nonexistent_catalog_path_is_an_error() {
        let mut cfg = Config::default();
        cfg.catalog.path = Some(PathBuf::from("/definitely/not/here.toml"));
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.field == "catalog.path"));
    }
}
