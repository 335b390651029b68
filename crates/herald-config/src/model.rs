// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Herald coordinator.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Herald configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HeraldConfig {
    /// Coordinator-wide settings (ledger location, fairness cap, logging).
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Configured messaging accounts, one worker process each.
    #[serde(default = "default_accounts")]
    pub accounts: Vec<AccountConfig>,

    /// Worker executable settings.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Output markers used to classify worker session state.
    #[serde(default)]
    pub markers: MarkerConfig,

    /// Phase-1 authentication wait.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Dispatch loop pacing.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Recipient source and message template.
    #[serde(default)]
    pub contacts: ContactsConfig,

    /// Graceful shutdown settings.
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl Default for HeraldConfig {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            accounts: default_accounts(),
            worker: WorkerConfig::default(),
            markers: MarkerConfig::default(),
            auth: AuthConfig::default(),
            dispatch: DispatchConfig::default(),
            contacts: ContactsConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

/// Coordinator-wide configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Path of the JSON ledger document.
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    /// Maximum consecutive fair-random picks of the same account.
    #[serde(default = "default_max_consecutive_uses")]
    pub max_consecutive_uses: u32,

    /// Directory for one-shot scratch ledgers.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            ledger_path: default_ledger_path(),
            max_consecutive_uses: default_max_consecutive_uses(),
            scratch_dir: default_scratch_dir(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("contacts.json")
}

fn default_max_consecutive_uses() -> u32 {
    3
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from(".")
}

/// One configured account, bound to exactly one worker process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    /// Stable identifier, passed to the worker and stored in the ledger.
    pub id: String,

    /// Display name used in operator output.
    #[serde(default)]
    pub name: Option<String>,
}

impl AccountConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
        }
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

fn default_accounts() -> Vec<AccountConfig> {
    vec![
        AccountConfig::new("account_1", "Account 1"),
        AccountConfig::new("account_2", "Account 2"),
    ]
}

/// Worker executable configuration.
///
/// Both commands receive `<account_id> <ledger_path>` as trailing arguments.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Long-running session worker command (program followed by fixed args).
    #[serde(default = "default_session_command")]
    pub session_command: Vec<String>,

    /// One-shot sender command (program followed by fixed args).
    #[serde(default = "default_sender_command")]
    pub sender_command: Vec<String>,

    /// Bounded wait for a one-shot send.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Delay between consecutive worker launches.
    #[serde(default = "default_launch_stagger_ms")]
    pub launch_stagger_ms: u64,

    /// Extra environment variables for every worker process.
    #[serde(default = "default_worker_env")]
    pub env: BTreeMap<String, String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            session_command: default_session_command(),
            sender_command: default_sender_command(),
            send_timeout_secs: default_send_timeout_secs(),
            launch_stagger_ms: default_launch_stagger_ms(),
            env: default_worker_env(),
        }
    }
}

impl WorkerConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn launch_stagger(&self) -> Duration {
        Duration::from_millis(self.launch_stagger_ms)
    }
}

fn default_session_command() -> Vec<String> {
    vec!["node".to_string(), "index.js".to_string()]
}

fn default_sender_command() -> Vec<String> {
    vec!["node".to_string(), "sender.js".to_string()]
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_launch_stagger_ms() -> u64 {
    2000
}

fn default_worker_env() -> BTreeMap<String, String> {
    BTreeMap::from([("NODE_NO_WARNINGS".to_string(), "1".to_string())])
}

/// Substring markers matched against worker output lines.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MarkerConfig {
    /// Lines containing any of these drive the account to READY.
    #[serde(default = "default_ready_markers")]
    pub ready: Vec<String>,

    /// Lines containing any of these drive the account to FAILED.
    #[serde(default = "default_failed_markers")]
    pub failed: Vec<String>,

    /// Lines containing any of these mark login in progress.
    #[serde(default = "default_authenticating_markers")]
    pub authenticating: Vec<String>,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            ready: default_ready_markers(),
            failed: default_failed_markers(),
            authenticating: default_authenticating_markers(),
        }
    }
}

fn default_ready_markers() -> Vec<String> {
    vec![
        "Authenticated successfully".to_string(),
        "Client is ready".to_string(),
    ]
}

fn default_failed_markers() -> Vec<String> {
    vec!["Authentication failed".to_string(), "auth_failure".to_string()]
}

fn default_authenticating_markers() -> Vec<String> {
    vec!["Scan this QR code".to_string(), "Loading...".to_string()]
}

/// Phase-1 authentication wait configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Upper bound on the wait for all started accounts to become ready.
    #[serde(default = "default_auth_timeout_secs")]
    pub timeout_secs: u64,

    /// Readiness polling interval.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_auth_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl AuthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_auth_timeout_secs() -> u64 {
    120
}

fn default_poll_interval_ms() -> u64 {
    2000
}

/// Dispatch loop pacing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Wait when the sticky assignee is not ready or no account is eligible.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Wait after a failed delivery.
    #[serde(default = "default_failure_backoff_ms")]
    pub failure_backoff_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            backoff_ms: default_backoff_ms(),
            failure_backoff_ms: default_failure_backoff_ms(),
        }
    }
}

fn default_backoff_ms() -> u64 {
    5000
}

fn default_failure_backoff_ms() -> u64 {
    2000
}

/// Recipient source and message template configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContactsConfig {
    /// Static message body for every task. Empty disables materialization.
    #[serde(default)]
    pub message: String,

    /// SQLite database the recipient query runs against.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Recipient query. Missing or blank skips contact generation.
    #[serde(default)]
    pub query: Option<String>,

    /// Column holding the phone number.
    #[serde(default = "default_phone_column")]
    pub phone_column: String,

    /// Country calling code used by phone normalization.
    #[serde(default = "default_country_code")]
    pub country_code: String,

    /// Advisory pause after a successful send, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Rows used when the query fails.
    #[serde(default)]
    pub fallback_phones: Vec<String>,
}

impl Default for ContactsConfig {
    fn default() -> Self {
        Self {
            message: String::new(),
            database_path: None,
            query: None,
            phone_column: default_phone_column(),
            country_code: default_country_code(),
            delay_ms: default_delay_ms(),
            fallback_phones: Vec::new(),
        }
    }
}

impl ContactsConfig {
    /// The query, if one is configured and non-blank.
    pub fn effective_query(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }
}

fn default_phone_column() -> String {
    "Telefone".to_string()
}

fn default_country_code() -> String {
    "55".to_string()
}

fn default_delay_ms() -> u64 {
    30_000
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ShutdownConfig {
    /// Wait between the graceful stop request and the forced kill.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
        }
    }
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

fn default_grace_period_ms() -> u64 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_two_accounts() {
        let config = HeraldConfig::default();
        assert_eq!(config.accounts.len(), 2);
        assert_eq!(config.accounts[0].display_name(), "Account 1");
        assert_eq!(config.coordinator.max_consecutive_uses, 3);
    }

    #[test]
    fn account_name_falls_back_to_id() {
        let toml_str = r#"
[[accounts]]
id = "sales"
"#;
        let config: HeraldConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.accounts[0].display_name(), "sales");
    }

    #[test]
    fn blank_query_is_not_effective() {
        let contacts = ContactsConfig {
            query: Some("   \n".to_string()),
            ..Default::default()
        };
        assert_eq!(contacts.effective_query(), None);
    }

    #[test]
    fn markers_deny_unknown_fields() {
        let toml_str = r#"
[markers]
redy = ["x"]
"#;
        assert!(toml::from_str::<HeraldConfig>(toml_str).is_err());
    }
}
