// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ledger document model.
//!
//! The on-disk document is a JSON array of task objects with the fields
//! `phone, message, delay, sent, sentBy, sentAt` (plus the optional
//! `assignedTo`). `sentAt` holds an RFC 3339 timestamp after a successful
//! send, or [`ERROR_MARKER_PREFIX`] followed by the timestamp and reason after
//! a failed attempt.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use herald_core::DeliveryFailure;
use serde::{Deserialize, Serialize};

/// Prefix that distinguishes a recorded failure from a success timestamp.
pub const ERROR_MARKER_PREFIX: &str = "ERROR_";

/// Pause after a successful send when the document omits `delay`.
const DEFAULT_DELAY_MILLIS: u64 = 2000;

/// One outbound message obligation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Normalized phone number; immutable once created.
    #[serde(rename = "phone")]
    pub recipient: String,

    #[serde(rename = "message")]
    pub body: String,

    /// Advisory pause after a successful send.
    #[serde(rename = "delay", default = "default_delay_millis")]
    pub delay_millis: u64,

    #[serde(default)]
    pub sent: bool,

    /// Sticky assignee before any attempt, last attempting account afterwards.
    #[serde(default)]
    pub sent_by: Option<String>,

    /// Success timestamp or error marker of the last attempt.
    #[serde(default)]
    pub sent_at: Option<String>,

    /// Sticky assignment, kept separately so attempts never overwrite it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,

    /// Fields written by other tools are carried through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_delay_millis() -> u64 {
    DEFAULT_DELAY_MILLIS
}

/// Parsed view of a task's last attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<'a> {
    Succeeded { at: &'a str },
    Failed { at: &'a str, reason: Option<&'a str> },
}

impl Task {
    /// Creates an unsent task, optionally bound to an account.
    pub fn new(
        recipient: impl Into<String>,
        body: impl Into<String>,
        delay_millis: u64,
        assigned_to: Option<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            body: body.into(),
            delay_millis,
            sent: false,
            sent_by: assigned_to.clone(),
            sent_at: None,
            assigned_to,
            extra: BTreeMap::new(),
        }
    }

    /// The account this task must be delivered by, if any.
    ///
    /// Documents without `assignedTo` carry the assignment in `sentBy` until
    /// the first attempt is recorded.
    pub fn assigned_account(&self) -> Option<&str> {
        match (&self.assigned_to, &self.sent_at) {
            (Some(assignee), _) => Some(assignee),
            (None, None) => self.sent_by.as_deref(),
            (None, Some(_)) => None,
        }
    }

    /// Parses `sentAt` into the last attempt, if one was recorded.
    pub fn last_attempt(&self) -> Option<Attempt<'_>> {
        let stamp = self.sent_at.as_deref()?;
        match stamp.strip_prefix(ERROR_MARKER_PREFIX) {
            Some(rest) => {
                let (at, reason) = match rest.split_once(' ') {
                    Some((at, reason)) => (at, Some(reason)),
                    None => (rest, None),
                };
                Some(Attempt::Failed { at, reason })
            }
            None => Some(Attempt::Succeeded { at: stamp }),
        }
    }

    /// Account that made the last recorded attempt.
    pub fn last_attempt_account(&self) -> Option<&str> {
        self.sent_at.as_ref().and(self.sent_by.as_deref())
    }

    /// Time of the last recorded attempt, if it parses as RFC 3339.
    pub fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        let at = match self.last_attempt()? {
            Attempt::Succeeded { at } | Attempt::Failed { at, .. } => at,
        };
        DateTime::parse_from_rfc3339(at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Whether the last recorded attempt failed.
    pub fn has_failed_attempt(&self) -> bool {
        matches!(self.last_attempt(), Some(Attempt::Failed { .. }))
    }

    /// Reason of the last failed attempt; `Some("")` when the marker has none.
    pub fn last_attempt_error(&self) -> Option<&str> {
        match self.last_attempt()? {
            Attempt::Failed { reason, .. } => Some(reason.unwrap_or("")),
            Attempt::Succeeded { .. } => None,
        }
    }

    /// Records a successful hand-off by `account_id`.
    pub fn record_success(&mut self, account_id: &str, now: DateTime<Utc>) {
        self.sent = true;
        self.sent_by = Some(account_id.to_string());
        self.sent_at = Some(format_timestamp(now));
    }

    /// Records a failed attempt; the task stays eligible for a future run.
    pub fn record_failure(
        &mut self,
        account_id: &str,
        failure: &DeliveryFailure,
        now: DateTime<Utc>,
    ) {
        if self.assigned_to.is_none() && self.sent_at.is_none() {
            self.assigned_to = self.sent_by.take();
        }
        self.sent = false;
        self.sent_by = Some(account_id.to_string());
        self.sent_at = Some(format!(
            "{ERROR_MARKER_PREFIX}{} {failure}",
            format_timestamp(now)
        ));
    }
}

fn format_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Aggregate delivery statistics over a ledger snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub total: usize,
    pub sent_success: usize,
    pub failed: usize,
    pub unsent: usize,
    pub success_by_account: BTreeMap<String, usize>,
    pub failures_by_account: BTreeMap<String, usize>,
}

impl LedgerStats {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut stats = LedgerStats {
            total: tasks.len(),
            ..Default::default()
        };

        for task in tasks {
            let failed = task.has_failed_attempt();
            if !task.sent {
                stats.unsent += 1;
            }
            if failed {
                stats.failed += 1;
            }
            if task.sent && !failed {
                stats.sent_success += 1;
            }

            let Some(account) = task.last_attempt_account() else {
                continue;
            };
            let bucket = if failed {
                &mut stats.failures_by_account
            } else if task.sent {
                &mut stats.success_by_account
            } else {
                continue;
            };
            *bucket.entry(account.to_string()).or_default() += 1;
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn document_field_names_match_worker_contract() {
        let task = Task::new("+5511999990000", "hi", 30000, Some("account_1".into()));
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["phone"], "+5511999990000");
        assert_eq!(json["message"], "hi");
        assert_eq!(json["delay"], 30000);
        assert_eq!(json["sent"], false);
        assert_eq!(json["sentBy"], "account_1");
        assert!(json["sentAt"].is_null());
        assert_eq!(json["assignedTo"], "account_1");
    }

    #[test]
    fn legacy_document_uses_sent_by_as_assignment() {
        let json = r#"{"phone":"+551","message":"m","delay":0,"sent":false,"sentBy":"account_2","sentAt":null}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.assigned_account(), Some("account_2"));
        assert_eq!(task.last_attempt_account(), None);
    }

    #[test]
    fn missing_delay_defaults() {
        let task: Task = serde_json::from_str(r#"{"phone":"+551","message":"m"}"#).unwrap();
        assert_eq!(task.delay_millis, 2000);
        assert!(!task.sent);
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let json = r#"{"phone":"+551","message":"m","note":"vip"}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        let back = serde_json::to_value(&task).unwrap();
        assert_eq!(back["note"], "vip");
    }

    #[test]
    fn success_clears_error_and_names_account() {
        let mut task = Task::new("+551", "m", 0, None);
        task.record_failure("account_1", &DeliveryFailure::Timeout, ts());
        task.record_success("account_2", ts());
        assert!(task.sent);
        assert_eq!(task.last_attempt_error(), None);
        assert_eq!(task.last_attempt_account(), Some("account_2"));
        assert_eq!(task.last_attempt_at(), Some(ts()));
    }

    #[test]
    fn failure_marker_carries_reason_and_keeps_assignment() {
        let mut task = Task::new("+551", "m", 0, Some("account_1".into()));
        task.record_failure(
            "account_1",
            &DeliveryFailure::NonZeroExit { code: Some(1) },
            ts(),
        );
        assert!(!task.sent);
        assert!(task.sent_at.as_deref().unwrap().starts_with(ERROR_MARKER_PREFIX));
        assert_eq!(task.last_attempt_error(), Some("nonzero_exit(1)"));
        assert_eq!(task.assigned_account(), Some("account_1"));
        assert_eq!(task.last_attempt_at(), Some(ts()));
    }

    #[test]
    fn legacy_assignment_is_preserved_on_failure() {
        let json = r#"{"phone":"+551","message":"m","sentBy":"account_2","sentAt":null}"#;
        let mut task: Task = serde_json::from_str(json).unwrap();
        task.record_failure("account_2", &DeliveryFailure::Timeout, ts());
        assert_eq!(task.assigned_account(), Some("account_2"));
    }

    #[test]
    fn bare_error_marker_parses() {
        let mut task = Task::new("+551", "m", 0, None);
        task.sent_at = Some("ERROR_2026-03-01T12:00:00.000Z".to_string());
        task.sent_by = Some("account_1".to_string());
        assert_eq!(task.last_attempt_error(), Some(""));
        assert!(task.has_failed_attempt());
    }

    #[test]
    fn stats_break_down_by_account() {
        let mut a = Task::new("+1", "m", 0, None);
        a.record_success("account_1", ts());
        let mut b = Task::new("+2", "m", 0, None);
        b.record_success("account_2", ts());
        let mut c = Task::new("+3", "m", 0, None);
        c.record_failure("account_1", &DeliveryFailure::Timeout, ts());
        let d = Task::new("+4", "m", 0, Some("account_2".into()));

        let stats = LedgerStats::from_tasks(&[a, b, c, d]);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.sent_success, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.unsent, 2);
        assert_eq!(stats.success_by_account.get("account_1"), Some(&1));
        assert_eq!(stats.success_by_account.get("account_2"), Some(&1));
        assert_eq!(stats.failures_by_account.get("account_1"), Some(&1));
        assert_eq!(stats.failures_by_account.get("account_2"), None);
    }
}
