// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch loop.
//!
//! Drains the ledger one task per pass in insertion order. Each pass reloads
//! the ledger, picks the first unsent task whose recipient was not already
//! attempted in this run,
//! resolves an account (sticky assignment or fair selection), hands the task
//! to the delivery adapter and records the outcome through the ledger store.
//!
//! Cancellation is observed between passes and during waits, never while a
//! delivery is in flight.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use herald_config::model::DispatchConfig;
use herald_core::{DeliveryAdapter, SelectionError};
use herald_ledger::LedgerStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::registry::AccountRegistry;

/// How a dispatch run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchReport {
    /// Every task in the ledger is marked sent.
    AllDelivered,
    /// Tasks failed in this run; they are retried only by a new run.
    RetryRequiresRestart { pending: usize },
    /// The run was terminated before the ledger was drained.
    Cancelled,
}

/// Outcome of a dispatch run plus per-run counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSummary {
    pub report: DispatchReport,
    pub delivered: usize,
    pub failed: usize,
}

/// Pacing of the dispatch loop.
#[derive(Debug, Clone, Copy)]
pub struct DispatchPacing {
    /// Wait when no account can take the head task.
    pub backoff: Duration,
    /// Wait after a failed delivery.
    pub failure_backoff: Duration,
}

impl From<&DispatchConfig> for DispatchPacing {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            backoff: Duration::from_millis(config.backoff_ms),
            failure_backoff: Duration::from_millis(config.failure_backoff_ms),
        }
    }
}

/// The control loop that delivers ledger tasks.
pub struct Dispatcher {
    ledger: Arc<LedgerStore>,
    registry: Arc<AccountRegistry>,
    delivery: Arc<dyn DeliveryAdapter>,
    pacing: DispatchPacing,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        ledger: Arc<LedgerStore>,
        registry: Arc<AccountRegistry>,
        delivery: Arc<dyn DeliveryAdapter>,
        pacing: DispatchPacing,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ledger,
            registry,
            delivery,
            pacing,
            cancel,
        }
    }

    /// Runs until the ledger is drained for this run or cancellation.
    pub async fn run(&self) -> DispatchSummary {
        // Recipients attempted (or skipped) in this run. A recipient is tried
        // at most once per run, so duplicate ledger rows cannot loop.
        let mut attempted: HashSet<String> = HashSet::new();
        let mut delivered = 0;
        let mut failed = 0;
        let summary = |report, delivered, failed| DispatchSummary {
            report,
            delivered,
            failed,
        };

        info!("dispatch loop started");
        loop {
            if self.cancel.is_cancelled() {
                info!(delivered, failed, "dispatch loop cancelled");
                return summary(DispatchReport::Cancelled, delivered, failed);
            }

            let tasks = self.ledger.load().await;
            let unsent: Vec<_> = tasks
                .iter()
                .filter(|t| !t.sent && !attempted.contains(&t.recipient))
                .collect();

            let Some(task) = unsent.first() else {
                let pending = tasks.iter().filter(|t| !t.sent).count();
                if pending > 0 {
                    warn!(
                        pending,
                        "unsent tasks remain after this run; restart the coordinator to retry them"
                    );
                    return summary(
                        DispatchReport::RetryRequiresRestart { pending },
                        delivered,
                        failed,
                    );
                }
                info!(delivered, "all messages delivered");
                return summary(DispatchReport::AllDelivered, delivered, failed);
            };
            let remaining = unsent.len();

            let selection = match task.assigned_account() {
                Some(assignee) => self.registry.sticky(assignee).await,
                None => self.registry.select_fair().await,
            };
            let account_id = match selection {
                Ok(id) => id,
                Err(SelectionError::UnknownAccount { account_id }) => {
                    warn!(
                        recipient = %task.recipient,
                        account = %account_id,
                        "task assigned to an unconfigured account, skipping for this run"
                    );
                    attempted.insert(task.recipient.clone());
                    continue;
                }
                Err(e) => {
                    debug!(recipient = %task.recipient, reason = %e, "no account available, backing off");
                    self.pause(self.pacing.backoff).await;
                    continue;
                }
            };

            let name = self
                .registry
                .display_name(&account_id)
                .await
                .unwrap_or_else(|| account_id.clone());
            info!(account = %name, recipient = %task.recipient, remaining, "sending message");

            attempted.insert(task.recipient.clone());
            let outcome = self
                .delivery
                .deliver_one(&account_id, &task.recipient, &task.body)
                .await;

            if let Err(e) = self
                .ledger
                .mark_outcome(&task.recipient, &account_id, &outcome)
                .await
            {
                error!(recipient = %task.recipient, error = %e, "failed to record delivery outcome");
            }

            if outcome.is_delivered() {
                delivered += 1;
                if remaining > 1 && task.delay_millis > 0 {
                    debug!(delay_ms = task.delay_millis, "pacing before next send");
                    self.pause(Duration::from_millis(task.delay_millis)).await;
                }
            } else {
                failed += 1;
                self.pause(self.pacing.failure_backoff).await;
            }
        }
    }

    /// Sleeps for `duration` or until cancelled.
    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use herald_config::model::AccountConfig;
    use herald_core::{DeliveryFailure, SessionEvent};
    use herald_ledger::{LedgerStats, Task};
    use herald_test_utils::{FirstEligiblePicker, ScriptedDelivery};

    use super::*;

    const FAST: DispatchPacing = DispatchPacing {
        backoff: Duration::from_millis(10),
        failure_backoff: Duration::from_millis(1),
    };

    struct Fixture {
        _dir: tempfile::TempDir,
        ledger: Arc<LedgerStore>,
        registry: Arc<AccountRegistry>,
    }

    async fn fixture(ready: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(LedgerStore::new(dir.path().join("contacts.json")));
        let accounts = [
            AccountConfig::new("account_1", "Account 1"),
            AccountConfig::new("account_2", "Account 2"),
        ];
        let registry = Arc::new(AccountRegistry::with_picker(
            &accounts,
            3,
            Box::new(FirstEligiblePicker),
        ));
        for id in ready {
            registry.apply_event(id, SessionEvent::Authenticated).await;
        }
        Fixture {
            _dir: dir,
            ledger,
            registry,
        }
    }

    fn dispatcher(f: &Fixture, delivery: Arc<ScriptedDelivery>, cancel: CancellationToken) -> Dispatcher {
        Dispatcher::new(f.ledger.clone(), f.registry.clone(), delivery, FAST, cancel)
    }

    #[tokio::test]
    async fn empty_ledger_is_all_delivered() {
        let f = fixture(&["account_1"]).await;
        let summary = dispatcher(&f, Arc::new(ScriptedDelivery::new()), CancellationToken::new())
            .run()
            .await;
        assert_eq!(summary.report, DispatchReport::AllDelivered);
        assert_eq!(summary.delivered, 0);
    }

    #[tokio::test]
    async fn sticky_tasks_go_to_their_assignee() {
        let f = fixture(&["account_1", "account_2"]).await;
        f.ledger
            .save(&[
                Task::new("+1", "m", 0, Some("account_2".into())),
                Task::new("+2", "m", 0, Some("account_2".into())),
                Task::new("+3", "m", 0, Some("account_1".into())),
            ])
            .await
            .unwrap();
        let delivery = Arc::new(ScriptedDelivery::new());

        dispatcher(&f, delivery.clone(), CancellationToken::new())
            .run()
            .await;

        let accounts: Vec<String> = delivery.calls().into_iter().map(|c| c.account_id).collect();
        assert_eq!(accounts, vec!["account_2", "account_2", "account_1"]);
    }

    #[tokio::test]
    async fn failed_recipient_is_not_retried_in_the_same_run() {
        let f = fixture(&["account_1"]).await;
        f.ledger
            .save(&[Task::new("+bad", "m", 0, None), Task::new("+ok", "m", 0, None)])
            .await
            .unwrap();
        let delivery = Arc::new(ScriptedDelivery::new().fail_for("+bad", DeliveryFailure::Timeout));

        let summary = dispatcher(&f, delivery.clone(), CancellationToken::new())
            .run()
            .await;

        assert_eq!(summary.report, DispatchReport::RetryRequiresRestart { pending: 1 });
        assert_eq!(summary.delivered, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(delivery.calls().len(), 2);

        let stats = LedgerStats::from_tasks(&f.ledger.load().await);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.sent_success, 1);
    }

    #[tokio::test]
    async fn not_ready_assignee_waits_until_cancelled() {
        let f = fixture(&["account_1"]).await;
        f.ledger
            .save(&[Task::new("+1", "m", 0, Some("account_2".into()))])
            .await
            .unwrap();
        let delivery = Arc::new(ScriptedDelivery::new());
        let cancel = CancellationToken::new();

        let d = dispatcher(&f, delivery.clone(), cancel.clone());
        let run = tokio::spawn(async move { d.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let summary = run.await.unwrap();
        assert_eq!(summary.report, DispatchReport::Cancelled);
        // A sticky assignment is never handed to another account.
        assert!(delivery.calls().is_empty());
    }

    #[tokio::test]
    async fn assignee_becoming_ready_unblocks_the_task() {
        let f = fixture(&[]).await;
        f.ledger
            .save(&[Task::new("+1", "m", 0, Some("account_2".into()))])
            .await
            .unwrap();
        let delivery = Arc::new(ScriptedDelivery::new());

        let d = dispatcher(&f, delivery.clone(), CancellationToken::new());
        let run = tokio::spawn(async move { d.run().await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        f.registry
            .apply_event("account_2", SessionEvent::Authenticated)
            .await;

        let summary = run.await.unwrap();
        assert_eq!(summary.report, DispatchReport::AllDelivered);
        assert_eq!(delivery.calls()[0].account_id, "account_2");
    }

    #[tokio::test]
    async fn unknown_assignee_is_skipped_for_the_run() {
        let f = fixture(&["account_1"]).await;
        f.ledger
            .save(&[
                Task::new("+1", "m", 0, Some("account_9".into())),
                Task::new("+2", "m", 0, None),
            ])
            .await
            .unwrap();
        let delivery = Arc::new(ScriptedDelivery::new());

        let summary = dispatcher(&f, delivery.clone(), CancellationToken::new())
            .run()
            .await;

        assert_eq!(summary.report, DispatchReport::RetryRequiresRestart { pending: 1 });
        assert_eq!(delivery.calls().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_recipient_is_attempted_once_per_run() {
        let f = fixture(&["account_1"]).await;
        f.ledger
            .save(&[
                Task::new("+551199990000", "m", 0, None),
                Task::new("+551199990000", "m", 0, None),
            ])
            .await
            .unwrap();
        let delivery = Arc::new(ScriptedDelivery::new());

        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            dispatcher(&f, delivery.clone(), CancellationToken::new()).run(),
        )
        .await
        .expect("duplicate rows must not keep the loop alive");

        assert_eq!(delivery.calls().len(), 1);
        assert_eq!(summary.delivered, 1);
        // Only the first matching row is marked; the copy stays unsent.
        assert_eq!(summary.report, DispatchReport::RetryRequiresRestart { pending: 1 });
        let sent: Vec<bool> = f.ledger.load().await.iter().map(|t| t.sent).collect();
        assert_eq!(sent, vec![true, false]);
    }

    #[tokio::test]
    async fn cancellation_during_pacing_stops_the_loop() {
        let f = fixture(&["account_1"]).await;
        f.ledger
            .save(&[Task::new("+1", "m", 60_000, None), Task::new("+2", "m", 60_000, None)])
            .await
            .unwrap();
        let delivery = Arc::new(ScriptedDelivery::new());
        let cancel = CancellationToken::new();

        let d = dispatcher(&f, delivery.clone(), cancel.clone());
        let run = tokio::spawn(async move { d.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let summary = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("loop should stop promptly")
            .unwrap();
        assert_eq!(summary.report, DispatchReport::Cancelled);
        assert_eq!(summary.delivered, 1);
        assert_eq!(delivery.calls().len(), 1);
    }
}
