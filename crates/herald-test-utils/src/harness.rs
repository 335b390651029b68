// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end dispatch testing.
//!
//! `TestHarness` assembles a registry, a ledger in a temp directory and a
//! scripted delivery stub. No worker processes are spawned: accounts are
//! marked ready directly, as the session monitor would after seeing the
//! ready marker.

use std::sync::Arc;
use std::time::Duration;

use herald_agent::{AccountRegistry, DispatchPacing, DispatchSummary, Dispatcher};
use herald_config::model::AccountConfig;
use herald_core::{DeliveryFailure, HeraldError, SessionEvent};
use herald_ledger::{LedgerStore, Task};
use tokio_util::sync::CancellationToken;

use crate::mock_delivery::{FirstEligiblePicker, ScriptedDelivery};

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    accounts: Vec<AccountConfig>,
    ready: Vec<String>,
    tasks: Vec<Task>,
    failures: Vec<(String, DeliveryFailure)>,
    max_consecutive_uses: u32,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            accounts: vec![
                AccountConfig::new("account_1", "Account 1"),
                AccountConfig::new("account_2", "Account 2"),
            ],
            ready: Vec::new(),
            tasks: Vec::new(),
            failures: Vec::new(),
            max_consecutive_uses: 3,
        }
    }

    /// Replace the default two accounts.
    pub fn with_accounts(mut self, accounts: Vec<AccountConfig>) -> Self {
        self.accounts = accounts;
        self
    }

    /// Accounts that start in READY.
    pub fn with_ready(mut self, ids: &[&str]) -> Self {
        self.ready = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    /// Initial ledger contents.
    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.tasks = tasks;
        self
    }

    /// Unassigned tasks, one per recipient, with no pacing delay.
    pub fn with_unassigned(mut self, recipients: &[&str]) -> Self {
        self.tasks = recipients
            .iter()
            .map(|r| Task::new(*r, "test message", 0, None))
            .collect();
        self
    }

    /// Make every delivery to `recipient` fail.
    pub fn failing_for(mut self, recipient: &str, failure: DeliveryFailure) -> Self {
        self.failures.push((recipient.to_string(), failure));
        self
    }

    pub fn with_max_consecutive_uses(mut self, cap: u32) -> Self {
        self.max_consecutive_uses = cap;
        self
    }

    /// Build the harness and write the initial ledger.
    pub async fn build(self) -> Result<TestHarness, HeraldError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| HeraldError::Ledger {
            source: Box::new(e),
        })?;
        let ledger = Arc::new(LedgerStore::new(temp_dir.path().join("contacts.json")));
        ledger.save(&self.tasks).await?;

        let registry = Arc::new(AccountRegistry::with_picker(
            &self.accounts,
            self.max_consecutive_uses,
            Box::new(FirstEligiblePicker),
        ));
        for id in &self.ready {
            registry.apply_event(id, SessionEvent::Authenticated).await;
        }

        let delivery = self
            .failures
            .into_iter()
            .fold(ScriptedDelivery::new(), |stub, (recipient, failure)| {
                stub.fail_for(recipient, failure)
            });

        Ok(TestHarness {
            ledger,
            registry,
            delivery: Arc::new(delivery),
            _temp_dir: temp_dir,
        })
    }
}

/// A dispatch environment with a scripted delivery stub and temp ledger.
pub struct TestHarness {
    /// Ledger store backed by a file in the temp directory.
    pub ledger: Arc<LedgerStore>,
    /// Registry using first-eligible fair selection.
    pub registry: Arc<AccountRegistry>,
    /// The delivery stub; inspect `calls()` after a run.
    pub delivery: Arc<ScriptedDelivery>,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Runs the dispatch loop to completion with millisecond pacing.
    pub async fn dispatch(&self) -> DispatchSummary {
        self.dispatcher(CancellationToken::new()).run().await
    }

    /// A dispatcher over this harness with millisecond pacing.
    pub fn dispatcher(&self, cancel: CancellationToken) -> Dispatcher {
        Dispatcher::new(
            self.ledger.clone(),
            self.registry.clone(),
            self.delivery.clone(),
            DispatchPacing {
                backoff: Duration::from_millis(10),
                failure_backoff: Duration::from_millis(1),
            },
            cancel,
        )
    }

    /// Current ledger contents.
    pub async fn tasks(&self) -> Vec<Task> {
        self.ledger.load().await
    }
}
