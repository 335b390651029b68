// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Account registry and selection policies.
//!
//! The registry is the single owner of per-account session state, fairness
//! counters and worker handles. Every read-modify-write sequence runs under
//! one lock, so selection (eligible set, choice, counter update) is a single
//! critical section.

use herald_config::model::AccountConfig;
use herald_core::{HeraldError, Picker, SelectionError, SessionEvent, SessionState};
use herald_worker::WorkerHandle;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Uniform random choice.
#[derive(Debug)]
pub struct RandomPicker(StdRng);

impl RandomPicker {
    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl Picker for RandomPicker {
    fn pick(&mut self, len: usize) -> usize {
        self.0.gen_range(0..len)
    }
}

/// One configured account.
#[derive(Debug)]
struct Account {
    id: String,
    display_name: String,
    state: SessionState,
    consecutive_uses: u32,
    process: Option<WorkerHandle>,
}

impl Account {
    fn is_running(&self) -> bool {
        self.process.as_ref().is_some_and(WorkerHandle::is_alive)
    }

    /// READY with either no supervised process or a live one.
    fn is_eligible(&self) -> bool {
        self.state.is_ready() && self.process.as_ref().is_none_or(WorkerHandle::is_alive)
    }
}

/// Point-in-time view of one account for operator output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub id: String,
    pub display_name: String,
    pub state: SessionState,
    pub running: bool,
    pub authenticated: bool,
    pub consecutive_uses: u32,
}

struct Inner {
    accounts: Vec<Account>,
    /// Accounts that reached READY at least once, in first-ready order.
    authenticated: Vec<String>,
    picker: Box<dyn Picker>,
}

impl Inner {
    fn get_mut(&mut self, account_id: &str) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|a| a.id == account_id)
    }
}

/// In-memory table of configured accounts.
pub struct AccountRegistry {
    inner: Mutex<Inner>,
    max_consecutive_uses: u32,
}

impl std::fmt::Debug for AccountRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountRegistry")
            .field("max_consecutive_uses", &self.max_consecutive_uses)
            .finish_non_exhaustive()
    }
}

impl AccountRegistry {
    pub fn new(accounts: &[AccountConfig], max_consecutive_uses: u32) -> Self {
        Self::with_picker(
            accounts,
            max_consecutive_uses,
            Box::new(RandomPicker::from_entropy()),
        )
    }

    /// Registry with a caller-supplied choice policy for fair selection.
    pub fn with_picker(
        accounts: &[AccountConfig],
        max_consecutive_uses: u32,
        picker: Box<dyn Picker>,
    ) -> Self {
        let accounts = accounts
            .iter()
            .map(|a| Account {
                id: a.id.clone(),
                display_name: a.display_name().to_string(),
                state: SessionState::Unauthenticated,
                consecutive_uses: 0,
                process: None,
            })
            .collect();
        Self {
            inner: Mutex::new(Inner {
                accounts,
                authenticated: Vec::new(),
                picker,
            }),
            max_consecutive_uses,
        }
    }

    pub fn max_consecutive_uses(&self) -> u32 {
        self.max_consecutive_uses
    }

    /// Configured account ids, in configuration order.
    pub async fn ids(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.accounts.iter().map(|a| a.id.clone()).collect()
    }

    pub async fn display_name(&self, account_id: &str) -> Option<String> {
        let inner = self.inner.lock().await;
        inner
            .accounts
            .iter()
            .find(|a| a.id == account_id)
            .map(|a| a.display_name.clone())
    }

    pub async fn state(&self, account_id: &str) -> Option<SessionState> {
        let inner = self.inner.lock().await;
        inner
            .accounts
            .iter()
            .find(|a| a.id == account_id)
            .map(|a| a.state)
    }

    /// Applies a classified output event; returns the resulting state.
    pub async fn apply_event(
        &self,
        account_id: &str,
        event: SessionEvent,
    ) -> Option<SessionState> {
        let mut inner = self.inner.lock().await;
        let account = inner.get_mut(account_id)?;
        let before = account.state;
        let after = before.apply(event);
        account.state = after;

        if before != after {
            match after {
                SessionState::Ready => {
                    info!(account = %account.display_name, "account authenticated and ready")
                }
                SessionState::Failed => {
                    warn!(account = %account.display_name, "account authentication failed")
                }
                _ => debug!(account = %account.display_name, from = %before, to = %after, "session state changed"),
            }
        }

        if after.is_ready() && !inner.authenticated.iter().any(|id| id == account_id) {
            inner.authenticated.push(account_id.to_string());
        }
        Some(after)
    }

    /// Forces an account out of READY after its process ended.
    pub async fn mark_exited(&self, account_id: &str) -> Option<SessionState> {
        let mut inner = self.inner.lock().await;
        let account = inner.get_mut(account_id)?;
        account.state = account.state.on_process_exit();
        Some(account.state)
    }

    /// Binds a started worker to its account.
    pub async fn attach_process(
        &self,
        account_id: &str,
        handle: WorkerHandle,
    ) -> Result<(), HeraldError> {
        let mut inner = self.inner.lock().await;
        let account = inner
            .get_mut(account_id)
            .ok_or_else(|| HeraldError::Internal(format!("unknown account {account_id}")))?;
        if let Some(old) = account.process.replace(handle) {
            if old.is_alive() {
                warn!(account = account_id, "replacing a live worker handle");
                old.force_stop();
            }
        }
        Ok(())
    }

    /// Detaches every worker handle, leaving the accounts without a process.
    pub async fn take_processes(&self) -> Vec<WorkerHandle> {
        let mut inner = self.inner.lock().await;
        inner
            .accounts
            .iter_mut()
            .filter_map(|a| a.process.take())
            .collect()
    }

    /// Sticky lookup: the assignee, only if it is eligible.
    ///
    /// Never substitutes another account and never touches fairness counters.
    pub async fn sticky(&self, account_id: &str) -> Result<String, SelectionError> {
        let inner = self.inner.lock().await;
        let account = inner
            .accounts
            .iter()
            .find(|a| a.id == account_id)
            .ok_or_else(|| SelectionError::UnknownAccount {
                account_id: account_id.to_string(),
            })?;
        if account.is_eligible() {
            Ok(account.id.clone())
        } else {
            Err(SelectionError::NotReady {
                account_id: account_id.to_string(),
            })
        }
    }

    /// Fair-random selection among eligible accounts, bounded by the
    /// consecutive-use cap.
    pub async fn select_fair(&self) -> Result<String, SelectionError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let ready: Vec<usize> = inner
            .accounts
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_eligible())
            .map(|(i, _)| i)
            .collect();

        let chosen = match ready.as_slice() {
            [] => return Err(SelectionError::NoEligibleAccount),
            [only] => *only,
            _ => {
                let mut eligible: Vec<usize> = ready
                    .iter()
                    .copied()
                    .filter(|&i| inner.accounts[i].consecutive_uses < self.max_consecutive_uses)
                    .collect();
                if eligible.is_empty() {
                    debug!("every ready account reached the cap, resetting counters");
                    for &i in &ready {
                        inner.accounts[i].consecutive_uses = 0;
                    }
                    eligible = ready;
                }
                let pick = inner.picker.pick(eligible.len()).min(eligible.len() - 1);
                eligible[pick]
            }
        };

        for (i, account) in inner.accounts.iter_mut().enumerate() {
            if i == chosen {
                account.consecutive_uses += 1;
            } else {
                account.consecutive_uses = 0;
            }
        }

        let account = &inner.accounts[chosen];
        debug!(account = %account.id, uses = account.consecutive_uses, "fair selection");
        Ok(account.id.clone())
    }

    /// Eligible account ids, in configuration order.
    pub async fn ready_ids(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner
            .accounts
            .iter()
            .filter(|a| a.is_eligible())
            .map(|a| a.id.clone())
            .collect()
    }

    /// Accounts that reached READY at least once, in first-ready order.
    pub async fn authenticated(&self) -> Vec<String> {
        self.inner.lock().await.authenticated.clone()
    }

    pub async fn snapshot(&self) -> Vec<AccountSnapshot> {
        let inner = self.inner.lock().await;
        inner
            .accounts
            .iter()
            .map(|a| AccountSnapshot {
                id: a.id.clone(),
                display_name: a.display_name.clone(),
                state: a.state,
                running: a.is_running(),
                authenticated: inner.authenticated.contains(&a.id),
                consecutive_uses: a.consecutive_uses,
            })
            .collect()
    }

    #[cfg(test)]
    async fn set_uses(&self, account_id: &str, uses: u32) {
        if let Some(a) = self.inner.lock().await.get_mut(account_id) {
            a.consecutive_uses = uses;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::Path;

    use herald_worker::{WorkerCommand, spawn_session};
    use proptest::prelude::*;

    use super::*;

    struct FirstEligible;

    impl Picker for FirstEligible {
        fn pick(&mut self, _len: usize) -> usize {
            0
        }
    }

    fn accounts(n: usize) -> Vec<AccountConfig> {
        (1..=n)
            .map(|i| AccountConfig::new(format!("account_{i}"), format!("Account {i}")))
            .collect()
    }

    async fn ready_registry(n: usize, cap: u32, picker: Box<dyn Picker>) -> AccountRegistry {
        let registry = AccountRegistry::with_picker(&accounts(n), cap, picker);
        for id in registry.ids().await {
            registry.apply_event(&id, SessionEvent::Authenticated).await;
        }
        registry
    }

    #[tokio::test]
    async fn no_ready_account_is_reported() {
        let registry = AccountRegistry::new(&accounts(2), 3);
        assert_eq!(
            registry.select_fair().await,
            Err(SelectionError::NoEligibleAccount)
        );
    }

    #[tokio::test]
    async fn cap_forces_a_switch_then_counter_resets() {
        let registry = ready_registry(2, 3, Box::new(FirstEligible)).await;
        let mut picks = Vec::new();
        for _ in 0..5 {
            picks.push(registry.select_fair().await.unwrap());
        }
        assert_eq!(
            picks,
            vec!["account_1", "account_1", "account_1", "account_2", "account_1"]
        );
    }

    #[tokio::test]
    async fn single_ready_account_ignores_cap() {
        let registry = ready_registry(1, 1, Box::new(FirstEligible)).await;
        for _ in 0..4 {
            assert_eq!(registry.select_fair().await.unwrap(), "account_1");
        }
    }

    #[tokio::test]
    async fn all_capped_resets_and_still_selects() {
        let registry = ready_registry(2, 2, Box::new(FirstEligible)).await;
        registry.set_uses("account_1", 2).await;
        registry.set_uses("account_2", 2).await;

        assert_eq!(registry.select_fair().await.unwrap(), "account_1");
        let snap = registry.snapshot().await;
        assert_eq!(snap[0].consecutive_uses, 1);
        assert_eq!(snap[1].consecutive_uses, 0);
    }

    #[tokio::test]
    async fn sticky_never_substitutes() {
        let registry = AccountRegistry::new(&accounts(2), 3);
        registry
            .apply_event("account_1", SessionEvent::Authenticated)
            .await;

        assert_eq!(registry.sticky("account_1").await.unwrap(), "account_1");
        assert_eq!(
            registry.sticky("account_2").await,
            Err(SelectionError::NotReady {
                account_id: "account_2".into()
            })
        );
        assert_eq!(
            registry.sticky("account_9").await,
            Err(SelectionError::UnknownAccount {
                account_id: "account_9".into()
            })
        );
    }

    #[tokio::test]
    async fn authenticated_set_is_idempotent_and_ordered() {
        let registry = AccountRegistry::new(&accounts(3), 3);
        registry
            .apply_event("account_3", SessionEvent::Authenticated)
            .await;
        registry
            .apply_event("account_1", SessionEvent::Authenticated)
            .await;
        registry
            .apply_event("account_3", SessionEvent::Authenticated)
            .await;
        assert_eq!(registry.authenticated().await, vec!["account_3", "account_1"]);
        // ready_ids follows configuration order instead.
        assert_eq!(registry.ready_ids().await, vec!["account_1", "account_3"]);
    }

    #[tokio::test]
    async fn process_exit_drops_readiness() {
        let registry = ready_registry(2, 3, Box::new(FirstEligible)).await;
        registry.mark_exited("account_1").await;
        assert_eq!(
            registry.state("account_1").await,
            Some(SessionState::Unauthenticated)
        );
        assert_eq!(registry.ready_ids().await, vec!["account_2"]);
    }

    #[tokio::test]
    async fn dead_handle_is_ineligible_immediately() {
        let registry = ready_registry(2, 3, Box::new(FirstEligible)).await;
        let cmd = WorkerCommand::from_parts(
            &["sh".to_string(), "-c".to_string(), "exit 0".to_string()],
            &BTreeMap::new(),
        )
        .unwrap();
        let (handle, _output) = spawn_session("account_1", &cmd, Path::new("l.json")).unwrap();
        handle.wait_exit().await;
        registry.attach_process("account_1", handle).await.unwrap();

        // Still READY by state, but the exit has been published.
        assert_eq!(registry.state("account_1").await, Some(SessionState::Ready));
        assert_eq!(
            registry.sticky("account_1").await,
            Err(SelectionError::NotReady {
                account_id: "account_1".into()
            })
        );
        assert_eq!(registry.select_fair().await.unwrap(), "account_2");
    }

    #[tokio::test]
    async fn snapshot_reports_running_and_authenticated() {
        let registry = AccountRegistry::new(&accounts(2), 3);
        registry
            .apply_event("account_2", SessionEvent::Authenticated)
            .await;
        let snap = registry.snapshot().await;
        assert_eq!(snap[0].display_name, "Account 1");
        assert!(!snap[0].authenticated);
        assert!(snap[1].authenticated);
        assert!(!snap[1].running);
    }

    proptest! {
        #[test]
        fn no_account_exceeds_the_cap(
            seed in any::<u64>(),
            n in 2usize..5,
            cap in 1u32..5,
            rounds in 1usize..200,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let runs = rt.block_on(async {
                let registry = ready_registry(n, cap, Box::new(RandomPicker::seeded(seed))).await;
                let mut picks = Vec::with_capacity(rounds);
                for _ in 0..rounds {
                    picks.push(registry.select_fair().await.unwrap());
                }
                picks
            });

            let mut streak = 0u32;
            let mut last: Option<&str> = None;
            for pick in &runs {
                streak = if last == Some(pick.as_str()) { streak + 1 } else { 1 };
                prop_assert!(streak <= cap);
                last = Some(pick.as_str());
            }
        }
    }
}
