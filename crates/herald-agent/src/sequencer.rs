// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phase sequencer: authenticate, materialize, deliver.
//!
//! Sticky assignments may only target accounts known to be authenticated,
//! and that is only known once workers have run. The sequencer therefore
//! starts every worker against an empty ledger, waits for authentication,
//! stops the workers, writes the ledger with assignments over the accounts
//! that came up, and restarts the workers for delivery. Restarted workers
//! resume their stored sessions.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use herald_config::model::HeraldConfig;
use herald_core::{
    ContactRow, ContactSource, DeliveryAdapter, HeraldError, LineClassifier, normalize_phone,
};
use herald_ledger::{LedgerStore, Task};
use herald_worker::{WorkerCommand, WorkerExit, spawn_session};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::console::OperatorConsole;
use crate::dispatch::{DispatchPacing, DispatchReport, DispatchSummary, Dispatcher};
use crate::monitor::run_monitor;
use crate::registry::AccountRegistry;
use crate::shutdown::stop_workers;

/// Timing and content settings for one coordinator run.
#[derive(Debug, Clone)]
pub struct PhaseSettings {
    /// Delay between consecutive worker launches.
    pub launch_stagger: Duration,
    /// Upper bound on the phase-1 wait.
    pub auth_timeout: Duration,
    /// Readiness polling interval during phase 1.
    pub poll_interval: Duration,
    /// Wait between the graceful stop request and the forced kill.
    pub grace_period: Duration,
    /// Static message body for every task.
    pub message: String,
    /// Advisory pause after each successful send.
    pub delay_millis: u64,
    pub country_code: String,
    pub pacing: DispatchPacing,
}

impl From<&HeraldConfig> for PhaseSettings {
    fn from(config: &HeraldConfig) -> Self {
        Self {
            launch_stagger: config.worker.launch_stagger(),
            auth_timeout: config.auth.timeout(),
            poll_interval: config.auth.poll_interval(),
            grace_period: config.shutdown.grace_period(),
            message: config.contacts.message.clone(),
            delay_millis: config.contacts.delay_ms,
            country_code: config.contacts.country_code.clone(),
            pacing: DispatchPacing::from(&config.dispatch),
        }
    }
}

/// External collaborators the sequencer drives.
pub struct Collaborators {
    pub contacts: Arc<dyn ContactSource>,
    pub delivery: Arc<dyn DeliveryAdapter>,
    pub classifier: Arc<dyn LineClassifier>,
    pub session_command: WorkerCommand,
}

/// Runs the authenticate, materialize and deliver phases in order.
pub struct PhaseSequencer {
    settings: PhaseSettings,
    registry: Arc<AccountRegistry>,
    ledger: Arc<LedgerStore>,
    collaborators: Collaborators,
    cancel: CancellationToken,
    monitors: Mutex<JoinSet<WorkerExit>>,
}

impl PhaseSequencer {
    pub fn new(
        settings: PhaseSettings,
        registry: Arc<AccountRegistry>,
        ledger: Arc<LedgerStore>,
        collaborators: Collaborators,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            registry,
            ledger,
            collaborators,
            cancel,
            monitors: Mutex::new(JoinSet::new()),
        }
    }

    /// Runs a full coordinator session.
    ///
    /// The operator console reads `input` during delivery; the call returns
    /// once the operator terminates (or input ends, or the token is
    /// cancelled) and every worker has been stopped.
    pub async fn run<R, W>(&self, input: R, output: &mut W) -> Result<DispatchSummary, HeraldError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let result = self.run_phases(input, output).await;
        if let Err(e) = &result {
            error!(error = %e, "run aborted");
        }
        self.cancel.cancel();
        self.stop_all().await;
        result
    }

    async fn run_phases<R, W>(
        &self,
        input: R,
        output: &mut W,
    ) -> Result<DispatchSummary, HeraldError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let ready = self.authenticate().await?;
        if self.cancel.is_cancelled() {
            return Ok(cancelled());
        }

        self.materialize_ledger(&ready).await?;
        if self.cancel.is_cancelled() {
            return Ok(cancelled());
        }

        self.deliver(input, output).await
    }

    /// Phase 1: empty ledger, start workers, wait for authentication.
    ///
    /// Returns the ready account ids in configuration order.
    pub async fn authenticate(&self) -> Result<Vec<String>, HeraldError> {
        info!(phase = "authenticate", "starting authentication phase");
        self.ledger.clear().await?;

        let started = self.start_workers("authenticate").await?;
        let ready = self.wait_for_ready(&started).await;
        if self.cancel.is_cancelled() {
            return Ok(ready);
        }

        if ready.is_empty() {
            return Err(HeraldError::NoAccountsAuthenticated {
                timeout: self.settings.auth_timeout,
            });
        }
        info!(
            phase = "authenticate",
            ready = ready.len(),
            started = started.len(),
            accounts = ?ready,
            "authentication phase complete"
        );
        Ok(ready)
    }

    /// Phase 2: stop workers and write one task per recipient.
    ///
    /// Returns the number of tasks written.
    pub async fn materialize_ledger(&self, ready: &[String]) -> Result<usize, HeraldError> {
        info!(phase = "materialize", "stopping workers before building the ledger");
        self.stop_all().await;

        if self.settings.message.trim().is_empty() {
            warn!(phase = "materialize", "no message configured, skipping contact generation");
            return Ok(0);
        }

        let source = &self.collaborators.contacts;
        let rows = match source.fetch().await {
            Ok(rows) => rows,
            Err(e) => {
                error!(phase = "materialize", source = source.name(), error = %e, "contact source failed, no tasks generated");
                return Ok(0);
            }
        };

        let tasks = materialize(
            &rows,
            &self.settings.message,
            self.settings.delay_millis,
            &self.settings.country_code,
            ready,
        );
        self.ledger.save(&tasks).await?;
        info!(
            phase = "materialize",
            source = source.name(),
            rows = rows.len(),
            tasks = tasks.len(),
            accounts = ready.len(),
            "ledger materialized"
        );
        Ok(tasks.len())
    }

    /// Phase 3: restart workers, then dispatch alongside the console.
    async fn deliver<R, W>(&self, input: R, output: &mut W) -> Result<DispatchSummary, HeraldError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(phase = "deliver", "restarting workers for delivery");
        self.start_workers("deliver").await?;

        let dispatcher = Dispatcher::new(
            self.ledger.clone(),
            self.registry.clone(),
            self.collaborators.delivery.clone(),
            self.settings.pacing,
            self.cancel.clone(),
        );
        let dispatch = tokio::spawn(async move { dispatcher.run().await });

        let console = OperatorConsole::new(
            self.registry.clone(),
            self.ledger.clone(),
            self.cancel.clone(),
        );
        let console_result = console.run(input, output).await;

        let summary = dispatch
            .await
            .map_err(|e| HeraldError::Internal(format!("dispatch task failed: {e}")))?;
        console_result?;
        Ok(summary)
    }

    /// Starts every configured worker with staggered launches.
    ///
    /// A missing executable aborts; other start failures only lose that
    /// account. Returns the ids that started.
    async fn start_workers(&self, phase: &'static str) -> Result<Vec<String>, HeraldError> {
        let ids = self.registry.ids().await;
        let mut started = Vec::with_capacity(ids.len());

        for (i, id) in ids.iter().enumerate() {
            if i > 0 && !self.pause(self.settings.launch_stagger).await {
                break;
            }

            let spawned = spawn_session(
                id,
                &self.collaborators.session_command,
                self.ledger.path(),
            );
            match spawned {
                Ok((handle, output)) => {
                    self.registry.attach_process(id, handle).await?;
                    self.monitors.lock().await.spawn(run_monitor(
                        output,
                        self.registry.clone(),
                        self.collaborators.classifier.clone(),
                    ));
                    debug!(account = %id, phase, "session monitor attached");
                    started.push(id.clone());
                }
                Err(e @ HeraldError::ExecutableMissing { .. }) => return Err(e),
                Err(e) => error!(account = %id, phase, error = %e, "failed to start worker"),
            }
        }

        if started.is_empty() && !self.cancel.is_cancelled() {
            return Err(HeraldError::NoWorkersStarted);
        }
        Ok(started)
    }

    /// Polls until every started account is ready, the timeout passes or
    /// the run is cancelled.
    async fn wait_for_ready(&self, started: &[String]) -> Vec<String> {
        let deadline = Instant::now() + self.settings.auth_timeout;
        let ready_among_started = |ready: Vec<String>| -> Vec<String> {
            ready.into_iter().filter(|id| started.contains(id)).collect()
        };

        loop {
            let ready = ready_among_started(self.registry.ready_ids().await);
            if ready.len() == started.len() {
                return ready;
            }
            if Instant::now() >= deadline {
                warn!(
                    phase = "authenticate",
                    ready = ready.len(),
                    started = started.len(),
                    "authentication timed out, continuing with ready accounts"
                );
                return ready;
            }
            debug!(ready = ready.len(), started = started.len(), "waiting for authentication");
            let wait = self
                .settings
                .poll_interval
                .min(deadline.saturating_duration_since(Instant::now()));
            if !self.pause(wait).await {
                return ready_among_started(self.registry.ready_ids().await);
            }
        }
    }

    /// Stops every worker and waits for their monitors to finish.
    async fn stop_all(&self) {
        stop_workers(&self.registry, self.settings.grace_period).await;
        let mut monitors = self.monitors.lock().await;
        while let Some(joined) = monitors.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "session monitor task failed");
            }
        }
    }

    /// Sleeps unless cancelled; returns `false` on cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

fn cancelled() -> DispatchSummary {
    DispatchSummary {
        report: DispatchReport::Cancelled,
        delivered: 0,
        failed: 0,
    }
}

/// Builds the ledger for one run.
///
/// One task per distinct normalized recipient, in row order. Rows whose
/// phone has no digit and repeats of an earlier recipient are dropped. The
/// assignment cycles over `ready` by position among the kept rows. With no
/// ready accounts the tasks are left unassigned.
pub fn materialize(
    rows: &[ContactRow],
    body: &str,
    delay_millis: u64,
    country_code: &str,
    ready: &[String],
) -> Vec<Task> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter(|row| row.phone.chars().any(|c| c.is_ascii_digit()))
        .map(|row| normalize_phone(&row.phone, country_code))
        .filter(|recipient| seen.insert(recipient.clone()))
        .enumerate()
        .map(|(i, recipient)| {
            let assignee = (!ready.is_empty()).then(|| ready[i % ready.len()].clone());
            Task::new(recipient, body, delay_millis, assignee)
        })
        .collect()
}
