// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `herald run` command implementation.
//!
//! Wires the configured collaborators (SQLite contact source, process
//! delivery, marker classifier, session worker command) into the phase
//! sequencer and serves the operator console on stdin/stdout. SIGINT and
//! SIGTERM end the run the same way `terminate` does.

use std::sync::Arc;

use herald_agent::{
    AccountRegistry, Collaborators, DispatchReport, DispatchSummary, PhaseSequencer,
    PhaseSettings, install_signal_handler,
};
use herald_config::HeraldConfig;
use herald_contacts::SqliteContactSource;
use herald_core::HeraldError;
use herald_ledger::LedgerStore;
use herald_worker::{MarkerClassifier, ProcessDelivery, WorkerCommand};
use tracing::{info, warn};

/// Runs the coordinator until the operator terminates.
pub async fn run_coordinator(config: HeraldConfig) -> Result<DispatchSummary, HeraldError> {
    init_tracing(&config.coordinator.log_level);

    let session_command =
        WorkerCommand::from_parts(&config.worker.session_command, &config.worker.env)?;
    let sender_command =
        WorkerCommand::from_parts(&config.worker.sender_command, &config.worker.env)?;
    session_command.preflight()?;
    sender_command.preflight()?;

    let ledger = Arc::new(LedgerStore::new(config.coordinator.ledger_path.clone()));
    let registry = Arc::new(AccountRegistry::new(
        &config.accounts,
        config.coordinator.max_consecutive_uses,
    ));
    let collaborators = Collaborators {
        contacts: Arc::new(SqliteContactSource::from_config(&config.contacts)),
        delivery: Arc::new(ProcessDelivery::new(
            sender_command,
            config.coordinator.scratch_dir.clone(),
            config.worker.send_timeout(),
        )),
        classifier: Arc::new(MarkerClassifier::new(&config.markers)),
        session_command,
    };

    info!(
        accounts = config.accounts.len(),
        ledger = %config.coordinator.ledger_path.display(),
        "herald starting"
    );

    let cancel = install_signal_handler();
    let sequencer = PhaseSequencer::new(
        PhaseSettings::from(&config),
        registry,
        ledger,
        collaborators,
        cancel,
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let summary = sequencer.run(stdin, &mut stdout).await?;

    match summary.report {
        DispatchReport::AllDelivered => info!(
            delivered = summary.delivered,
            "run finished, all messages delivered"
        ),
        DispatchReport::RetryRequiresRestart { pending } => warn!(
            pending,
            delivered = summary.delivered,
            failed = summary.failed,
            "run finished with failed messages; restart herald to retry them"
        ),
        DispatchReport::Cancelled => info!(
            delivered = summary.delivered,
            failed = summary.failed,
            "run terminated before the ledger was drained"
        ),
    }
    Ok(summary)
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("herald={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
