// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graceful shutdown coordination with signal handling.
//!
//! SIGTERM and SIGINT (Ctrl+C) cancel the same [`CancellationToken`] the
//! operator's `terminate` command does. Workers are then stopped gracefully
//! and killed if they outlive the grace period.

use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::AccountRegistry;

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is received.
/// The handler task exits early if the token is cancelled by other means.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => token_clone.cancel(),
            _ = token_clone.cancelled() => {}
        }
        debug!("shutdown signal handler completed");
    });

    token
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {
                        info!("received SIGINT (Ctrl+C), initiating shutdown");
                    }
                    _ = sigterm.recv() => {
                        info!("received SIGTERM, initiating shutdown");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "could not install SIGTERM handler, listening for Ctrl+C only");
                let _ = ctrl_c.await;
                info!("received SIGINT (Ctrl+C), initiating shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("received Ctrl+C, initiating shutdown");
    }
}

/// Stops every registered worker: graceful request, grace period, forced kill.
///
/// Workers are stopped concurrently; the call returns once all have exited.
pub async fn stop_workers(registry: &AccountRegistry, grace: Duration) {
    let handles = registry.take_processes().await;
    if handles.is_empty() {
        debug!("no workers to stop");
        return;
    }

    info!(count = handles.len(), ?grace, "stopping workers");
    let mut stopping = JoinSet::new();
    for handle in handles {
        stopping.spawn(async move {
            let exit = handle.shutdown(grace).await;
            (handle.account_id().to_string(), exit)
        });
    }

    while let Some(joined) = stopping.join_next().await {
        match joined {
            Ok((account, exit)) => debug!(account = %account, %exit, "worker stopped"),
            Err(e) => warn!(error = %e, "worker stop task failed"),
        }
    }
    info!("all workers stopped");
}
