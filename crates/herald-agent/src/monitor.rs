// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session monitor: turns a worker's output into session state changes.

use std::sync::Arc;
use std::time::Duration;

use herald_core::LineClassifier;
use herald_worker::{WorkerExit, WorkerOutput};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::registry::AccountRegistry;

/// Bound on reading output still buffered when the process exits.
const DRAIN_AFTER_EXIT: Duration = Duration::from_millis(500);

/// Follows one worker until its process exits, echoing its output to stdout.
///
/// Every line is echoed so the operator sees QR prompts and worker chatter;
/// classified lines additionally update the registry. When the process ends
/// the account is forced out of READY.
pub async fn run_monitor(
    output: WorkerOutput,
    registry: Arc<AccountRegistry>,
    classifier: Arc<dyn LineClassifier>,
) -> WorkerExit {
    let mut stdout = tokio::io::stdout();
    run_monitor_to(output, registry, classifier, &mut stdout).await
}

/// [`run_monitor`] with the echo going to `echo` instead of stdout.
pub async fn run_monitor_to<W>(
    mut output: WorkerOutput,
    registry: Arc<AccountRegistry>,
    classifier: Arc<dyn LineClassifier>,
    echo: &mut W,
) -> WorkerExit
where
    W: AsyncWrite + Unpin,
{
    let account_id = output.account_id().to_string();
    let exit_signal = output.exit_signal();
    tokio::pin!(exit_signal);
    let mut monitor = LineHandler {
        account_id: &account_id,
        registry: &registry,
        classifier: classifier.as_ref(),
        echo,
    };

    let exit = loop {
        tokio::select! {
            biased;
            line = output.next_line() => match line {
                Some(line) => monitor.handle(&line).await,
                None => break (&mut exit_signal).await,
            },
            exit = &mut exit_signal => {
                let drain = async {
                    while let Some(line) = output.next_line().await {
                        monitor.handle(&line).await;
                    }
                };
                if tokio::time::timeout(DRAIN_AFTER_EXIT, drain).await.is_err() {
                    debug!(account = %account_id, "output still open after exit, not waiting further");
                }
                break exit;
            }
        }
    };

    let state = registry.mark_exited(&account_id).await;
    if output.stop_was_requested() {
        debug!(account = %account_id, %exit, "worker stopped");
    } else {
        let name = registry
            .display_name(&account_id)
            .await
            .unwrap_or_else(|| account_id.clone());
        warn!(account = %name, %exit, state = ?state, "worker stopped unexpectedly");
    }
    exit
}

struct LineHandler<'a, W> {
    account_id: &'a str,
    registry: &'a AccountRegistry,
    classifier: &'a dyn LineClassifier,
    echo: &'a mut W,
}

impl<W: AsyncWrite + Unpin> LineHandler<'_, W> {
    async fn handle(&mut self, line: &str) {
        if let Err(e) = echo_line(self.echo, line).await {
            debug!(account = self.account_id, error = %e, "could not echo worker output");
        }

        if let Some(event) = self.classifier.classify(line) {
            debug!(account = self.account_id, %event, line, "classified worker output");
            self.registry.apply_event(self.account_id, event).await;
        }
    }
}

async fn echo_line<W: AsyncWrite + Unpin>(echo: &mut W, line: &str) -> std::io::Result<()> {
    echo.write_all(line.as_bytes()).await?;
    echo.write_all(b"\n").await?;
    echo.flush().await
}
