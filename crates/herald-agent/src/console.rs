// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator console: line-oriented status, statistics and termination.

use std::fmt::Write as _;
use std::sync::Arc;

use colored::Colorize;
use herald_core::{HeraldError, SessionState};
use herald_ledger::{LedgerStats, LedgerStore};
use strum::{Display, EnumString};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::registry::{AccountRegistry, AccountSnapshot};

/// Commands understood by the console, matched case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ConsoleCommand {
    Status,
    Stats,
    Terminate,
}

const VALID_COMMANDS: &str = "status, stats, terminate";

/// Reads operator commands until `terminate`, end of input or cancellation.
pub struct OperatorConsole {
    registry: Arc<AccountRegistry>,
    ledger: Arc<LedgerStore>,
    cancel: CancellationToken,
}

impl OperatorConsole {
    pub fn new(
        registry: Arc<AccountRegistry>,
        ledger: Arc<LedgerStore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            ledger,
            cancel,
        }
    }

    /// Serves commands from `input`, writing replies to `output`.
    ///
    /// Always cancels the shared token on return, so a closed input behaves
    /// exactly like `terminate`.
    pub async fn run<R, W>(&self, input: R, output: &mut W) -> Result<(), HeraldError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let result = self.serve(input, output).await;
        self.cancel.cancel();
        result
    }

    async fn serve<R, W>(&self, input: R, output: &mut W) -> Result<(), HeraldError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        write_reply(output, &format!("Commands: {VALID_COMMANDS}\n")).await?;
        let mut lines = input.lines();

        loop {
            let line = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                line = lines.next_line() => line,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("operator input closed, terminating");
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "failed to read operator input, terminating");
                    return Ok(());
                }
            };

            let input = line.trim();
            if input.is_empty() {
                continue;
            }

            let reply = match input.parse::<ConsoleCommand>() {
                Ok(ConsoleCommand::Status) => render_status(
                    &self.registry.snapshot().await,
                    self.registry.max_consecutive_uses(),
                ),
                Ok(ConsoleCommand::Stats) => render_stats(
                    &self.ledger.stats().await,
                    Some(self.registry.authenticated().await.len()),
                ),
                Ok(ConsoleCommand::Terminate) => {
                    info!("terminate requested by operator");
                    write_reply(output, "Terminating...\n").await?;
                    return Ok(());
                }
                Err(_) => format!(
                    "{} unknown command `{input}`; valid commands: {VALID_COMMANDS}\n",
                    "error:".red().bold()
                ),
            };
            write_reply(output, &reply).await?;
        }
    }
}

async fn write_reply<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> Result<(), HeraldError> {
    output
        .write_all(text.as_bytes())
        .await
        .map_err(|e| HeraldError::Internal(format!("console write failed: {e}")))?;
    output
        .flush()
        .await
        .map_err(|e| HeraldError::Internal(format!("console write failed: {e}")))
}

fn state_label(state: SessionState) -> String {
    let label = state.to_string();
    match state {
        SessionState::Ready => label.green().to_string(),
        SessionState::Authenticating => label.yellow().to_string(),
        SessionState::Failed => label.red().to_string(),
        SessionState::Unauthenticated => label.dimmed().to_string(),
    }
}

/// Per-account session snapshot, one line per account.
pub fn render_status(accounts: &[AccountSnapshot], cap: u32) -> String {
    let mut out = format!("{}\n", "Accounts".bold());
    for a in accounts {
        let _ = writeln!(
            out,
            "  {} ({}): {}, {}, {}, consecutive uses {}/{}",
            a.display_name,
            a.id,
            state_label(a.state),
            if a.running { "running" } else { "stopped" },
            if a.authenticated {
                "authenticated"
            } else {
                "not authenticated"
            },
            a.consecutive_uses,
            cap
        );
    }
    out
}

/// Ledger totals and the per-account breakdown, preceded by the number of
/// authenticated accounts when a live registry is available.
pub fn render_stats(stats: &LedgerStats, authenticated: Option<usize>) -> String {
    let mut out = String::new();
    if let Some(count) = authenticated {
        let _ = writeln!(out, "{} {count}", "Authenticated accounts:".bold());
    }
    let _ = writeln!(out, "{}", "Ledger".bold());
    let _ = writeln!(out, "  total:  {}", stats.total);
    let _ = writeln!(out, "  sent:   {}", stats.sent_success);
    let _ = writeln!(out, "  failed: {}", stats.failed);
    let _ = writeln!(out, "  unsent: {}", stats.unsent);

    let mut accounts: Vec<&String> = stats
        .success_by_account
        .keys()
        .chain(stats.failures_by_account.keys())
        .collect();
    accounts.sort();
    accounts.dedup();

    if !accounts.is_empty() {
        let _ = writeln!(out, "  by account:");
        for account in accounts {
            let sent = stats.success_by_account.get(account).copied().unwrap_or(0);
            let failed = stats.failures_by_account.get(account).copied().unwrap_or(0);
            let _ = writeln!(out, "    {account}: {sent} sent, {failed} failed");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use herald_config::model::AccountConfig;
    use herald_core::{DeliveryFailure, DeliveryOutcome, SessionEvent};
    use herald_ledger::Task;

    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        console: OperatorConsole,
        cancel: CancellationToken,
        registry: Arc<AccountRegistry>,
        ledger: Arc<LedgerStore>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(LedgerStore::new(dir.path().join("contacts.json")));
        let registry = Arc::new(AccountRegistry::new(
            &[
                AccountConfig::new("account_1", "Account 1"),
                AccountConfig::new("account_2", "Account 2"),
            ],
            3,
        ));
        let cancel = CancellationToken::new();
        Fixture {
            _dir: dir,
            console: OperatorConsole::new(registry.clone(), ledger.clone(), cancel.clone()),
            cancel,
            registry,
            ledger,
        }
    }

    async fn session(f: &Fixture, input: &str) -> String {
        let mut out = Vec::new();
        f.console.run(input.as_bytes(), &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn commands_parse_case_insensitively() {
        assert_eq!("STATUS".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Status);
        assert_eq!("Stats".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Stats);
        assert_eq!(
            "terminate".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Terminate
        );
        assert!("quit".parse::<ConsoleCommand>().is_err());
    }

    #[tokio::test]
    async fn status_lists_every_account() {
        let f = fixture();
        f.registry
            .apply_event("account_2", SessionEvent::Authenticated)
            .await;

        let out = session(&f, "status\nterminate\n").await;
        assert!(out.contains("Account 1 (account_1)"));
        assert!(out.contains("UNAUTHENTICATED"));
        assert!(out.contains("Account 2 (account_2)"));
        assert!(out.contains("READY"));
        assert!(out.contains("Terminating..."));
        assert!(f.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn stats_break_down_by_account() {
        let f = fixture();
        f.ledger
            .save(&[Task::new("+1", "m", 0, None), Task::new("+2", "m", 0, None)])
            .await
            .unwrap();
        f.ledger
            .mark_outcome("+1", "account_1", &DeliveryOutcome::Delivered)
            .await
            .unwrap();
        f.ledger
            .mark_outcome(
                "+2",
                "account_2",
                &DeliveryOutcome::Failed(DeliveryFailure::Timeout),
            )
            .await
            .unwrap();

        f.registry
            .apply_event("account_1", SessionEvent::Authenticated)
            .await;

        let out = session(&f, "  STATS  \n").await;
        let authenticated = out
            .lines()
            .find(|l| l.contains("Authenticated accounts:"))
            .unwrap();
        assert!(authenticated.ends_with(" 1"));
        assert!(out.contains("total:  2"));
        assert!(out.contains("sent:   1"));
        assert!(out.contains("failed: 1"));
        assert!(out.contains("unsent: 1"));
        assert!(out.contains("account_1: 1 sent, 0 failed"));
        assert!(out.contains("account_2: 0 sent, 1 failed"));
    }

    #[tokio::test]
    async fn unknown_input_lists_valid_commands() {
        let f = fixture();
        let out = session(&f, "\nhelp\n").await;
        assert!(out.contains("unknown command `help`"));
        assert!(out.contains("valid commands: status, stats, terminate"));
    }

    #[tokio::test]
    async fn end_of_input_terminates() {
        let f = fixture();
        session(&f, "").await;
        assert!(f.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn external_cancellation_stops_the_console() {
        let f = fixture();
        let (reader, _writer) = tokio::io::duplex(64);
        let cancel = f.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let mut out = Vec::new();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            f.console.run(tokio::io::BufReader::new(reader), &mut out),
        )
        .await
        .expect("console should stop on cancellation")
        .unwrap();
    }

    #[test]
    fn empty_stats_have_no_account_section() {
        let out = render_stats(&LedgerStats::default(), None);
        assert!(out.contains("total:  0"));
        assert!(!out.contains("Authenticated accounts"));
        assert!(!out.contains("by account"));
    }
}
