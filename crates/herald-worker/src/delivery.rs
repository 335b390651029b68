// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot delivery through the sender executable.
//!
//! Each send writes a scratch ledger holding exactly one task, runs the
//! sender against it with a bounded wait, and removes the scratch file on
//! every path out.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use herald_core::{DeliveryAdapter, DeliveryFailure, DeliveryOutcome};
use herald_ledger::Task;
use tracing::{debug, warn};

use crate::command::WorkerCommand;

/// Delivers messages by launching the sender executable once per message.
#[derive(Debug, Clone)]
pub struct ProcessDelivery {
    command: WorkerCommand,
    scratch_dir: PathBuf,
    timeout: Duration,
}

impl ProcessDelivery {
    pub fn new(command: WorkerCommand, scratch_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            command,
            scratch_dir: scratch_dir.into(),
            timeout,
        }
    }

    async fn write_scratch(
        &self,
        account_id: &str,
        recipient: &str,
        body: &str,
    ) -> Result<ScratchFile, DeliveryFailure> {
        let task = Task::new(recipient, body, 0, Some(account_id.to_string()));
        let bytes = serde_json::to_vec_pretty(&[task]).map_err(io_failure)?;

        let path = self.scratch_dir.join(format!(
            "temp_{account_id}_{}.json",
            uuid::Uuid::new_v4().simple()
        ));
        let scratch = ScratchFile(path);
        tokio::fs::write(scratch.path(), bytes)
            .await
            .map_err(io_failure)?;
        Ok(scratch)
    }
}

#[async_trait]
impl DeliveryAdapter for ProcessDelivery {
    async fn deliver_one(&self, account_id: &str, recipient: &str, body: &str) -> DeliveryOutcome {
        let scratch = match self.write_scratch(account_id, recipient, body).await {
            Ok(scratch) => scratch,
            Err(failure) => {
                warn!(account = account_id, recipient, %failure, "could not write scratch ledger");
                return DeliveryOutcome::Failed(failure);
            }
        };

        let mut cmd = self.command.build(account_id, scratch.path());
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(account = account_id, recipient, scratch = %scratch.path().display(), "running sender");
        let outcome = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                warn!(account = account_id, recipient, timeout = ?self.timeout, "sender timed out");
                DeliveryOutcome::Failed(DeliveryFailure::Timeout)
            }
            Ok(Err(e)) => {
                warn!(account = account_id, recipient, error = %e, "sender could not be run");
                DeliveryOutcome::Failed(DeliveryFailure::NonZeroExit { code: None })
            }
            Ok(Ok(output)) if output.status.success() => DeliveryOutcome::Delivered,
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(
                    account = account_id,
                    recipient,
                    code = ?output.status.code(),
                    stderr = %stderr.trim(),
                    "sender exited with failure"
                );
                DeliveryOutcome::Failed(DeliveryFailure::NonZeroExit {
                    code: output.status.code(),
                })
            }
        };

        drop(scratch);
        outcome
    }
}

fn io_failure(e: impl std::fmt::Display) -> DeliveryFailure {
    DeliveryFailure::Io {
        message: e.to_string(),
    }
}

/// Scratch ledger path, removed when dropped.
#[derive(Debug)]
struct ScratchFile(PathBuf);

impl ScratchFile {
    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                warn!(path = %self.0.display(), error = %e, "failed to remove scratch ledger");
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn delivery(dir: &Path, script: &str, timeout: Duration) -> ProcessDelivery {
        let command = WorkerCommand::from_parts(
            &["sh".to_string(), "-c".to_string(), script.to_string()],
            &BTreeMap::new(),
        )
        .unwrap();
        ProcessDelivery::new(command, dir, timeout)
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn zero_exit_is_delivered_and_scratch_removed() {
        let dir = tempfile::tempdir().unwrap();
        let d = delivery(dir.path(), "test -f \"$1\"", Duration::from_secs(5));
        let outcome = d.deliver_one("account_1", "+5511", "hi").await;
        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn scratch_ledger_holds_one_task_for_the_account() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("copy.json");
        let script = format!("cp \"$1\" {}", out.display());
        let scratch = tempfile::tempdir().unwrap();
        let d = delivery(scratch.path(), &script, Duration::from_secs(5));

        assert!(d.deliver_one("account_2", "+5531", "olá").await.is_delivered());

        let tasks: Vec<Task> =
            serde_json::from_slice(&std::fs::read(&out).unwrap()).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].recipient, "+5531");
        assert_eq!(tasks[0].body, "olá");
        assert_eq!(tasks[0].delay_millis, 0);
        assert_eq!(tasks[0].sent_by.as_deref(), Some("account_2"));
        assert!(!tasks[0].sent);
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure_with_code() {
        let dir = tempfile::tempdir().unwrap();
        let d = delivery(dir.path(), "echo boom 1>&2; exit 4", Duration::from_secs(5));
        assert_eq!(
            d.deliver_one("account_1", "+5511", "hi").await,
            DeliveryOutcome::Failed(DeliveryFailure::NonZeroExit { code: Some(4) })
        );
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn slow_sender_times_out_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let d = delivery(dir.path(), "sleep 10", Duration::from_millis(200));
        assert_eq!(
            d.deliver_one("account_1", "+5511", "hi").await,
            DeliveryOutcome::Failed(DeliveryFailure::Timeout)
        );
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn unwritable_scratch_dir_is_io_failure() {
        let d = delivery(Path::new("/nonexistent/herald"), "true", Duration::from_secs(5));
        assert!(matches!(
            d.deliver_one("account_1", "+5511", "hi").await,
            DeliveryOutcome::Failed(DeliveryFailure::Io { .. })
        ));
    }

    #[tokio::test]
    async fn missing_sender_is_nonzero_exit_without_code() {
        let dir = tempfile::tempdir().unwrap();
        let command = WorkerCommand::from_parts(
            &["/nonexistent/herald-sender".to_string()],
            &BTreeMap::new(),
        )
        .unwrap();
        let d = ProcessDelivery::new(command, dir.path(), Duration::from_secs(5));
        assert_eq!(
            d.deliver_one("account_1", "+5511", "hi").await,
            DeliveryOutcome::Failed(DeliveryFailure::NonZeroExit { code: None })
        );
        assert!(dir_is_empty(dir.path()));
    }
}
