// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! File-backed ledger store.
//!
//! Every operation runs under one async mutex, so readers never observe a
//! partial write and read-modify-write helpers are atomic with respect to
//! other callers in the process. Saves write a sibling temp file and rename
//! it over the ledger; a crash at any point leaves either the old or the new
//! complete document on disk.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use herald_core::{DeliveryOutcome, HeraldError};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::model::{LedgerStats, Task};

/// Durable, mutually-exclusive access to the ledger document.
#[derive(Debug)]
pub struct LedgerStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the full ledger.
    ///
    /// A missing or unreadable document is logged and treated as empty; the
    /// sequencer can always regenerate it.
    pub async fn load(&self) -> Vec<Task> {
        let _guard = self.lock.lock().await;
        self.read_unlocked().await
    }

    /// Overwrites the ledger with `tasks`.
    pub async fn save(&self, tasks: &[Task]) -> Result<(), HeraldError> {
        let _guard = self.lock.lock().await;
        self.write_unlocked(tasks).await
    }

    /// Replaces the ledger with an empty document.
    pub async fn clear(&self) -> Result<(), HeraldError> {
        self.save(&[]).await?;
        info!(path = %self.path.display(), "ledger cleared");
        Ok(())
    }

    /// Records a delivery outcome on the first task addressed to `recipient`.
    ///
    /// Returns `Ok(false)` without touching the file when no task matches.
    pub async fn mark_outcome(
        &self,
        recipient: &str,
        account_id: &str,
        outcome: &DeliveryOutcome,
    ) -> Result<bool, HeraldError> {
        let _guard = self.lock.lock().await;
        let mut tasks = self.read_unlocked().await;

        let Some(task) = tasks.iter_mut().find(|t| t.recipient == recipient) else {
            warn!(recipient, account = account_id, "no ledger entry to mark");
            return Ok(false);
        };

        let now = Utc::now();
        match outcome {
            DeliveryOutcome::Delivered => {
                task.record_success(account_id, now);
                info!(recipient, account = account_id, "marked as sent");
            }
            DeliveryOutcome::Failed(failure) => {
                task.record_failure(account_id, failure, now);
                warn!(recipient, account = account_id, %failure, "marked as failed");
            }
        }

        self.write_unlocked(&tasks).await?;
        Ok(true)
    }

    /// Statistics over a consistent snapshot.
    pub async fn stats(&self) -> LedgerStats {
        LedgerStats::from_tasks(&self.load().await)
    }

    async fn read_unlocked(&self) -> Vec<Task> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "ledger not found, starting empty");
                return Vec::new();
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "failed to read ledger");
                return Vec::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "ledger is corrupt, treating as empty");
                Vec::new()
            }
        }
    }

    async fn write_unlocked(&self, tasks: &[Task]) -> Result<(), HeraldError> {
        let bytes = serde_json::to_vec_pretty(tasks).map_err(ledger_err)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(ledger_err)?;
        }

        let tmp = self.temp_path();
        if let Err(e) = write_synced(&tmp, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(ledger_err(e));
        }

        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(ledger_err(e));
        }

        debug!(path = %self.path.display(), tasks = tasks.len(), "ledger saved");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ledger".to_string());
        self.path
            .with_file_name(format!(".{name}.tmp-{}", uuid::Uuid::new_v4().simple()))
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

fn ledger_err(e: impl std::error::Error + Send + Sync + 'static) -> HeraldError {
    HeraldError::Ledger {
        source: Box::new(e),
    }
}
