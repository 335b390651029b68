// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-running session worker processes.
//!
//! [`spawn_session`] launches one worker per account and splits it into two
//! halves: a [`WorkerHandle`] used to query liveness and stop the process, and
//! a [`WorkerOutput`] that yields its output lines and its exit. A supervisor
//! task owns the child and publishes the exit on a watch channel, so any
//! number of observers can see it without racing on `wait()`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use herald_core::HeraldError;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{Notify, mpsc, watch};
use tracing::{debug, info, warn};

use crate::command::WorkerCommand;

/// Buffered output lines per worker before readers apply backpressure.
const LINE_BUFFER: usize = 256;

/// How a worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    /// Exit code; `None` when killed by a signal or when waiting failed.
    pub code: Option<i32>,
}

impl std::fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// Control half of a running session worker.
#[derive(Debug)]
pub struct WorkerHandle {
    account_id: String,
    pid: Option<u32>,
    exit: watch::Receiver<Option<WorkerExit>>,
    kill: Arc<Notify>,
    stop_requested: Arc<AtomicBool>,
}

/// Observation half of a running session worker.
#[derive(Debug)]
pub struct WorkerOutput {
    account_id: String,
    lines: mpsc::Receiver<String>,
    exit: watch::Receiver<Option<WorkerExit>>,
    stop_requested: Arc<AtomicBool>,
}

/// Launches a session worker for `account_id` against `ledger_path`.
///
/// Both stdout and stderr are captured line by line. Dropping the
/// [`WorkerHandle`] kills a worker that is still running.
pub fn spawn_session(
    account_id: &str,
    command: &WorkerCommand,
    ledger_path: &Path,
) -> Result<(WorkerHandle, WorkerOutput), HeraldError> {
    let mut cmd = command.build(account_id, ledger_path);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            HeraldError::ExecutableMissing {
                path: PathBuf::from(command.program()),
            }
        } else {
            HeraldError::Worker {
                account_id: account_id.to_string(),
                message: format!("failed to start worker: {e}"),
                source: Some(Box::new(e)),
            }
        }
    })?;

    let pid = child.id();
    info!(account = account_id, pid, "worker started");

    let (line_tx, line_rx) = mpsc::channel(LINE_BUFFER);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, line_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, line_tx));
    }

    let (exit_tx, exit_rx) = watch::channel(None);
    let kill = Arc::new(Notify::new());
    let kill_rx = kill.clone();
    let supervised = account_id.to_string();

    tokio::spawn(async move {
        let status = tokio::select! {
            status = child.wait() => status,
            _ = kill_rx.notified() => {
                if let Err(e) = child.start_kill() {
                    warn!(account = %supervised, error = %e, "failed to kill worker");
                }
                child.wait().await
            }
        };

        let exit = match status {
            Ok(status) => WorkerExit {
                code: status.code(),
            },
            Err(e) => {
                warn!(account = %supervised, error = %e, "failed to wait on worker");
                WorkerExit { code: None }
            }
        };
        debug!(account = %supervised, %exit, "worker exited");
        let _ = exit_tx.send(Some(exit));
    });

    let stop_requested = Arc::new(AtomicBool::new(false));
    let handle = WorkerHandle {
        account_id: account_id.to_string(),
        pid,
        exit: exit_rx.clone(),
        kill,
        stop_requested: stop_requested.clone(),
    };
    let output = WorkerOutput {
        account_id: account_id.to_string(),
        lines: line_rx,
        exit: exit_rx,
        stop_requested,
    };
    Ok((handle, output))
}

async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).await.is_err() {
            break;
        }
    }
}

async fn wait_for_exit(rx: &mut watch::Receiver<Option<WorkerExit>>) -> WorkerExit {
    match rx.wait_for(Option::is_some).await {
        Ok(exit) => (*exit).unwrap_or(WorkerExit { code: None }),
        Err(_) => WorkerExit { code: None },
    }
}

impl WorkerHandle {
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the process has not exited yet.
    pub fn is_alive(&self) -> bool {
        self.exit.borrow().is_none()
    }

    /// Asks the worker to terminate (SIGTERM on Unix, a kill elsewhere).
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        if !self.is_alive() {
            return;
        }

        #[cfg(unix)]
        if let Some(pid) = self.pid {
            // Safety: plain syscall on a pid owned by this handle's supervisor.
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if rc == 0 {
                debug!(account = %self.account_id, pid, "sent SIGTERM to worker");
                return;
            }
            warn!(account = %self.account_id, pid, "SIGTERM failed, killing worker");
        }

        self.kill.notify_one();
    }

    /// Kills the worker immediately.
    pub fn force_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        if self.is_alive() {
            self.kill.notify_one();
        }
    }

    /// Waits until the process has exited.
    pub async fn wait_exit(&self) -> WorkerExit {
        let mut rx = self.exit.clone();
        wait_for_exit(&mut rx).await
    }

    /// Requests a graceful stop, then kills the worker if it outlives `grace`.
    pub async fn shutdown(&self, grace: Duration) -> WorkerExit {
        self.request_stop();
        match tokio::time::timeout(grace, self.wait_exit()).await {
            Ok(exit) => exit,
            Err(_) => {
                warn!(account = %self.account_id, ?grace, "worker ignored stop request, killing");
                self.force_stop();
                self.wait_exit().await
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.is_alive() {
            debug!(account = %self.account_id, "worker handle dropped, killing worker");
            self.force_stop();
        }
    }
}

impl WorkerOutput {
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Next output line; `None` once both streams are closed.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Resolves once the process has exited; independent of `self`'s borrow.
    pub fn exit_signal(&self) -> impl Future<Output = WorkerExit> + Send + 'static {
        let mut rx = self.exit.clone();
        async move { wait_for_exit(&mut rx).await }
    }

    /// Whether the exit was asked for through the handle.
    pub fn stop_was_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}
