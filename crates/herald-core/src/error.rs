// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Herald coordinator.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The primary error type used across Herald crates.
#[derive(Debug, Error)]
pub enum HeraldError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Ledger store errors (serialization, write or rename failure).
    #[error("ledger error: {source}")]
    Ledger {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A worker process could not be started or supervised.
    #[error("worker error for {account_id}: {message}")]
    Worker {
        account_id: String,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The external contact source failed.
    #[error("contact source error: {message}")]
    ContactSource {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No account reached the ready state within the authentication window.
    #[error("no accounts authenticated within {timeout:?}")]
    NoAccountsAuthenticated { timeout: Duration },

    /// None of the configured workers could be started.
    #[error("no worker processes could be started")]
    NoWorkersStarted,

    /// A required worker executable could not be found.
    #[error("worker executable not found: {}", path.display())]
    ExecutableMissing { path: PathBuf },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HeraldError {
    /// Whether this error must abort the whole run rather than a single step.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            HeraldError::NoAccountsAuthenticated { .. }
                | HeraldError::NoWorkersStarted
                | HeraldError::ExecutableMissing { .. }
                | HeraldError::Config(_)
        )
    }
}

/// Outcome of asking the registry for an account to deliver with.
///
/// These are expected, recoverable conditions; callers back off and retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// The sticky assignee exists but is not ready.
    #[error("assigned account {account_id} is not ready")]
    NotReady { account_id: String },

    /// The sticky assignee is not a configured account.
    #[error("assigned account {account_id} is not configured")]
    UnknownAccount { account_id: String },

    /// No ready account is available for fair selection.
    #[error("no eligible account")]
    NoEligibleAccount,
}
