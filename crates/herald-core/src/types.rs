// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the ledger, worker, and coordinator crates.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Authentication lifecycle stage of one account's worker session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// No session yet, or the worker process went away.
    Unauthenticated,
    /// The worker is showing a login prompt or loading a stored session.
    Authenticating,
    /// The session is authenticated and may deliver messages.
    Ready,
    /// The worker reported an authentication failure.
    Failed,
}

impl SessionState {
    /// Returns `true` only for [`SessionState::Ready`].
    pub fn is_ready(self) -> bool {
        self == SessionState::Ready
    }

    /// Applies a classified worker output event and returns the new state.
    ///
    /// Success and failure markers win from any state. Authentication
    /// progress never demotes a ready session.
    pub fn apply(self, event: SessionEvent) -> SessionState {
        match event {
            SessionEvent::Authenticated => SessionState::Ready,
            SessionEvent::AuthenticationFailed => SessionState::Failed,
            SessionEvent::Authenticating => match self {
                SessionState::Unauthenticated | SessionState::Failed => {
                    SessionState::Authenticating
                }
                other => other,
            },
        }
    }

    /// State after the worker process exits without the monitor seeing a failure.
    pub fn on_process_exit(self) -> SessionState {
        match self {
            SessionState::Failed => SessionState::Failed,
            _ => SessionState::Unauthenticated,
        }
    }
}

/// A session-relevant event recognised in a worker output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum SessionEvent {
    /// Login prompt or session loading in progress.
    Authenticating,
    /// Worker reports an authenticated, ready client.
    Authenticated,
    /// Worker reports that authentication failed.
    AuthenticationFailed,
}

/// One row produced by the external contact source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRow {
    /// Raw phone value as stored in the source, before normalization.
    pub phone: String,
}

impl ContactRow {
    pub fn new(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
        }
    }
}

/// Result of handing one message to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The worker exited successfully after the send.
    Delivered,
    /// The worker did not confirm the send.
    Failed(DeliveryFailure),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// Why a one-shot delivery did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The worker did not finish within the bounded wait and was killed.
    Timeout,
    /// The worker exited with a non-zero status. `code` is `None` when it
    /// was killed by a signal or could not be run or read.
    NonZeroExit { code: Option<i32> },
    /// Preparing the scratch ledger failed.
    Io { message: String },
}

impl std::fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryFailure::Timeout => write!(f, "timeout"),
            DeliveryFailure::NonZeroExit { code: Some(code) } => {
                write!(f, "nonzero_exit({code})")
            }
            DeliveryFailure::NonZeroExit { code: None } => write!(f, "nonzero_exit"),
            DeliveryFailure::Io { message } => write!(f, "io({message})"),
        }
    }
}
