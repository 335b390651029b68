// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery adapter trait for one-shot message hand-off to a worker.

use async_trait::async_trait;

use crate::types::DeliveryOutcome;

/// Hands a single message to the worker bound to `account_id`.
///
/// Implementations never return an error: every failure mode is folded into
/// [`DeliveryOutcome::Failed`] so the dispatch loop can record it in the ledger.
#[async_trait]
pub trait DeliveryAdapter: Send + Sync {
    /// Delivers `body` to `recipient` through the given account's worker.
    async fn deliver_one(&self, account_id: &str, recipient: &str, body: &str)
    -> DeliveryOutcome;
}
