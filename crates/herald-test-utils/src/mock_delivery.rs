// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted delivery adapter for deterministic testing.
//!
//! `ScriptedDelivery` implements `DeliveryAdapter` without spawning any
//! process: every send succeeds unless the recipient was scripted to fail.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use herald_core::{DeliveryAdapter, DeliveryFailure, DeliveryOutcome, Picker};

/// One recorded `deliver_one` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryCall {
    pub account_id: String,
    pub recipient: String,
    pub body: String,
}

/// A delivery stub that succeeds by default and records every call.
#[derive(Debug, Default)]
pub struct ScriptedDelivery {
    failures: HashMap<String, DeliveryFailure>,
    calls: Mutex<Vec<DeliveryCall>>,
}

impl ScriptedDelivery {
    /// A stub where every delivery succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every delivery to `recipient` fail with `failure`.
    pub fn fail_for(mut self, recipient: impl Into<String>, failure: DeliveryFailure) -> Self {
        self.failures.insert(recipient.into(), failure);
        self
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> Vec<DeliveryCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Account ids of the calls received so far, in order.
    pub fn accounts_used(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.account_id).collect()
    }
}

#[async_trait]
impl DeliveryAdapter for ScriptedDelivery {
    async fn deliver_one(&self, account_id: &str, recipient: &str, body: &str) -> DeliveryOutcome {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(DeliveryCall {
                account_id: account_id.to_string(),
                recipient: recipient.to_string(),
                body: body.to_string(),
            });

        match self.failures.get(recipient) {
            Some(failure) => DeliveryOutcome::Failed(failure.clone()),
            None => DeliveryOutcome::Delivered,
        }
    }
}

/// Fair-selection policy that always takes the first eligible account.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstEligiblePicker;

impl Picker for FirstEligiblePicker {
    fn pick(&mut self, _len: usize) -> usize {
        0
    }
}
