// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Herald integration tests.
//!
//! Provides stub collaborators and a dispatch harness for fast,
//! deterministic tests without worker executables or a contact database.
//!
//! # Components
//!
//! - [`ScriptedDelivery`] - Delivery stub with scripted per-recipient failures
//! - [`FirstEligiblePicker`] - Deterministic fair-selection policy
//! - [`TestHarness`] - Registry, temp ledger and stub wired for dispatch

pub mod harness;
pub mod mock_delivery;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use herald_contacts::StaticContactSource;
pub use mock_delivery::{DeliveryCall, FirstEligiblePicker, ScriptedDelivery};
