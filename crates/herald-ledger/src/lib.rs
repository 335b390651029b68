// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable task ledger for the Herald coordinator.
//!
//! The ledger is a single JSON document shared with the worker executables.
//! [`LedgerStore`] serializes all access inside the coordinator and replaces
//! the file atomically on every write.

pub mod model;
pub mod store;

pub use model::{Attempt, ERROR_MARKER_PREFIX, LedgerStats, Task};
pub use store::LedgerStore;
