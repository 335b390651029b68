// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker executables as seen from the coordinator.
//!
//! Session workers are long-running processes, one per account, whose output
//! drives the account's authentication state. Sender workers are one-shot
//! processes that hand a single message to the account's messaging session.

pub mod classifier;
pub mod command;
pub mod delivery;
pub mod handle;

pub use classifier::MarkerClassifier;
pub use command::WorkerCommand;
pub use delivery::ProcessDelivery;
pub use handle::{WorkerExit, WorkerHandle, WorkerOutput, spawn_session};
