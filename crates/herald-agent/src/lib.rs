// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Coordination layer of the Herald messaging coordinator.
//!
//! The [`PhaseSequencer`] drives a run:
//! - Starts one worker per account and waits for authentication
//! - Builds the ledger with sticky assignments over the ready accounts
//! - Restarts the workers and drains the ledger with the [`Dispatcher`]
//! - Serves the [`OperatorConsole`] until the operator terminates
//!
//! Shared state lives in two places: the [`AccountRegistry`] in memory and
//! the ledger store on disk.

pub mod console;
pub mod dispatch;
pub mod monitor;
pub mod registry;
pub mod sequencer;
pub mod shutdown;

pub use console::{ConsoleCommand, OperatorConsole, render_stats, render_status};
pub use dispatch::{DispatchPacing, DispatchReport, DispatchSummary, Dispatcher};
pub use monitor::{run_monitor, run_monitor_to};
pub use registry::{AccountRegistry, AccountSnapshot, RandomPicker};
pub use sequencer::{Collaborators, PhaseSequencer, PhaseSettings, materialize};
pub use shutdown::{install_signal_handler, stop_workers};
