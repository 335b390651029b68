// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `herald stats` command implementation.

use herald_agent::render_stats;
use herald_config::HeraldConfig;
use herald_ledger::LedgerStore;

/// Prints ledger statistics the same way the console `stats` command does.
pub async fn run_stats(config: &HeraldConfig) {
    let ledger = LedgerStore::new(config.coordinator.ledger_path.clone());
    println!("{}", config.coordinator.ledger_path.display());
    // Offline: no workers run, so there is no authenticated count to report.
    print!("{}", render_stats(&ledger.stats().await, None));
}
