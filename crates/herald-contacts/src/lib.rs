// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recipient sources consumed by the contacts phase.

pub mod fixed;
pub mod sqlite;

pub use fixed::StaticContactSource;
pub use sqlite::SqliteContactSource;
