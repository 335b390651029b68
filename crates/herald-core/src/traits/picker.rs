// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Choice policy used by fair account selection.

/// Chooses an index among `len` eligible candidates.
pub trait Picker: Send {
    /// `len` is always at least 1; the result must be below `len`.
    fn pick(&mut self, len: usize) -> usize;
}
