// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seams between the coordinator and its external collaborators.
//!
//! Async adapters use `#[async_trait]` for dynamic dispatch compatibility.

pub mod classifier;
pub mod contacts;
pub mod delivery;
pub mod picker;

pub use classifier::LineClassifier;
pub use contacts::ContactSource;
pub use delivery::DeliveryAdapter;
pub use picker::Picker;
