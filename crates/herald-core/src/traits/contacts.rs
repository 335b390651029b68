// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact source trait for the external recipient query.

use async_trait::async_trait;

use crate::error::HeraldError;
use crate::types::ContactRow;

/// Produces candidate recipients, in the source's row order.
#[async_trait]
pub trait ContactSource: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Runs the query. An unconfigured source returns `Ok(vec![])`.
    async fn fetch(&self) -> Result<Vec<ContactRow>, HeraldError>;
}
