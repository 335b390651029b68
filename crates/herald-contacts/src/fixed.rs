// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed list of recipients.

use async_trait::async_trait;
use herald_core::{ContactRow, ContactSource, HeraldError};

/// Yields the same rows on every fetch.
#[derive(Debug, Clone, Default)]
pub struct StaticContactSource {
    rows: Vec<ContactRow>,
}

impl StaticContactSource {
    pub fn new<I, S>(phones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rows: phones.into_iter().map(ContactRow::new).collect(),
        }
    }
}

#[async_trait]
impl ContactSource for StaticContactSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Result<Vec<ContactRow>, HeraldError> {
        Ok(self.rows.clone())
    }
}
