// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed recipient query.

use std::path::PathBuf;

use async_trait::async_trait;
use herald_config::model::ContactsConfig;
use herald_core::{ContactRow, ContactSource, HeraldError};
use rusqlite::OpenFlags;
use rusqlite::types::ValueRef;
use tracing::{error, info, warn};

/// Runs the configured query against a SQLite database, read-only.
///
/// A failing query is logged and answered with the configured fallback rows,
/// so the contacts phase never aborts a run.
#[derive(Debug, Clone)]
pub struct SqliteContactSource {
    database_path: Option<PathBuf>,
    query: Option<String>,
    phone_column: String,
    fallback: Vec<ContactRow>,
}

fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> HeraldError {
    HeraldError::ContactSource {
        message: e.to_string(),
        source: Some(Box::new(e)),
    }
}

impl SqliteContactSource {
    pub fn from_config(config: &ContactsConfig) -> Self {
        Self {
            database_path: config.database_path.clone(),
            query: config.effective_query().map(str::to_string),
            phone_column: config.phone_column.clone(),
            fallback: config
                .fallback_phones
                .iter()
                .map(|p| ContactRow::new(p.as_str()))
                .collect(),
        }
    }

    async fn run_query(&self, query: &str) -> Result<Vec<ContactRow>, HeraldError> {
        let path = self
            .database_path
            .clone()
            .ok_or_else(|| HeraldError::ContactSource {
                message: "contacts.database_path is not set".to_string(),
                source: None,
            })?;

        let conn =
            tokio_rusqlite::Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)
                .await
                .map_err(|e| HeraldError::ContactSource {
                    message: format!("cannot open {}: {e}", path.display()),
                    source: Some(Box::new(e)),
                })?;

        let query = query.to_string();
        let column = self.phone_column.clone();
        conn.call(move |conn| {
            let mut stmt = conn.prepare(&query)?;
            let idx = stmt.column_index(&column)?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let phone = match row.get_ref(idx)? {
                    ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                    ValueRef::Integer(n) => n.to_string(),
                    ValueRef::Real(f) => format!("{f:.0}"),
                    ValueRef::Null | ValueRef::Blob(_) => String::new(),
                };
                out.push(ContactRow::new(phone));
            }
            Ok(out)
        })
        .await
        .map_err(map_tr_err)
    }
}

#[async_trait]
impl ContactSource for SqliteContactSource {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn fetch(&self) -> Result<Vec<ContactRow>, HeraldError> {
        let Some(query) = self.query.as_deref() else {
            warn!("no contacts query configured, skipping contact generation");
            return Ok(Vec::new());
        };

        match self.run_query(query).await {
            Ok(rows) => {
                info!(rows = rows.len(), "contacts query returned");
                Ok(rows)
            }
            Err(e) => {
                error!(error = %e, fallback = self.fallback.len(), "contacts query failed, using fallback rows");
                Ok(self.fallback.clone())
            }
        }
    }
}
