// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `herald doctor` command implementation.
//!
//! Runs preflight checks against the Herald environment: configuration,
//! worker executables, the ledger document and the contacts database.

use std::io::IsTerminal;
use std::path::Path;
use std::time::{Duration, Instant};

use herald_config::HeraldConfig;
use herald_config::model::ContactsConfig;
use herald_ledger::LedgerStore;
use herald_worker::WorkerCommand;
use rusqlite::OpenFlags;

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    /// Check passed successfully.
    Pass,
    /// Check passed with a warning.
    Warn,
    /// Check failed.
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    /// Human-readable message.
    pub message: String,
    /// Duration the check took.
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Run the `herald doctor` command.
///
/// Returns `false` when any check failed.
pub async fn run_doctor(config: &HeraldConfig, config_path: Option<&Path>, plain: bool) -> bool {
    let use_color = !plain && std::io::stdout().is_terminal();

    let results = vec![
        check_config(config_path),
        check_worker("Session worker", &config.worker.session_command, config),
        check_worker("Sender worker", &config.worker.sender_command, config),
        check_ledger(&config.coordinator.ledger_path).await,
        check_contacts(&config.contacts).await,
    ];

    println!();
    println!("  herald doctor");
    println!("  {}", "-".repeat(50));

    let mut fail_count = 0;
    let mut warn_count = 0;

    for result in &results {
        let duration_ms = result.duration.as_millis();
        let line = match (&result.status, use_color) {
            (CheckStatus::Pass, true) => {
                use colored::Colorize;
                format!(
                    "    {} {:<16} {} ({duration_ms}ms)",
                    "✓".green(),
                    result.name,
                    result.message
                )
            }
            (CheckStatus::Pass, false) => format!(
                "    [OK]   {:<16} {} ({duration_ms}ms)",
                result.name, result.message
            ),
            (CheckStatus::Warn, true) => {
                use colored::Colorize;
                format!(
                    "    {} {:<16} {} ({duration_ms}ms)",
                    "!".yellow(),
                    result.name,
                    result.message.yellow()
                )
            }
            (CheckStatus::Warn, false) => format!(
                "    [WARN] {:<16} {} ({duration_ms}ms)",
                result.name, result.message
            ),
            (CheckStatus::Fail, true) => {
                use colored::Colorize;
                format!(
                    "    {} {:<16} {} ({duration_ms}ms)",
                    "✗".red(),
                    result.name,
                    result.message.red()
                )
            }
            (CheckStatus::Fail, false) => format!(
                "    [FAIL] {:<16} {} ({duration_ms}ms)",
                result.name, result.message
            ),
        };
        match result.status {
            CheckStatus::Warn => warn_count += 1,
            CheckStatus::Fail => fail_count += 1,
            CheckStatus::Pass => {}
        }
        println!("{line}");
    }

    println!();
    if fail_count > 0 || warn_count > 0 {
        let issues = fail_count + warn_count;
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
    } else {
        println!("  All checks passed.");
    }
    println!();

    fail_count == 0
}

/// Check configuration loads without errors.
fn check_config(path: Option<&Path>) -> CheckResult {
    let start = Instant::now();
    let loaded = match path {
        Some(path) => herald_config::load_and_validate_path(path),
        None => herald_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => CheckResult::new(
            "Configuration",
            CheckStatus::Pass,
            format!("valid ({} accounts)", config.accounts.len()),
            start,
        ),
        Err(errors) => CheckResult::new(
            "Configuration",
            CheckStatus::Fail,
            format!("{} error(s)", errors.len()),
            start,
        ),
    }
}

/// Check a worker command resolves to an executable (and its script exists).
fn check_worker(name: &str, parts: &[String], config: &HeraldConfig) -> CheckResult {
    let start = Instant::now();
    let command = match WorkerCommand::from_parts(parts, &config.worker.env) {
        Ok(command) => command,
        Err(e) => return CheckResult::new(name, CheckStatus::Fail, e.to_string(), start),
    };
    match command.preflight() {
        Ok(()) => CheckResult::new(name, CheckStatus::Pass, parts.join(" "), start),
        Err(e) => CheckResult::new(name, CheckStatus::Fail, e.to_string(), start),
    }
}

/// Check the ledger document, if one exists.
async fn check_ledger(path: &Path) -> CheckResult {
    let start = Instant::now();
    if !path.exists() {
        return CheckResult::new(
            "Ledger",
            CheckStatus::Warn,
            format!("not found: {} (created on first run)", path.display()),
            start,
        );
    }

    let stats = LedgerStore::new(path).stats().await;
    let message = format!(
        "{} tasks, {} unsent, {} failed",
        stats.total, stats.unsent, stats.failed
    );
    CheckResult::new("Ledger", CheckStatus::Pass, message, start)
}

/// Check the contacts query is configured and its database opens.
async fn check_contacts(config: &ContactsConfig) -> CheckResult {
    let start = Instant::now();
    if config.message.trim().is_empty() {
        return CheckResult::new(
            "Contacts",
            CheckStatus::Warn,
            "no message configured, no tasks will be generated",
            start,
        );
    }
    if config.effective_query().is_none() {
        return CheckResult::new(
            "Contacts",
            CheckStatus::Warn,
            "no query configured, no tasks will be generated",
            start,
        );
    }
    let Some(db_path) = config.database_path.as_deref() else {
        return CheckResult::new(
            "Contacts",
            CheckStatus::Fail,
            "contacts.database_path is not set",
            start,
        );
    };
    if !db_path.exists() {
        return CheckResult::new(
            "Contacts",
            CheckStatus::Fail,
            format!("database not found: {}", db_path.display()),
            start,
        );
    }

    let conn = match tokio_rusqlite::Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY,
    )
    .await
    {
        Ok(conn) => conn,
        Err(e) => {
            return CheckResult::new(
                "Contacts",
                CheckStatus::Fail,
                format!("open failed: {e}"),
                start,
            );
        }
    };

    let query_result = conn
        .call(|conn| conn.execute_batch("SELECT 1"))
        .await;
    match query_result {
        Ok(()) => CheckResult::new("Contacts", CheckStatus::Pass, "database readable", start),
        Err(e) => CheckResult::new(
            "Contacts",
            CheckStatus::Fail,
            format!("query failed: {e}"),
            start,
        ),
    }
}

#[cfg(test)]
mod tests {
    use herald_ledger::Task;

    use super::*;

    #[test]
    fn check_status_equality() {
        assert_eq!(CheckStatus::Pass, CheckStatus::Pass);
        assert_ne!(CheckStatus::Pass, CheckStatus::Fail);
    }

    #[test]
    fn missing_worker_executable_fails() {
        let config = HeraldConfig::default();
        let result = check_worker(
            "Session worker",
            &["herald-doctor-no-such-binary".to_string()],
            &config,
        );
        assert_eq!(result.status, CheckStatus::Fail);
        assert!(result.message.contains("not found"));
    }

    #[test]
    fn shell_worker_passes() {
        let config = HeraldConfig::default();
        let result = check_worker(
            "Session worker",
            &["sh".to_string(), "-c".to_string(), "true".to_string()],
            &config,
        );
        assert_eq!(result.status, CheckStatus::Pass);
    }

    #[tokio::test]
    async fn missing_ledger_warns() {
        let result = check_ledger(Path::new("/tmp/nonexistent-herald-ledger-xyz.json")).await;
        assert_eq!(result.status, CheckStatus::Warn);
        assert!(result.message.contains("not found"));
    }

    #[tokio::test]
    async fn present_ledger_reports_unsent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.json");
        LedgerStore::new(&path)
            .save(&[Task::new("+1", "m", 0, None), Task::new("+2", "m", 0, None)])
            .await
            .unwrap();

        let result = check_ledger(&path).await;
        assert_eq!(result.status, CheckStatus::Pass);
        assert!(result.message.contains("2 tasks, 2 unsent"));
    }

    #[tokio::test]
    async fn unconfigured_contacts_warn() {
        let result = check_contacts(&ContactsConfig::default()).await;
        assert_eq!(result.status, CheckStatus::Warn);
    }

    #[tokio::test]
    async fn readable_contacts_database_passes() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("crm.db");
        rusqlite::Connection::open(&db)
            .unwrap()
            .execute_batch("CREATE TABLE contacts (Telefone TEXT);")
            .unwrap();

        let config = ContactsConfig {
            message: "hello".to_string(),
            database_path: Some(db),
            query: Some("SELECT Telefone FROM contacts".to_string()),
            ..Default::default()
        };
        let result = check_contacts(&config).await;
        assert_eq!(result.status, CheckStatus::Pass);
    }
}
