// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::HeraldConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &HeraldConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.coordinator.ledger_path.as_os_str().is_empty() {
        errors.push(ConfigError::validation(
            "coordinator.ledger_path must not be empty",
        ));
    }

    if config.coordinator.max_consecutive_uses < 1 {
        errors.push(ConfigError::validation(
            "coordinator.max_consecutive_uses must be at least 1",
        ));
    }

    if config.accounts.is_empty() {
        errors.push(ConfigError::validation(
            "at least one [[accounts]] entry is required",
        ));
    }

    let mut seen_ids = HashSet::new();
    for (i, account) in config.accounts.iter().enumerate() {
        if account.id.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "accounts[{i}].id must not be empty"
            )));
        } else if !seen_ids.insert(account.id.as_str()) {
            errors.push(ConfigError::validation(format!(
                "duplicate account id `{}` in [[accounts]] array",
                account.id
            )));
        }
    }

    if config.worker.session_command.is_empty() {
        errors.push(ConfigError::validation(
            "worker.session_command must name a program",
        ));
    }

    if config.worker.sender_command.is_empty() {
        errors.push(ConfigError::validation(
            "worker.sender_command must name a program",
        ));
    }

    if config.worker.send_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "worker.send_timeout_secs must be greater than 0",
        ));
    }

    if config.auth.timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "auth.timeout_secs must be greater than 0",
        ));
    }

    if config.auth.poll_interval_ms == 0 {
        errors.push(ConfigError::validation(
            "auth.poll_interval_ms must be greater than 0",
        ));
    }

    if config.markers.ready.iter().all(|m| m.is_empty()) {
        errors.push(ConfigError::validation(
            "markers.ready needs at least one non-empty marker",
        ));
    }

    let cc = &config.contacts.country_code;
    if cc.is_empty() || !cc.chars().all(|c| c.is_ascii_digit()) {
        errors.push(ConfigError::validation(format!(
            "contacts.country_code must be digits only, got `{cc}`"
        )));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
