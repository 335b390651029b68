// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Herald multi-account messaging coordinator.
//!
//! This crate provides the error type, the session state machine, delivery
//! outcome types, and the traits through which the coordinator talks to
//! worker processes and the contact data source.

pub mod error;
pub mod phone;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{HeraldError, SelectionError};
pub use phone::normalize_phone;
pub use traits::{ContactSource, DeliveryAdapter, LineClassifier, Picker};
pub use types::{
    ContactRow, DeliveryFailure, DeliveryOutcome, SessionEvent, SessionState,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn herald_error_has_all_variants() {
        let _config = HeraldError::Config("test".into());
        let _ledger = HeraldError::Ledger {
            source: Box::new(std::io::Error::other("test")),
        };
        let _worker = HeraldError::Worker {
            account_id: "account_1".into(),
            message: "test".into(),
            source: None,
        };
        let _contacts = HeraldError::ContactSource {
            message: "test".into(),
            source: None,
        };
        let _internal = HeraldError::Internal("test".into());
    }

    #[test]
    fn run_fatal_classification() {
        assert!(HeraldError::NoWorkersStarted.is_run_fatal());
        assert!(
            HeraldError::NoAccountsAuthenticated {
                timeout: std::time::Duration::from_secs(120)
            }
            .is_run_fatal()
        );
        assert!(!HeraldError::Internal("x".into()).is_run_fatal());
    }

    #[test]
    fn selection_error_messages_name_the_account() {
        let err = SelectionError::NotReady {
            account_id: "account_2".into(),
        };
        assert!(err.to_string().contains("account_2"));
    }

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_delivery<T: DeliveryAdapter>() {}
        fn _assert_contacts<T: ContactSource>() {}
        fn _assert_classifier<T: LineClassifier>() {}
    }
}
