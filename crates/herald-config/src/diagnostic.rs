// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration diagnostics.
//!
//! Figment reports every problem it finds in one error value. Each one is
//! turned into a [`ConfigError`] that miette can render: unknown keys point
//! at the offending line in `herald.toml` and suggest the closest valid key.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use figment::error::Kind;
use miette::{Diagnostic, GraphicalReportHandler, NamedSource, SourceSpan};
use thiserror::Error;

/// Jaro-Winkler score a valid key must beat to be offered as a correction.
const SUGGESTION_THRESHOLD: f64 = 0.75;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(herald::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        /// Closest valid key, when one is similar enough.
        suggestion: Option<String>,
        /// Comma-separated keys accepted in the same section.
        valid_keys: String,
        #[label("this key is not recognized")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("invalid type for key `{key}`: {detail}")]
    #[diagnostic(code(herald::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        /// Dotted path, e.g. `dispatch.backoff_ms`.
        key: String,
        detail: String,
        expected: String,
    },

    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(herald::config::missing_key),
        help("add `{key} = <value>` to your herald.toml")
    )]
    MissingKey { key: String },

    /// A value that parsed but breaks a rule checked after loading.
    #[error("validation error: {message}")]
    #[diagnostic(code(herald::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(herald::config::other))]
    Other(String),
}

impl ConfigError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        ConfigError::Validation {
            message: message.into(),
        }
    }

    /// Maps one figment error, using `sources` (path, content) to place spans.
    fn from_figment(error: &figment::Error, sources: &[(String, String)]) -> Self {
        match &error.kind {
            Kind::UnknownField(field, expected) => {
                let location = locate_key(error, field, sources);
                let (span, src) = match location {
                    Some((span, src)) => (Some(span), Some(src)),
                    None => (None, None),
                };
                ConfigError::UnknownKey {
                    key: field.clone(),
                    suggestion: suggest_key(field, expected),
                    valid_keys: expected.join(", "),
                    span,
                    src,
                }
            }
            Kind::MissingField(field) => ConfigError::MissingKey {
                key: field.to_string(),
            },
            Kind::InvalidType(actual, expected) => ConfigError::InvalidType {
                key: error.path.join("."),
                detail: format!("found {actual}, expected {expected}"),
                expected: expected.clone(),
            },
            _ => ConfigError::Other(error.to_string()),
        }
    }
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Expands a figment error into one diagnostic per reported problem.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| ConfigError::from_figment(&error, toml_sources))
        .collect()
}

/// Span of `field` inside the TOML file the error came from, if it was read
/// from one of `sources`.
fn locate_key(
    error: &figment::Error,
    field: &str,
    sources: &[(String, String)],
) -> Option<(SourceSpan, NamedSource<String>)> {
    let figment::Source::File(origin) = error.metadata.as_ref()?.source.as_ref()? else {
        return None;
    };
    let origin = origin.display().to_string();
    let (path, content) = sources.iter().find(|(path, _)| *path == origin)?;

    let offset = find_key_offset(content, &error.path, field)?;
    Some((
        SourceSpan::new(offset.into(), field.len()),
        NamedSource::new(path, content.clone()),
    ))
}

/// Byte offset of `field` as a key line below the first header for `path[0]`
/// (`[section]` or `[[section]]`), or from the top when `path` is empty.
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let start = match path.first() {
        None => 0,
        Some(section) => section_body_start(content, section)?,
    };

    let mut offset = start;
    for line in content[start..].split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        if is_key_line(&line[indent..], field) {
            return Some(offset + indent);
        }
        offset += line.len();
    }
    None
}

fn section_body_start(content: &str, section: &str) -> Option<usize> {
    [format!("[[{section}]]"), format!("[{section}]")]
        .iter()
        .find_map(|header| content.find(header.as_str()).map(|pos| pos + header.len()))
}

fn is_key_line(line: &str, field: &str) -> bool {
    line.strip_prefix(field)
        .is_some_and(|rest| rest.starts_with([' ', '\t', '=']))
}

/// Closest valid key above [`SUGGESTION_THRESHOLD`].
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Prints every error to stderr with miette's graphical report.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut report = String::new();
        match handler.render_report(&mut report, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{report}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggest_ledger_path_for_typo() {
        let valid = &["log_level", "ledger_path", "max_consecutive_uses"];
        assert_eq!(
            suggest_key("ledgr_path", valid),
            Some("ledger_path".to_string())
        );
    }

    #[test]
    fn no_suggestion_for_distant_typo() {
        let valid = &["ready", "failed", "authenticating"];
        assert_eq!(suggest_key("zzzzzz", valid), None);
    }

    #[test]
    fn find_key_offset_in_array_of_tables() {
        let content = "[coordinator]\nlog_level = \"info\"\n\n[[accounts]]\nid = \"a\"\nnmae = \"A\"\n";
        let path = vec!["accounts".to_string()];
        let offset = find_key_offset(content, &path, "nmae").unwrap();
        assert_eq!(&content[offset..offset + 4], "nmae");
    }

    #[test]
    fn find_key_offset_in_section() {
        let content = "[contacts]\n  mesage = \"hi\"\n";
        let path = vec!["contacts".to_string()];
        let offset = find_key_offset(content, &path, "mesage").unwrap();
        assert_eq!(&content[offset..offset + 6], "mesage");
    }

    #[test]
    fn key_prefix_of_a_longer_key_is_not_matched() {
        let content = "[dispatch]\nbackoff_ms = 1\n";
        let path = vec!["dispatch".to_string()];
        assert_eq!(find_key_offset(content, &path, "backoff"), None);
    }
}
