// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Substring marker classification of worker output.

use herald_config::model::MarkerConfig;
use herald_core::{LineClassifier, SessionEvent};

/// Classifies lines by the configured ready, failed and progress markers.
///
/// A ready marker takes precedence over a failure marker on the same line.
#[derive(Debug, Clone)]
pub struct MarkerClassifier {
    ready: Vec<String>,
    failed: Vec<String>,
    authenticating: Vec<String>,
}

impl MarkerClassifier {
    pub fn new(config: &MarkerConfig) -> Self {
        let keep = |markers: &[String]| {
            markers
                .iter()
                .filter(|m| !m.is_empty())
                .cloned()
                .collect::<Vec<_>>()
        };
        Self {
            ready: keep(&config.ready),
            failed: keep(&config.failed),
            authenticating: keep(&config.authenticating),
        }
    }
}

impl Default for MarkerClassifier {
    fn default() -> Self {
        Self::new(&MarkerConfig::default())
    }
}

impl LineClassifier for MarkerClassifier {
    fn classify(&self, line: &str) -> Option<SessionEvent> {
        let hit = |markers: &[String]| markers.iter().any(|m| line.contains(m.as_str()));
        if hit(&self.ready) {
            Some(SessionEvent::Authenticated)
        } else if hit(&self.failed) {
            Some(SessionEvent::AuthenticationFailed)
        } else if hit(&self.authenticating) {
            Some(SessionEvent::Authenticating)
        } else {
            None
        }
    }
}
