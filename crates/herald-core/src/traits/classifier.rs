// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Line classifier trait used by the session monitor.

use crate::types::SessionEvent;

/// Maps one line of worker output to a session event, if it carries one.
pub trait LineClassifier: Send + Sync {
    fn classify(&self, line: &str) -> Option<SessionEvent>;
}

impl<F> LineClassifier for F
where
    F: Fn(&str) -> Option<SessionEvent> + Send + Sync,
{
    fn classify(&self, line: &str) -> Option<SessionEvent> {
        self(line)
    }
}
