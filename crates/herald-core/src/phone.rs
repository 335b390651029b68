// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phone number normalization into `+<country><digits>` form.

/// Normalizes a raw phone value for use as a ledger recipient.
///
/// All non-digit characters are dropped. Numbers already starting with the
/// country code only gain a leading `+`; everything else is prefixed with
/// `+<country_code>`. An input without digits yields just `+<country_code>`.
pub fn normalize_phone(raw: &str, country_code: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return format!("+{country_code}");
    }
    if digits.starts_with(country_code) {
        format!("+{digits}")
    } else {
        format!("+{country_code}{digits}")
    }
}
