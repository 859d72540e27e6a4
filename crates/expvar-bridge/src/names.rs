//! Sanitization and validation logic for metric names.

use std::{error, fmt};

/// Chars in snapshot keys that are not allowed in metric names.
const REPLACED_CHARS: &[char] = &[':', '.'];

/// Converts an arbitrary snapshot key into a metric name by replacing each `:` and `.` with `_`.
/// All other chars are retained as is.
///
/// ```
/// # use expvar_bridge::sanitize;
/// assert_eq!(sanitize("a.b:c"), "a_b_c");
/// assert_eq!(sanitize("req_count"), "req_count");
/// ```
pub fn sanitize(key: &str) -> String {
    key.replace(REPLACED_CHARS, "_")
}

/// Error returned when a metric name does not match `[a-zA-Z_][a-zA-Z0-9_]*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidName {
    reason: &'static str,
}

impl InvalidName {
    /// Returns a human-readable reason why the name was rejected.
    pub fn reason(&self) -> &'static str {
        self.reason
    }
}

impl fmt::Display for InvalidName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.reason)
    }
}

impl error::Error for InvalidName {}

const fn is_valid_start_name_char(ch: u8) -> bool {
    ch == b'_' || ch.is_ascii_alphabetic()
}

const fn is_valid_name_char(ch: u8) -> bool {
    ch == b'_' || ch.is_ascii_alphanumeric()
}

/// Checks that a (sanitized) metric name can be used in the exposition format.
///
/// # Errors
///
/// Returns an error describing the first violation.
pub fn validate_metric_name(name: &str) -> Result<(), InvalidName> {
    let reason = if name.is_empty() {
        "name cannot be empty"
    } else if !name.is_ascii() {
        "name contains non-ASCII chars"
    } else if !is_valid_start_name_char(name.as_bytes()[0]) {
        "name starts with disallowed char (allowed chars: [_a-zA-Z])"
    } else if !name.bytes().all(is_valid_name_char) {
        "name contains disallowed char (allowed chars: [_a-zA-Z0-9])"
    } else {
        return Ok(());
    };
    Err(InvalidName { reason })
}
