//! Terminal-error classifier.
//!
//! Distinguishes runtime errors the supervisor should retry from ones it
//! should give up on immediately. A container whose logging driver can't be
//! read back will never start working after a backoff, so retrying it is
//! pure noise.

use crate::runtime::RuntimeError;

const UNSUPPORTED_DRIVER_SUBSTRING: &str = "configured logging driver does not support reading";

/// Returns `true` if `err` will never resolve on retry.
///
/// Two signals are terminal: an HTTP 501 status, or a message indicating the
/// container's logging driver doesn't support log reads at all. Both are
/// checked regardless of which `RuntimeError` variant carries them, since the
/// runtime API can surface the same message as either an API error or a
/// transport error depending on where it fails.
pub fn is_terminal(err: &RuntimeError) -> bool {
    if err.status() == Some(501) {
        return true;
    }
    err.to_string().contains(UNSUPPORTED_DRIVER_SUBSTRING)
}
