//! Jittered exponential backoff for the streaming supervisor.
//!
//! Pure function, no state: the supervisor threads the previous delay back in
//! on every call and resets to zero after a successful iteration.

use rand::Rng;

const FLOOR_SECS: f64 = 0.5;
const CEILING_SECS: f64 = 120.0;
const MULTIPLIER: f64 = 1.15;

/// Compute the next backoff delay, in seconds, given the current one.
///
/// `current` below the floor is treated as the floor. The result is
/// `current * 1.15 * (1 + U)` for `U` uniform on `[0, 1)`, clamped to
/// `[0.5, 120.0]`.
pub fn next_backoff(current: f64) -> f64 {
    let base = current.max(FLOOR_SECS);
    let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
    let grown = base * MULTIPLIER * (1.0 + jitter);
    grown.min(CEILING_SECS).max(FLOOR_SECS)
}
