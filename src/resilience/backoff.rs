//! Exponential backoff.

use std::time::Duration;

/// Delay to wait before retry number `retry` (1-based).
///
/// Retry 1 waits `initial`, retry 2 waits `2 * initial`, and so on. Retry 0
/// means "first attempt" and never waits.
pub fn calculate_backoff(retry: u32, initial: Duration) -> Duration {
    if retry == 0 {
        return Duration::ZERO;
    }

    let factor = 2u32.saturating_pow(retry - 1);
    initial.saturating_mul(factor)
}
