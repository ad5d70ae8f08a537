//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Delay before `attempt` (1-based). Attempt 0 never waits.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt - 1)).min(max_ms);

    // up to 10% jitter on top
    let spread = delay_ms / 10;
    let jitter = if spread > 0 {
        rand::thread_rng().gen_range(0..spread)
    } else {
        0
    };

    Duration::from_millis(delay_ms + jitter)
}
