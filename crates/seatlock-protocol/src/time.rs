//! Wall-clock helpers.
//!
//! Session records and seat claims carry unix-epoch milliseconds so they stay
//! comparable across processes and survive serialization. Monotonic time is
//! only used for in-process timers, never persisted.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in unix-epoch milliseconds.
///
/// A clock set before the epoch reads as 0 rather than failing; every
/// consumer treats timestamps with saturating arithmetic.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_millis_is_monotonic_enough() {
        let first = now_millis();
        let second = now_millis();

        // Same-millisecond reads are fine; going backwards is not.
        assert!(second >= first);
    }

    #[test]
    fn test_now_millis_is_past_2020() {
        // 2020-01-01T00:00:00Z in unix millis.
        assert!(now_millis() > 1_577_836_800_000);
    }
}
