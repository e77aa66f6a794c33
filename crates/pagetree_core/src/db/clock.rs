//! Monotonic epoch-millisecond clock for persisted timestamps.
//!
//! # Invariants
//! - Every call returns a value strictly greater than the previous call in
//!   this process, even when the wall clock stalls or steps backwards.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST_STAMP_MS: AtomicI64 = AtomicI64::new(0);

/// Returns the next timestamp in epoch milliseconds.
pub fn now_ms() -> i64 {
    let wall = wall_clock_ms();
    let mut last = LAST_STAMP_MS.load(Ordering::Acquire);
    loop {
        let next = wall.max(last + 1);
        match LAST_STAMP_MS.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => return next,
            Err(current) => last = current,
        }
    }
}

fn wall_clock_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::now_ms;

    #[test]
    fn stamps_strictly_increase() {
        let mut previous = now_ms();
        for _ in 0..1_000 {
            let next = now_ms();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn stamps_track_wall_clock() {
        // 2020-01-01T00:00:00Z
        assert!(now_ms() > 1_577_836_800_000);
    }
}
