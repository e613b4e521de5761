//! Monotonic write timestamps for last-write-wins.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Hybrid logical clock: wall-clock microseconds, bumped past the previous
/// value when the wall clock stalls or steps backwards.
///
/// Every timestamp handed out by one clock is strictly greater than the
/// previous one, so two writes from this process never tie.
#[derive(Debug, Default)]
pub struct WriteClock {
    last: AtomicI64,
}

impl WriteClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next write timestamp: `max(now_micros, last + 1)`.
    pub fn next(&self) -> i64 {
        let now = Utc::now().timestamp_micros();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }

    /// Advance past a timestamp observed in storage (e.g. written by
    /// another process) so the next local write orders after it.
    pub fn observe(&self, ts: i64) {
        self.last.fetch_max(ts, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_strictly_increasing() {
        let clock = WriteClock::new();
        let mut prev = clock.next();
        for _ in 0..10_000 {
            let ts = clock.next();
            assert!(ts > prev);
            prev = ts;
        }
    }

    #[test]
    fn test_observe_moves_clock_forward() {
        let clock = WriteClock::new();
        let far_future = Utc::now().timestamp_micros() + 60_000_000;
        clock.observe(far_future);
        assert_eq!(clock.next(), far_future + 1);
    }

    #[test]
    fn test_unique_across_threads() {
        let clock = Arc::new(WriteClock::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = Arc::clone(&clock);
                std::thread::spawn(move || (0..1000).map(|_| clock.next()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<i64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        let total = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), total);
    }
}
