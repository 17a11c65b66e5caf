//! Global clock with bounded uncertainty
//!
//! The transactional store needs timestamps such that commit order and
//! read order agree: a read timestamp issued after a commit returned must be
//! greater than that commit's timestamp. `GlobalClock` provides this by
//! combining the wall clock with a monotonic floor:
//!
//! ```text
//! tick() = max(wall_now, last_issued + 1)
//! ```
//!
//! `now()` reports the wall clock as an interval `[earliest, latest]`
//! widened by the configured uncertainty. Callers that want external
//! consistency across machines can "commit-wait" until `earliest` has
//! passed their commit timestamp.

use crate::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Wall-clock reading with an uncertainty window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeInterval {
    /// No earlier than this
    pub earliest: Timestamp,
    /// No later than this
    pub latest: Timestamp,
}

impl TimeInterval {
    /// True if `ts` is definitely in the past
    pub fn after(&self, ts: Timestamp) -> bool {
        self.earliest > ts
    }
}

/// Monotonic timestamp source shared by every transaction of a store
#[derive(Debug)]
pub struct GlobalClock {
    /// Highest timestamp ever issued by `tick()`
    last_issued: AtomicU64,
    /// Half-width of the uncertainty window
    uncertainty: Duration,
}

impl GlobalClock {
    /// Create a clock with the given uncertainty bound
    pub fn new(uncertainty: Duration) -> Self {
        Self {
            last_issued: AtomicU64::new(0),
            uncertainty,
        }
    }

    /// Uncertainty bound this clock reports
    pub fn uncertainty(&self) -> Duration {
        self.uncertainty
    }

    /// Current wall-clock interval
    pub fn now(&self) -> TimeInterval {
        let wall = Timestamp::now();
        TimeInterval {
            earliest: wall.saturating_sub(self.uncertainty),
            latest: wall.saturating_add(self.uncertainty),
        }
    }

    /// Issue a strictly increasing timestamp
    ///
    /// Never returns the same value twice and never goes backwards, even if
    /// the wall clock does.
    pub fn tick(&self) -> Timestamp {
        let wall = Timestamp::now().as_micros();
        let mut current = self.last_issued.load(Ordering::Acquire);
        loop {
            let next = wall.max(current.saturating_add(1));
            match self.last_issued.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Timestamp::from_micros(next),
                Err(observed) => current = observed,
            }
        }
    }

    /// Highest timestamp issued so far
    pub fn last_issued(&self) -> Timestamp {
        Timestamp::from_micros(self.last_issued.load(Ordering::Acquire))
    }

    /// Block until `ts` is definitely in the past on every clock
    ///
    /// Returns how long the caller waited.
    pub fn wait_until_past(&self, ts: Timestamp) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            let interval = self.now();
            if interval.after(ts) {
                return waited;
            }
            let remaining = ts
                .duration_since(interval.earliest)
                .unwrap_or_default()
                .max(Duration::from_micros(50));
            std::thread::sleep(remaining);
            waited += remaining;
        }
    }
}

impl Default for GlobalClock {
    fn default() -> Self {
        Self::new(Duration::from_millis(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_tick_strictly_increasing() {
        let clock = GlobalClock::default();
        let mut prev = clock.tick();
        for _ in 0..1_000 {
            let next = clock.tick();
            assert!(next > prev);
            prev = next;
        }
        assert_eq!(clock.last_issued(), prev);
    }

    #[test]
    fn test_tick_unique_across_threads() {
        let clock = Arc::new(GlobalClock::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = Arc::clone(&clock);
                thread::spawn(move || (0..500).map(|_| clock.tick()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<Timestamp> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total, "tick() must never repeat a timestamp");
    }

    #[test]
    fn test_interval_bounds() {
        let clock = GlobalClock::new(Duration::from_millis(5));
        let interval = clock.now();
        assert!(interval.earliest < interval.latest);
        assert_eq!(
            interval.latest.duration_since(interval.earliest),
            Some(Duration::from_millis(10))
        );
    }

    #[test]
    fn test_commit_wait() {
        let clock = GlobalClock::new(Duration::from_millis(1));
        let ts = clock.tick();
        clock.wait_until_past(ts);
        assert!(clock.now().after(ts));
    }
}
