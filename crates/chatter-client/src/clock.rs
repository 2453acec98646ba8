//! Lamport clock shared by both transport paths.
//!
//! A single non-negative counter per session establishes a causal partial
//! order between messages without relying on wall-clock time. Two operations
//! mutate it: `tick` before every locally-initiated envelope, and `merge` for
//! every received one.
//!
//! # Invariants
//!
//! - Monotonicity: the value never decreases; every operation strictly
//!   increases it until the counter saturates at `u64::MAX`.
//! - After any send or receive, the clock is at least the clock of every
//!   message this session has sent or learned about so far.

use std::sync::atomic::{AtomicU64, Ordering};

/// Session-scoped logical clock.
///
/// Updates are lock-free: the command path and the fan-out listener may
/// interleave tick/merge in any order, and each operation lands atomically.
/// Merge only ever moves the counter forward, so interleavings cannot violate
/// monotonicity.
#[derive(Debug, Default)]
pub struct LamportClock {
    value: AtomicU64,
}

impl LamportClock {
    /// Create a clock at value 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value, for reporting only.
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Advance by one for a locally-initiated envelope.
    ///
    /// Returns the new value, which becomes the envelope's clock field.
    pub fn tick(&self) -> u64 {
        self.advance(0)
    }

    /// Fold in the clock of a received envelope.
    ///
    /// Sets the counter to `max(current, received) + 1` and returns the new
    /// value. A message with no clock field merges as 0, which degrades to a
    /// plain increment.
    pub fn merge(&self, received: u64) -> u64 {
        self.advance(received)
    }

    /// Set the counter to `max(current, received) + 1`, saturating.
    ///
    /// The received value comes straight off the wire, so a hostile or
    /// corrupt `u64::MAX` clock must pin the counter at the ceiling rather
    /// than overflow.
    fn advance(&self, received: u64) -> u64 {
        let mut current = self.value.load(Ordering::Acquire);
        loop {
            let next = current.max(received).saturating_add(1);
            match self.value.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn starts_at_zero() {
        assert_eq!(LamportClock::new().value(), 0);
    }

    #[test]
    fn tick_increments_by_one() {
        let clock = LamportClock::new();
        assert_eq!(clock.tick(), 1);
        assert_eq!(clock.tick(), 2);
        assert_eq!(clock.value(), 2);
    }

    #[test]
    fn merge_takes_max_plus_one() {
        let clock = LamportClock::new();
        for _ in 0..5 {
            clock.tick();
        }

        // Behind us: plain increment.
        assert_eq!(clock.merge(3), 6);
        // Ahead of us: jump past the received value.
        assert_eq!(clock.merge(9), 10);
    }

    #[test]
    fn merge_at_max_saturates_instead_of_wrapping() {
        let clock = LamportClock::new();

        // A wire-supplied ceiling clock pins the counter without overflow.
        assert_eq!(clock.merge(u64::MAX), u64::MAX);
        assert_eq!(clock.value(), u64::MAX);

        // Later operations hold at the ceiling; the value never wraps to 0.
        assert_eq!(clock.tick(), u64::MAX);
        assert_eq!(clock.merge(7), u64::MAX);
        assert_eq!(clock.value(), u64::MAX);
    }

    #[test]
    fn merge_without_received_clock_degrades_to_increment() {
        let clock = LamportClock::new();
        clock.tick();
        assert_eq!(clock.merge(0), 2);
    }

    #[test]
    fn concurrent_merges_never_lose_updates() {
        let clock = Arc::new(LamportClock::new());
        let mut handles = Vec::new();

        for t in 0..4u64 {
            let clock = Arc::clone(&clock);
            handles.push(std::thread::spawn(move || {
                for i in 0..250 {
                    clock.merge(t * 250 + i);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // 1000 merges, each advancing by at least one.
        assert!(clock.value() >= 1000);
    }

    proptest! {
        #[test]
        fn every_operation_strictly_increases(ops in proptest::collection::vec(
            prop_oneof![Just(None), any::<u32>().prop_map(|v| Some(u64::from(v)))],
            1..64,
        )) {
            let clock = LamportClock::new();
            for op in ops {
                let before = clock.value();
                let after = match op {
                    None => clock.tick(),
                    Some(received) => {
                        let merged = clock.merge(received);
                        prop_assert_eq!(merged, before.max(received) + 1);
                        merged
                    },
                };
                prop_assert!(after > before);
                prop_assert_eq!(after, clock.value());
            }
        }
    }
}
