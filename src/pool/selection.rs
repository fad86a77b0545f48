//! Slot selection policies.
//!
//! A policy picks which slot a new job prefers. It is a pure function of
//! pool size and internal cursor state: policies know nothing about slot
//! busyness, queueing, or workers, and are swappable without touching the
//! pool engine.

// ============================================================================
// Imports
// ============================================================================

use rand::Rng;

// ============================================================================
// SelectionPolicy
// ============================================================================

/// Strategy for picking the preferred slot for a new job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Cycles through slots in order, wrapping modulo pool size.
    RoundRobin {
        /// Next index to hand out.
        cursor: usize,
    },
    /// Draws a uniformly random index per call.
    Random,
}

impl SelectionPolicy {
    /// Creates a round-robin policy starting at slot 0.
    #[inline]
    #[must_use]
    pub fn round_robin() -> Self {
        Self::RoundRobin { cursor: 0 }
    }

    /// Creates a uniform-random policy.
    #[inline]
    #[must_use]
    pub fn random() -> Self {
        Self::Random
    }

    /// Returns the preferred slot index for the next job.
    ///
    /// `size` must be at least 1; the pool builder enforces this.
    pub fn next(&mut self, size: usize) -> usize {
        debug_assert!(size > 0, "selection over an empty pool");
        match self {
            Self::RoundRobin { cursor } => {
                let index = *cursor % size;
                *cursor = (index + 1) % size;
                index
            }
            Self::Random => rand::rng().random_range(0..size),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_round_robin_wraps() {
        let mut policy = SelectionPolicy::round_robin();
        let picks: Vec<usize> = (0..6).map(|_| policy.next(3)).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_round_robin_single_slot() {
        let mut policy = SelectionPolicy::round_robin();
        assert_eq!(policy.next(1), 0);
        assert_eq!(policy.next(1), 0);
    }

    #[test]
    fn test_random_covers_all_indices() {
        // Statistical coverage test, not an exact sequence.
        let mut policy = SelectionPolicy::random();
        let size = 4;
        let mut counts = vec![0usize; size];

        for _ in 0..4000 {
            let index = policy.next(size);
            assert!(index < size);
            counts[index] += 1;
        }

        for (index, count) in counts.iter().enumerate() {
            assert!(
                *count > 500,
                "slot {index} drawn only {count} times out of 4000"
            );
        }
    }

    proptest! {
        #[test]
        fn prop_round_robin_stays_in_bounds(size in 1usize..64, calls in 1usize..256) {
            let mut policy = SelectionPolicy::round_robin();
            for _ in 0..calls {
                prop_assert!(policy.next(size) < size);
            }
        }

        #[test]
        fn prop_round_robin_consecutive(size in 1usize..64) {
            let mut policy = SelectionPolicy::round_robin();
            let first = policy.next(size);
            let second = policy.next(size);
            prop_assert_eq!(second, (first + 1) % size);
        }
    }
}
