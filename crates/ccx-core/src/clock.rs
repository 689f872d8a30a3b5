// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lamport logical clock for happens-before tracking.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Monotonic logical counter.
///
/// Each [`tick`](LamportClock::tick) increments the local counter and returns
/// the new value. [`receive`](LamportClock::receive) merges a remote
/// timestamp using `max(local, remote) + 1`, keeping the counter monotonic
/// across merge points.
///
/// # Examples
///
/// ```
/// use ccx_core::LamportClock;
///
/// let mut clock = LamportClock::new();
/// assert_eq!(clock.tick(), 1);
/// assert_eq!(clock.tick(), 2);
/// assert_eq!(clock.receive(10), 11);
/// assert_eq!(clock.current(), 11);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LamportClock {
    counter: u64,
}

impl LamportClock {
    /// Create a clock at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the clock and return the new timestamp.
    pub fn tick(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    /// Merge a remote timestamp and return the new local timestamp.
    pub fn receive(&mut self, remote_ts: u64) -> u64 {
        self.counter = self.counter.max(remote_ts) + 1;
        self.counter
    }

    /// Return the current timestamp without incrementing.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.counter
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn tick_is_sequential() {
        let mut clock = LamportClock::new();
        assert_eq!(clock.tick(), 1);
        assert_eq!(clock.tick(), 2);
        assert_eq!(clock.tick(), 3);
    }

    #[test]
    fn receive_merges_remote() {
        let mut clock = LamportClock::new();
        clock.tick();
        assert_eq!(clock.receive(7), 8);
        // Remote behind local: still advances.
        assert_eq!(clock.receive(2), 9);
    }

    #[test]
    fn current_does_not_advance() {
        let mut clock = LamportClock::new();
        clock.tick();
        assert_eq!(clock.current(), 1);
        assert_eq!(clock.current(), 1);
    }

    #[test]
    fn serde_roundtrip() {
        let mut clock = LamportClock::new();
        clock.tick();
        clock.receive(41);
        let json = serde_json::to_string(&clock).unwrap();
        let back: LamportClock = serde_json::from_str(&json).unwrap();
        assert_eq!(back, clock);
    }

    proptest! {
        /// Every tick or receive strictly increases the counter.
        #[test]
        fn monotonic_under_any_interleaving(ops in proptest::collection::vec(0u64..1_000, 1..64)) {
            let mut clock = LamportClock::new();
            let mut last = clock.current();
            for (i, remote) in ops.iter().enumerate() {
                let next = if i % 2 == 0 { clock.tick() } else { clock.receive(*remote) };
                prop_assert!(next > last);
                last = next;
            }
        }
    }
}
