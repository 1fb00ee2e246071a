// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Time source for decay bookkeeping.
//!
//! Decaying dictionaries stamp every observed word with the current time, so
//! anything touching the forgetting curve takes a `&dyn Clock` instead of
//! calling the OS directly. Tests inject `FixedClock` and get byte-identical
//! dictionaries on every run.

use std::cell::Cell;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds-resolution time source.
///
/// Timestamps are stored in 32-bit header attributes and probability entries,
/// so the trait works in `u32` seconds since the Unix epoch.
pub trait Clock {
    fn now(&self) -> u32;
}

/// Wall-clock time. The production implementation.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u32 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0)
    }
}

/// Settable time source for deterministic tests.
#[derive(Debug)]
pub struct FixedClock {
    seconds: Cell<u32>,
}

impl FixedClock {
    pub fn new(seconds: u32) -> Self {
        Self {
            seconds: Cell::new(seconds),
        }
    }

    /// Move the clock forward. Panics on overflow; tests stay well below that.
    pub fn advance(&self, seconds: u32) {
        self.seconds.set(self.seconds.get() + seconds);
    }

    pub fn set(&self, seconds: u32) {
        self.seconds.set(seconds);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> u32 {
        self.seconds.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::new(1_000);
        assert_eq!(clock.now(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now(), 1_500);
        clock.set(42);
        assert_eq!(clock.now(), 42);
    }

    #[test]
    fn system_clock_is_past_2020() {
        // 2020-01-01 in Unix seconds; a sanity floor, not a real assertion
        // about wall time.
        assert!(SystemClock.now() > 1_577_836_800);
    }
}
