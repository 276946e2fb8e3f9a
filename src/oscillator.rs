//! Monotonic local time source with a settable additive offset.
//!
//! `time()` is `Instant`-based, so system-clock steps cannot move it
//! backward; only `set_offset` moves the reported value, and that is the
//! timekeeping unit's job. The offset is stored as the bit pattern of an
//! f64 in an `AtomicU64`: a reader sees either the old or the new offset,
//! never a torn value.

use crate::types::{GPS_EPOCH_UNIX_SECS, now_wall};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub struct Oscillator {
    start: Instant,
    offset_bits: AtomicU64,
}

impl Oscillator {
    /// Boot the oscillator on the GPS timescale from the system wall clock.
    /// The first discipline tick replaces this seed with a real fix.
    pub fn new() -> Self {
        Self::with_offset(now_wall() - GPS_EPOCH_UNIX_SECS)
    }

    pub fn with_offset(offset: f64) -> Self {
        Self {
            start: Instant::now(),
            offset_bits: AtomicU64::new(offset.to_bits()),
        }
    }

    /// Seconds since the GPS epoch, per this node's disciplined clock.
    pub fn time(&self) -> f64 {
        self.start.elapsed().as_secs_f64() + self.offset()
    }

    pub fn offset(&self) -> f64 {
        f64::from_bits(self.offset_bits.load(Ordering::Acquire))
    }

    pub fn set_offset(&self, offset: f64) {
        self.offset_bits.store(offset.to_bits(), Ordering::Release);
    }
}

impl Default for Oscillator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_advances_monotonically() {
        let osc = Oscillator::with_offset(100.0);
        let a = osc.time();
        let b = osc.time();
        assert!(b >= a);
    }

    #[test]
    fn set_offset_shifts_time() {
        let osc = Oscillator::with_offset(0.0);
        let before = osc.time();
        osc.set_offset(50.0);
        let after = osc.time();
        assert!(after - before >= 49.0);
    }

    #[test]
    fn set_offset_is_idempotent() {
        let osc = Oscillator::with_offset(0.0);
        osc.set_offset(-3.25);
        osc.set_offset(-3.25);
        assert_eq!(osc.offset(), -3.25);
    }

    #[test]
    fn negative_offsets_are_honored() {
        let osc = Oscillator::with_offset(-10.0);
        assert!(osc.time() < 0.0);
    }
}
