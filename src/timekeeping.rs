//! Disciplines the oscillator to the GPS reference.
//!
//! Every `SYNC_INTERVAL` the unit acquires a fix, converts it to seconds
//! since the GPS epoch, and corrects the oscillator by the measured
//! difference. A failed acquisition skips the tick; the oscillator keeps
//! free-running on its previous offset.

use crate::gps::{GpsData, GpsError, GpsSource};
use crate::oscillator::Oscillator;
use crate::types::CONSENSUS_TOLERANCE_SECS;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

pub struct TimekeepingUnit {
    gps: Arc<dyn GpsSource>,
    oscillator: Arc<Oscillator>,
    last_sync: Mutex<Option<f64>>,
}

impl TimekeepingUnit {
    pub fn new(gps: Arc<dyn GpsSource>, oscillator: Arc<Oscillator>) -> Self {
        Self {
            gps,
            oscillator,
            last_sync: Mutex::new(None),
        }
    }

    /// One discipline tick. Returns the fix so the caller can reuse it.
    ///
    /// The correction is cumulative, `offset += gps_time - local_time`,
    /// so `time()` lands exactly on the fix and a second tick with zero
    /// drift leaves the offset unchanged.
    pub fn synchronize(&self) -> Result<GpsData, GpsError> {
        let fix = match self.gps.acquire() {
            Ok(fix) => fix,
            Err(e) => {
                warn!("gps acquisition failed, keeping previous offset: {}", e);
                return Err(e);
            }
        };

        let gps_time = fix.time();
        let local_time = self.oscillator.time();
        let correction = gps_time - local_time;
        self.oscillator
            .set_offset(self.oscillator.offset() + correction);

        *self.last_sync.lock().expect("timekeeping state poisoned") = Some(gps_time);
        debug!(
            "disciplined oscillator: correction={:+.6}s week={} tow={:.3}",
            correction, fix.gps_week, fix.gps_seconds
        );
        Ok(fix)
    }

    pub fn current_time(&self) -> f64 {
        self.oscillator.time()
    }

    pub fn oscillator_offset(&self) -> f64 {
        self.oscillator.offset()
    }

    pub fn last_sync(&self) -> Option<f64> {
        *self.last_sync.lock().expect("timekeeping state poisoned")
    }

    /// Whether a claimed timestamp is plausible against a reference time.
    pub fn is_within_acceptable_range(&self, timestamp: f64, reference: f64) -> bool {
        (timestamp - reference).abs() <= CONSENSUS_TOLERANCE_SECS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::SimulatedGps;

    #[test]
    fn synchronize_lands_on_gps_time() {
        let gps = Arc::new(SimulatedGps::new());
        let osc = Arc::new(Oscillator::with_offset(0.0));
        let unit = TimekeepingUnit::new(gps, osc.clone());

        let fix = unit.synchronize().unwrap();
        assert!((osc.time() - fix.time()).abs() < 0.05);

        // A second tick with no drift barely moves the offset.
        let offset_before = osc.offset();
        unit.synchronize().unwrap();
        assert!((osc.offset() - offset_before).abs() < 0.05);
    }

    #[test]
    fn failed_acquisition_keeps_offset() {
        let gps = Arc::new(SimulatedGps::new());
        let osc = Arc::new(Oscillator::with_offset(123.0));
        let unit = TimekeepingUnit::new(gps.clone(), osc.clone());

        gps.set_available(false);
        assert!(unit.synchronize().is_err());
        assert_eq!(osc.offset(), 123.0);
        assert!(unit.last_sync().is_none());
    }
}
