//! GPS collaborator boundary.
//!
//! The node only needs week number and seconds-of-week from whatever
//! hardware sits behind this trait. The bundled source simulates a
//! receiver from the system wall clock; a real deployment implements
//! `GpsSource` against serial NMEA or a timing card.

use crate::types::{GPS_EPOCH_UNIX_SECS, SECONDS_PER_WEEK, now_wall};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GpsError {
    #[error("gps source unavailable")]
    Unavailable,
}

/// One fix from the receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsData {
    pub gps_week: u32,
    pub gps_seconds: f64,
    pub satellite_prns: Vec<u8>,
    pub signal_strengths: Vec<f64>,
}

impl GpsData {
    /// Seconds since the GPS epoch.
    pub fn time(&self) -> f64 {
        self.gps_week as f64 * SECONDS_PER_WEEK + self.gps_seconds
    }

    /// Zero fix, used before the first acquisition succeeds.
    pub fn unlocked() -> Self {
        Self {
            gps_week: 0,
            gps_seconds: 0.0,
            satellite_prns: Vec::new(),
            signal_strengths: Vec::new(),
        }
    }
}

pub trait GpsSource: Send + Sync {
    fn acquire(&self) -> Result<GpsData, GpsError>;
}

/// Wall-clock-backed receiver stand-in.
///
/// Week and seconds-of-week are derived from the host clock against the
/// GPS epoch; satellite metadata is fabricated in realistic ranges. The
/// availability switch drives outage scenarios in tests.
pub struct SimulatedGps {
    available: AtomicBool,
}

impl SimulatedGps {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }
}

impl Default for SimulatedGps {
    fn default() -> Self {
        Self::new()
    }
}

impl GpsSource for SimulatedGps {
    fn acquire(&self) -> Result<GpsData, GpsError> {
        if !self.available.load(Ordering::Acquire) {
            return Err(GpsError::Unavailable);
        }

        let since_epoch = (now_wall() - GPS_EPOCH_UNIX_SECS).max(0.0);
        let gps_week = (since_epoch / SECONDS_PER_WEEK) as u32;
        let gps_seconds = since_epoch - gps_week as f64 * SECONDS_PER_WEEK;

        let mut rng = rand::thread_rng();
        let satellite_prns = (0..4).map(|_| rng.gen_range(1..=32)).collect();
        let signal_strengths = (0..4).map(|_| rng.gen_range(30.0..50.0)).collect();

        Ok(GpsData {
            gps_week,
            gps_seconds,
            satellite_prns,
            signal_strengths,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_fix_tracks_wall_clock() {
        let gps = SimulatedGps::new();
        let fix = gps.acquire().unwrap();
        let expected = now_wall() - GPS_EPOCH_UNIX_SECS;
        assert!((fix.time() - expected).abs() < 1.0);
        assert_eq!(fix.satellite_prns.len(), 4);
    }

    #[test]
    fn outage_switch_fails_acquisition() {
        let gps = SimulatedGps::new();
        gps.set_available(false);
        assert!(gps.acquire().is_err());
        gps.set_available(true);
        assert!(gps.acquire().is_ok());
    }
}
