//! Shared types and protocol constants.
//!
//! Every interval below uses the monotonic clock; the wall clock is read
//! only for `wall_ts` stamping and skew/replay windows. Mixing the two is
//! how the timing math breaks, so the split is enforced here by convention
//! and in `Oscillator` by construction.

use std::time::{SystemTime, UNIX_EPOCH};

/// SHA3-256 digest.
pub type Hash = [u8; 32];

/// Opaque node identity: hex encoding of 256 random bits, minted by the
/// secure element at startup. Bit-stable for the process lifetime, used as
/// the HLC tiebreaker and in time proofs.
pub type NodeId = String;

// =============================================================================
// TIMING
// =============================================================================

/// GPS discipline interval: re-sync the oscillator to GPS every 15 minutes.
pub const SYNC_INTERVAL_SECS: u64 = 900;

/// Gossip tick: one time_request to every known peer per second.
pub const GOSSIP_PERIOD_SECS: u64 = 1;

/// Proof generation interval: one signed chain entry per minute.
pub const PROOF_INTERVAL_SECS: u64 = 60;

/// A time_request with no time_response within this window is abandoned.
/// The sample is dropped; peer health is the discovery layer's concern.
pub const RESPONSE_TIMEOUT_SECS: u64 = 1;

/// Periodic tasks must observe shutdown within this bound.
pub const SHUTDOWN_DEADLINE_SECS: u64 = 2;

/// Half-width of the bounded-time interval returned by `get_current_time`.
/// Constant by default; configurable per node without changing semantics.
pub const UNCERTAINTY_WINDOW_SECS: f64 = 0.010;

/// Acceptance tolerance when checking a claimed timestamp against the
/// fleet consensus time.
pub const CONSENSUS_TOLERANCE_SECS: f64 = 0.005;

// =============================================================================
// MESSAGE AUTHENTICATION
// =============================================================================

/// Inbound `wall_ts` must land within ±30 s of our wall clock.
pub const SKEW_MAX_SECS: f64 = 30.0;

/// Replay cache sliding window. Twice the skew bound: any message old
/// enough to have left the window is already rejected by the skew check.
pub const REPLAY_WINDOW_SECS: f64 = 60.0;

/// Replay cache count bound. Oldest entries are dropped first once full.
pub const REPLAY_CACHE_MAX: usize = 4096;

/// Minimum shared-key length. HMAC-SHA256 keys shorter than the digest
/// weaken the MAC for no benefit.
pub const SHARED_KEY_MIN_BYTES: usize = 32;

// =============================================================================
// WIRE LIMITS
// =============================================================================

/// Maximum UDP datagram size. Everything the protocol sends fits a single
/// non-fragmented Ethernet frame; larger inbound datagrams are malformed.
pub const MAX_DATAGRAM_SIZE: usize = 1500;

// =============================================================================
// FUSION
// =============================================================================

/// Default fault tolerance F. The sample window holds 2F + 1 entries and
/// the sorted median defeats up to F adversarial samples.
pub const DEFAULT_FAULT_TOLERANCE: usize = 1;

/// Weight of the local clock in the fusion blend:
/// `new = 0.8·local + 0.2·median`. The GPS-disciplined oscillator is the
/// trusted baseline; peer samples are the cross-check against spoofing.
pub const FUSION_LOCAL_WEIGHT: f64 = 0.8;

/// EMA smoothing factor for per-peer one-way latency estimates.
pub const LATENCY_EMA_ALPHA: f64 = 0.5;

// =============================================================================
// GPS TIMESCALE
// =============================================================================

/// Seconds per GPS week.
pub const SECONDS_PER_WEEK: f64 = 604_800.0;

/// GPS epoch (1980-01-06T00:00:00Z) expressed in Unix seconds. The
/// disciplined timescale everywhere in this crate is seconds since the GPS
/// epoch; only `wall_ts` stays on the Unix wall clock.
pub const GPS_EPOCH_UNIX_SECS: f64 = 315_964_800.0;

/// Current Unix wall-clock time in f64 seconds.
///
/// Wall reads are for `wall_ts` and skew windows only. Intervals and the
/// physical clock come from the oscillator's monotonic base.
pub fn now_wall() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
