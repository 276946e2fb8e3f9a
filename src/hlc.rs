//! Hybrid Logical Clock.
//!
//! Each timestamp is `(pt, lc, id)`: physical seconds, a logical counter
//! that resets whenever `pt` strictly advances, and the owning node id as
//! the final tiebreaker. Ordering is lexicographic, so two properties fall
//! out of the update rules:
//!
//! - successive reads from one clock are strictly increasing, and
//! - merging a remote timestamp yields a value strictly greater than both
//!   the prior local clock and the remote one (Lamport happens-before).
//!
//! `pt` never regresses, even when the physical clock is stepped backward
//! underneath the HLC.

use crate::types::NodeId;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use std::cmp::Ordering;

/// An HLC reading. Serializes as the wire triple `[pt, lc, id]`.
#[derive(Debug, Clone)]
pub struct HlcTimestamp {
    pub pt: f64,
    pub lc: u64,
    pub id: NodeId,
}

impl HlcTimestamp {
    pub fn new(pt: f64, lc: u64, id: NodeId) -> Self {
        Self { pt, lc, id }
    }
}

impl PartialEq for HlcTimestamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HlcTimestamp {}

impl PartialOrd for HlcTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HlcTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.pt
            .total_cmp(&other.pt)
            .then_with(|| self.lc.cmp(&other.lc))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl Serialize for HlcTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.pt, self.lc, &self.id).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HlcTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (pt, lc, id) = <(f64, u64, NodeId)>::deserialize(deserializer)?;
        Ok(Self { pt, lc, id })
    }
}

impl std::fmt::Display for HlcTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}:{}:{}", self.pt, self.lc, &self.id[..self.id.len().min(8)])
    }
}

/// The clock itself. Callers pass in the current physical reading; the
/// sync engine's lock covers the mutation, so there is no mutex here.
#[derive(Debug, Clone)]
pub struct HlcClock {
    current: HlcTimestamp,
}

impl HlcClock {
    pub fn new(id: NodeId, now_pt: f64) -> Self {
        Self {
            current: HlcTimestamp::new(now_pt, 0, id),
        }
    }

    /// Read without advancing.
    pub fn current(&self) -> &HlcTimestamp {
        &self.current
    }

    /// Advance for a local event and return the new reading.
    ///
    /// `pt` takes the physical reading when it strictly advanced; otherwise
    /// the counter increments, so the result is strictly greater than every
    /// previous reading even under a frozen or stepped-back physical clock.
    pub fn tick(&mut self, now_pt: f64) -> HlcTimestamp {
        if now_pt > self.current.pt {
            self.current.pt = now_pt;
            self.current.lc = 0;
        } else {
            self.current.lc += 1;
        }
        self.current.clone()
    }

    /// Fold in a remote timestamp on message receipt.
    pub fn merge(&mut self, now_pt: f64, remote: &HlcTimestamp) -> HlcTimestamp {
        let (mp, ml) = (self.current.pt, self.current.lc);
        let (rp, rl) = (remote.pt, remote.lc);

        if now_pt > mp && now_pt > rp {
            self.current.pt = now_pt;
            self.current.lc = 0;
        } else if mp == rp {
            self.current.lc = ml.max(rl) + 1;
        } else if mp > rp {
            self.current.lc = ml + 1;
        } else {
            self.current.pt = rp;
            self.current.lc = rl + 1;
        }
        self.current.clone()
    }
}
