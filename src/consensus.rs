//! Fleet consensus time over archived proofs.
//!
//! The view fetches recent proofs from the untrusted sink, keeps only the
//! ones that survive verification, and takes the median of their
//! `local_time` fields. That median is the oracle an external verifier
//! compares a claimed timestamp against.
//!
//! Validation per proof:
//! 1. Signature must verify under the proof's embedded public key.
//! 2. If the operator pinned a key for that node id, the embedded key
//!    must match it.
//! 3. Two proofs from one node sharing a prev_hash are an equivocating
//!    fork; both are discarded. Gaps are not faults (the sink is lossy).

use crate::archive::{ArchiveClient, ArchiveError};
use crate::proof::TimeProof;
use crate::types::{CONSENSUS_TOLERANCE_SECS, NodeId};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("no valid proofs available")]
    NoValidProofs,
}

pub struct ConsensusView {
    archive: Arc<ArchiveClient>,
    /// Operator-pinned node keys (node id → hex public key). Nodes absent
    /// from the registry are accepted on their embedded key alone.
    pinned_keys: HashMap<NodeId, String>,
}

impl ConsensusView {
    pub fn new(archive: Arc<ArchiveClient>) -> Self {
        Self {
            archive,
            pinned_keys: HashMap::new(),
        }
    }

    pub fn with_pinned_keys(archive: Arc<ArchiveClient>, pinned: HashMap<NodeId, String>) -> Self {
        Self {
            archive,
            pinned_keys: pinned,
        }
    }

    /// Fetch, re-verify, and reduce to the fleet consensus time.
    pub async fn consensus_time(&self) -> Result<f64, ConsensusError> {
        let proofs = self.archive.recent_proofs().await?;
        self.evaluate(proofs).ok_or(ConsensusError::NoValidProofs)
    }

    /// Whether a claimed timestamp is plausible against the consensus.
    pub async fn validate_action(&self, timestamp: f64) -> Result<bool, ConsensusError> {
        let consensus = self.consensus_time().await?;
        Ok((timestamp - consensus).abs() <= CONSENSUS_TOLERANCE_SECS)
    }

    /// The pure half: filter invalid proofs and take the median.
    pub fn evaluate(&self, proofs: Vec<TimeProof>) -> Option<f64> {
        let valid = self.filter_valid(proofs);
        median_local_time(&valid)
    }

    fn filter_valid(&self, proofs: Vec<TimeProof>) -> Vec<TimeProof> {
        // Equivocation scan: (node_id, prev_hash) must be unique.
        let mut link_counts: HashMap<(&str, &str), usize> = HashMap::new();
        for proof in &proofs {
            *link_counts
                .entry((proof.node_id.as_str(), proof.prev_hash.as_str()))
                .or_insert(0) += 1;
        }
        let forked: Vec<(String, String)> = link_counts
            .iter()
            .filter(|&(_, &count)| count > 1)
            .map(|((node, prev), _)| (node.to_string(), prev.to_string()))
            .collect();

        proofs
            .into_iter()
            .filter(|proof| {
                if let Err(e) = proof.verify() {
                    debug!("discarding proof from {}: {}", proof.node_id, e);
                    return false;
                }
                if let Some(pinned) = self.pinned_keys.get(&proof.node_id) {
                    if *pinned != proof.public_key {
                        debug!("discarding proof from {}: key mismatch", proof.node_id);
                        return false;
                    }
                }
                let link = (proof.node_id.clone(), proof.prev_hash.clone());
                if forked.contains(&link) {
                    debug!("discarding equivocating proof from {}", proof.node_id);
                    return false;
                }
                true
            })
            .collect()
    }
}

/// Median of the proofs' local times. Even counts average the two middle
/// values.
pub fn median_local_time(proofs: &[TimeProof]) -> Option<f64> {
    if proofs.is_empty() {
        return None;
    }
    let mut times: Vec<f64> = proofs.iter().map(|p| p.local_time).collect();
    times.sort_by(f64::total_cmp);
    let n = times.len();
    let median = if n % 2 == 0 {
        (times[n / 2 - 1] + times[n / 2]) / 2.0
    } else {
        times[n / 2]
    };
    Some(median)
}
