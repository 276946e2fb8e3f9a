//! Hash-linked, signed time proofs.
//!
//! Every minute the generator captures what this node believes about time
//! (GPS fix, disciplined local time, oscillator offset), links it to the
//! previous proof by SHA3-256 digest, and signs it with the secure
//! element. The chain gives an external verifier a per-node, append-only,
//! tamper-evident history: `proof[k].prev_hash == H(proof[k−1])`, genesis
//! links to all zeros.

use crate::crypto::{self, SecureElement};
use crate::gps::{GpsData, GpsSource};
use crate::timekeeping::TimekeepingUnit;
use crate::types::Hash;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ProofError {
    #[error("proof encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("proof carries no signature")]
    Unsigned,
    #[error("malformed field: {0}")]
    MalformedField(&'static str),
    #[error("signature verification failed")]
    BadSignature,
    #[error("chain link broken at index {0}")]
    BrokenLink(usize),
}

/// One chain entry. Field declaration order is the canonical wire order;
/// the signature covers the SHA3-256 digest of the canonical text with the
/// signature field absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeProof {
    pub node_id: String,
    pub public_key: String,
    pub gps_data: GpsData,
    pub local_time: f64,
    pub oscillator_offset: f64,
    pub prev_hash: String,
    pub nonce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl TimeProof {
    fn canonical_unsigned(&self) -> Result<String, ProofError> {
        let mut unsigned = self.clone();
        unsigned.signature = None;
        Ok(serde_json::to_string(&unsigned)?)
    }

    fn canonical_signed(&self) -> Result<String, ProofError> {
        if self.signature.is_none() {
            return Err(ProofError::Unsigned);
        }
        Ok(serde_json::to_string(self)?)
    }

    /// The digest the secure element signs.
    pub fn digest(&self) -> Result<Hash, ProofError> {
        Ok(crypto::sha3(self.canonical_unsigned()?.as_bytes()))
    }

    /// The digest the next proof links to.
    pub fn chain_hash(&self) -> Result<Hash, ProofError> {
        Ok(crypto::sha3(self.canonical_signed()?.as_bytes()))
    }

    /// Check the signature under the embedded public key.
    pub fn verify(&self) -> Result<(), ProofError> {
        let sig_hex = self.signature.as_ref().ok_or(ProofError::Unsigned)?;
        let sig = hex::decode(sig_hex).map_err(|_| ProofError::MalformedField("signature"))?;
        let pubkey =
            hex::decode(&self.public_key).map_err(|_| ProofError::MalformedField("public_key"))?;
        let digest = self.digest()?;
        crypto::verify(&pubkey, &digest, &sig).map_err(|_| ProofError::BadSignature)
    }
}

/// Walk a single node's chain: every signature valid, every link intact.
pub fn verify_chain(proofs: &[TimeProof]) -> Result<(), ProofError> {
    let mut prev: Option<Hash> = None;
    for (i, proof) in proofs.iter().enumerate() {
        proof.verify()?;
        let expected = match prev {
            Some(hash) => hex::encode(hash),
            None => ZERO_HASH_HEX.to_string(),
        };
        if proof.prev_hash != expected {
            return Err(ProofError::BrokenLink(i));
        }
        prev = Some(proof.chain_hash()?);
    }
    Ok(())
}

/// Genesis prev_hash: 32 zero bytes.
pub const ZERO_HASH_HEX: &str = "0000000000000000000000000000000000000000000000000000000000000000";

pub struct ProofGenerator {
    timekeeping: Arc<TimekeepingUnit>,
    gps: Arc<dyn GpsSource>,
    secure: Arc<SecureElement>,
    chain: Mutex<ChainState>,
}

struct ChainState {
    last_hash: Option<Hash>,
    last_fix: GpsData,
}

impl ProofGenerator {
    pub fn new(
        timekeeping: Arc<TimekeepingUnit>,
        gps: Arc<dyn GpsSource>,
        secure: Arc<SecureElement>,
    ) -> Self {
        Self {
            timekeeping,
            gps,
            secure,
            chain: Mutex::new(ChainState {
                last_hash: None,
                last_fix: GpsData::unlocked(),
            }),
        }
    }

    /// Produce, sign, and link the next proof.
    ///
    /// A GPS outage must not stall the chain: on acquisition failure the
    /// proof carries the last successful fix.
    pub fn generate(&self) -> Result<TimeProof, ProofError> {
        let mut chain = self.chain.lock().expect("proof chain state poisoned");

        let gps_data = match self.gps.acquire() {
            Ok(fix) => {
                chain.last_fix = fix.clone();
                fix
            }
            Err(_) => {
                debug!("gps unavailable, proof reuses last fix");
                chain.last_fix.clone()
            }
        };

        let prev_hash = match chain.last_hash {
            Some(hash) => hex::encode(hash),
            None => ZERO_HASH_HEX.to_string(),
        };

        let mut proof = TimeProof {
            node_id: self.secure.node_id().clone(),
            public_key: hex::encode(self.secure.public_key()),
            gps_data,
            local_time: self.timekeeping.current_time(),
            oscillator_offset: self.timekeeping.oscillator_offset(),
            prev_hash,
            nonce: hex::encode(crypto::random_nonce()),
            signature: None,
        };

        let digest = proof.digest()?;
        proof.signature = Some(hex::encode(self.secure.sign(&digest)));
        chain.last_hash = Some(proof.chain_hash()?);

        Ok(proof)
    }
}
