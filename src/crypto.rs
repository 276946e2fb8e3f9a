//! Node identity, signing, hashing, and message MACs.
//!
//! The secure element holds the node's opaque identity and its Ed25519
//! signing key. The private half is write-once: generated at construction
//! and never exposed. HMAC-SHA256 covers symmetric message authentication
//! with the mesh-wide shared key.

use crate::types::{Hash, NodeId};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use sha3::{Digest, Sha3_256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const PUBKEY_SIZE: usize = 32;
pub const SIGNATURE_SIZE: usize = 64;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid key length: {0} bytes")]
    InvalidKeyLength(usize),
}

/// Stable node identity plus asymmetric signing.
///
/// Signatures are deterministic for a given (key, message) per the Ed25519
/// contract, which is what makes proof chains re-verifiable byte for byte.
pub struct SecureElement {
    node_id: NodeId,
    signing: SigningKey,
    verifying: VerifyingKey,
}

impl SecureElement {
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        let signing = SigningKey::generate(&mut csprng);
        let verifying = signing.verifying_key();

        let mut id = [0u8; 32];
        csprng.fill_bytes(&mut id);

        Self {
            node_id: hex::encode(id),
            signing,
            verifying,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn public_key(&self) -> [u8; PUBKEY_SIZE] {
        self.verifying.to_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing.sign(message).to_bytes()
    }
}

/// Verify an Ed25519 signature under an arbitrary public key.
pub fn verify(pubkey: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let pk_bytes: [u8; PUBKEY_SIZE] = pubkey
        .try_into()
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let pk = VerifyingKey::from_bytes(&pk_bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
    let sig_bytes: [u8; SIGNATURE_SIZE] = signature
        .try_into()
        .map_err(|_| CryptoError::InvalidSignature)?;
    let sig = Signature::from_bytes(&sig_bytes);
    pk.verify(message, &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}

pub fn sha3(data: &[u8]) -> Hash {
    Sha3_256::digest(data).into()
}

/// HMAC-SHA256 tag over a canonical message.
pub fn hmac_tag(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(message);
    mac.finalize().into_bytes().into()
}

/// Constant-time HMAC-SHA256 verification.
pub fn hmac_verify(key: &[u8], message: &[u8], tag: &[u8]) -> bool {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(message);
    mac.verify_slice(tag).is_ok()
}

/// Fresh 256-bit nonce from OS randomness.
pub fn random_nonce() -> [u8; 32] {
    let mut nonce = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}
