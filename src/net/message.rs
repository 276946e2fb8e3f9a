//! Wire messages and canonical encoding.
//!
//! A datagram is the canonical JSON text of a signed envelope:
//!
//! ```text
//! { "type", "sender", "hlc": [pt, lc, id], "payload", "nonce", "wall_ts", "signature" }
//! ```
//!
//! Canonical means: struct fields in this fixed order, payload object keys
//! sorted (serde_json's default map is ordered), shortest round-trip number
//! encoding, no whitespace. The signature is hex HMAC-SHA256 over the
//! canonical text with the signature field absent, so both ends can
//! recompute it byte for byte.
//!
//! The `nonce` plus `wall_ts` form the sender-scoped message id the replay
//! cache keys on.

use crate::crypto::{hmac_tag, hmac_verify};
use crate::hlc::HlcTimestamp;
use crate::types::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("non-finite timestamp")]
    NonFinite,
    #[error("bad payload for {0}")]
    BadPayload(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Join,
    TimeRequest,
    TimeResponse,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Join => "join",
            MessageKind::TimeRequest => "time_request",
            MessageKind::TimeResponse => "time_response",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRequestPayload {
    pub t1: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeResponsePayload {
    pub t1: f64,
    pub t2: f64,
    pub t3: f64,
    pub physical_clock: f64,
    pub logical_clock: u64,
    pub hlc: HlcTimestamp,
}

/// Sender-scoped replay key. `wall_ts` is kept as raw bits so the id is
/// hashable without losing the exact wire value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId {
    pub sender: NodeId,
    pub nonce: u64,
    pub wall_ts_bits: u64,
}

/// The envelope. Field declaration order IS the canonical wire order;
/// `signature` is skipped while unsigned so the canonical form falls out
/// of plain serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub sender: NodeId,
    pub hlc: HlcTimestamp,
    pub payload: Value,
    pub nonce: u64,
    pub wall_ts: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Message {
    pub fn new(kind: MessageKind, sender: NodeId, hlc: HlcTimestamp, payload: Value, wall_ts: f64) -> Self {
        Self {
            kind,
            sender,
            hlc,
            payload,
            nonce: rand::random(),
            wall_ts,
            signature: None,
        }
    }

    pub fn join(sender: NodeId, hlc: HlcTimestamp, wall_ts: f64) -> Self {
        Self::new(MessageKind::Join, sender, hlc, serde_json::json!({}), wall_ts)
    }

    pub fn time_request(sender: NodeId, hlc: HlcTimestamp, wall_ts: f64, t1: f64) -> Self {
        let payload = serde_json::json!({ "t1": t1 });
        Self::new(MessageKind::TimeRequest, sender, hlc, payload, wall_ts)
    }

    pub fn time_response(
        sender: NodeId,
        hlc: HlcTimestamp,
        wall_ts: f64,
        payload: &TimeResponsePayload,
    ) -> Result<Self, WireError> {
        let payload = serde_json::to_value(payload)?;
        Ok(Self::new(MessageKind::TimeResponse, sender, hlc, payload, wall_ts))
    }

    /// Canonical text with the signature field absent: the MAC input.
    pub fn canonical_unsigned(&self) -> Result<String, WireError> {
        let mut unsigned = self.clone();
        unsigned.signature = None;
        Ok(serde_json::to_string(&unsigned)?)
    }

    /// Attach the HMAC tag and return the wire bytes.
    pub fn sign(&mut self, key: &[u8]) -> Result<Vec<u8>, WireError> {
        let canonical = self.canonical_unsigned()?;
        self.signature = Some(hex::encode(hmac_tag(key, canonical.as_bytes())));
        Ok(serde_json::to_string(self)?.into_bytes())
    }

    /// Recompute the MAC and compare in constant time.
    pub fn verify(&self, key: &[u8]) -> bool {
        let Some(sig_hex) = &self.signature else {
            return false;
        };
        let Ok(tag) = hex::decode(sig_hex) else {
            return false;
        };
        let Ok(canonical) = self.canonical_unsigned() else {
            return false;
        };
        hmac_verify(key, canonical.as_bytes(), &tag)
    }

    /// Parse a datagram and reject non-finite timestamps up front.
    pub fn decode(raw: &[u8]) -> Result<Self, WireError> {
        let msg: Message = serde_json::from_slice(raw)?;
        if !msg.wall_ts.is_finite() || !msg.hlc.pt.is_finite() {
            return Err(WireError::NonFinite);
        }
        Ok(msg)
    }

    pub fn id(&self) -> MessageId {
        MessageId {
            sender: self.sender.clone(),
            nonce: self.nonce,
            wall_ts_bits: self.wall_ts.to_bits(),
        }
    }

    pub fn time_request_payload(&self) -> Result<TimeRequestPayload, WireError> {
        let p: TimeRequestPayload = serde_json::from_value(self.payload.clone())
            .map_err(|_| WireError::BadPayload("time_request"))?;
        if !p.t1.is_finite() {
            return Err(WireError::NonFinite);
        }
        Ok(p)
    }

    pub fn time_response_payload(&self) -> Result<TimeResponsePayload, WireError> {
        let p: TimeResponsePayload = serde_json::from_value(self.payload.clone())
            .map_err(|_| WireError::BadPayload("time_response"))?;
        let finite = p.t1.is_finite()
            && p.t2.is_finite()
            && p.t3.is_finite()
            && p.physical_clock.is_finite()
            && p.hlc.pt.is_finite();
        if !finite {
            return Err(WireError::NonFinite);
        }
        Ok(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hlc() -> HlcTimestamp {
        HlcTimestamp::new(100.5, 2, "node-a".into())
    }

    #[test]
    fn canonical_field_order_is_stable() {
        let msg = Message::time_request("node-a".into(), hlc(), 42.0, 100.25);
        let canonical = msg.canonical_unsigned().unwrap();
        let type_pos = canonical.find("\"type\"").unwrap();
        let sender_pos = canonical.find("\"sender\"").unwrap();
        let wall_pos = canonical.find("\"wall_ts\"").unwrap();
        assert!(type_pos < sender_pos && sender_pos < wall_pos);
        assert!(!canonical.contains("signature"));
    }

    #[test]
    fn sign_then_verify_round_trip() {
        let key = [9u8; 32];
        let mut msg = Message::time_request("node-a".into(), hlc(), 42.0, 100.25);
        let wire = msg.sign(&key).unwrap();

        let decoded = Message::decode(&wire).unwrap();
        assert!(decoded.verify(&key));
        assert_eq!(decoded.time_request_payload().unwrap().t1, 100.25);
    }

    #[test]
    fn tampering_breaks_the_mac() {
        let key = [9u8; 32];
        let mut msg = Message::time_request("node-a".into(), hlc(), 42.0, 100.25);
        let wire = msg.sign(&key).unwrap();

        let tampered = String::from_utf8(wire).unwrap().replace("100.25", "999.9");
        let decoded = Message::decode(tampered.as_bytes()).unwrap();
        assert!(!decoded.verify(&key));
    }

    #[test]
    fn non_finite_timestamps_are_rejected() {
        // serde_json rounds an overflowing literal to f64 infinity, which
        // deserializes fine and must be caught by the finite guard.
        let raw = br#"{"type":"join","sender":"a","hlc":[1.0,0,"a"],"payload":{},"nonce":1,"wall_ts":1e400}"#;
        match Message::decode(raw) {
            Err(WireError::NonFinite) => {}
            other => panic!("expected NonFinite, got {other:?}"),
        }

        let raw = br#"{"type":"join","sender":"a","hlc":[1e400,0,"a"],"payload":{},"nonce":1,"wall_ts":1.0}"#;
        match Message::decode(raw) {
            Err(WireError::NonFinite) => {}
            other => panic!("expected NonFinite, got {other:?}"),
        }
    }
}
