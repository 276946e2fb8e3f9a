//! Wire format tests: canonical encoding, MAC coverage, round trips.

use chronomesh::hlc::HlcTimestamp;
use chronomesh::net::{Message, MessageKind, TimeResponsePayload};
use chronomesh::proof::TimeProof;
use chronomesh::gps::GpsData;

const KEY: [u8; 32] = [0x42; 32];

fn hlc(id: &str) -> HlcTimestamp {
    HlcTimestamp::new(1234.5678, 3, id.to_string())
}

fn decode_round_trip(msg: &mut Message) -> Message {
    let wire = msg.sign(&KEY).unwrap();
    assert!(wire.len() <= 1500, "datagram too large: {}", wire.len());
    let decoded = Message::decode(&wire).unwrap();
    assert!(decoded.verify(&KEY));
    decoded
}

#[test]
fn test_join_round_trip() {
    let mut msg = Message::join("node-a".into(), hlc("node-a"), 1000.0);
    let decoded = decode_round_trip(&mut msg);
    assert_eq!(decoded.kind, MessageKind::Join);
    assert_eq!(decoded.sender, "node-a");
    assert_eq!(decoded.nonce, msg.nonce);
    assert_eq!(decoded.wall_ts, 1000.0);
}

#[test]
fn test_time_request_round_trip() {
    let mut msg = Message::time_request("node-a".into(), hlc("node-a"), 1000.0, 55.125);
    let decoded = decode_round_trip(&mut msg);
    assert_eq!(decoded.kind, MessageKind::TimeRequest);
    assert_eq!(decoded.time_request_payload().unwrap().t1, 55.125);
}

#[test]
fn test_time_response_round_trip() {
    let payload = TimeResponsePayload {
        t1: 1.25,
        t2: 2.5,
        t3: 2.75,
        physical_clock: 99.875,
        logical_clock: 17,
        hlc: hlc("node-b"),
    };
    let mut msg =
        Message::time_response("node-b".into(), hlc("node-b"), 1000.0, &payload).unwrap();
    let decoded = decode_round_trip(&mut msg);

    let p = decoded.time_response_payload().unwrap();
    assert_eq!(p.t1, 1.25);
    assert_eq!(p.t2, 2.5);
    assert_eq!(p.t3, 2.75);
    assert_eq!(p.physical_clock, 99.875);
    assert_eq!(p.logical_clock, 17);
    assert_eq!(p.hlc, hlc("node-b"));
}

#[test]
fn test_canonical_reserialization_is_stable() {
    // The MAC depends on this: decode then re-canonicalize must produce
    // the exact bytes the sender MAC'd.
    let mut msg = Message::time_request("node-a".into(), hlc("node-a"), 1000.125, 0.1);
    let canonical_sent = msg.canonical_unsigned().unwrap();
    let wire = msg.sign(&KEY).unwrap();

    let decoded = Message::decode(&wire).unwrap();
    assert_eq!(decoded.canonical_unsigned().unwrap(), canonical_sent);
}

#[test]
fn test_signature_field_order_on_wire() {
    let mut msg = Message::join("a".into(), hlc("a"), 5.0);
    let wire = String::from_utf8(msg.sign(&KEY).unwrap()).unwrap();
    // Fixed field order, signature last.
    let positions: Vec<usize> = ["\"type\"", "\"sender\"", "\"hlc\"", "\"payload\"", "\"nonce\"", "\"wall_ts\"", "\"signature\""]
        .iter()
        .map(|k| wire.find(k).unwrap_or_else(|| panic!("{k} missing")))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_unsigned_message_never_verifies() {
    let msg = Message::join("a".into(), hlc("a"), 5.0);
    assert!(!msg.verify(&KEY));
}

#[test]
fn test_time_proof_round_trip() {
    let proof = TimeProof {
        node_id: "ab".repeat(32),
        public_key: "cd".repeat(32),
        gps_data: GpsData {
            gps_week: 2375,
            gps_seconds: 123456.789,
            satellite_prns: vec![4, 9, 17, 28],
            signal_strengths: vec![41.5, 38.25, 44.0, 30.5],
        },
        local_time: 1_436_123_456.789,
        oscillator_offset: -0.125,
        prev_hash: "00".repeat(32),
        nonce: "ef".repeat(32),
        signature: Some("11".repeat(64)),
    };

    let encoded = serde_json::to_string(&proof).unwrap();
    let decoded: TimeProof = serde_json::from_str(&encoded).unwrap();
    assert_eq!(proof, decoded);
    assert_eq!(serde_json::to_string(&decoded).unwrap(), encoded);
}
