//! Consensus view tests: proof filtering and the median oracle.

use chronomesh::archive::ArchiveClient;
use chronomesh::consensus::{ConsensusView, median_local_time};
use chronomesh::crypto::SecureElement;
use chronomesh::gps::GpsData;
use chronomesh::proof::{TimeProof, ZERO_HASH_HEX};
use std::collections::HashMap;
use std::sync::Arc;

/// Build a properly signed proof with a chosen local_time.
fn signed_proof(se: &SecureElement, local_time: f64, prev_hash: &str) -> TimeProof {
    let mut proof = TimeProof {
        node_id: se.node_id().clone(),
        public_key: hex::encode(se.public_key()),
        gps_data: GpsData::unlocked(),
        local_time,
        oscillator_offset: 0.0,
        prev_hash: prev_hash.to_string(),
        nonce: hex::encode(chronomesh::crypto::random_nonce()),
        signature: None,
    };
    let digest = proof.digest().unwrap();
    proof.signature = Some(hex::encode(se.sign(&digest)));
    proof
}

fn view() -> ConsensusView {
    ConsensusView::new(Arc::new(ArchiveClient::new("http://127.0.0.1:1")))
}

#[test]
fn test_median_odd_count() {
    let se = SecureElement::generate();
    let proofs: Vec<TimeProof> = [10.0, 30.0, 20.0]
        .iter()
        .map(|t| signed_proof(&se, *t, ZERO_HASH_HEX))
        .collect();
    assert_eq!(median_local_time(&proofs), Some(20.0));
}

#[test]
fn test_median_even_count_averages_middles() {
    let se = SecureElement::generate();
    let proofs: Vec<TimeProof> = [10.0, 20.0, 30.0, 40.0]
        .iter()
        .map(|t| signed_proof(&se, *t, ZERO_HASH_HEX))
        .collect();
    assert_eq!(median_local_time(&proofs), Some(25.0));
}

#[test]
fn test_median_empty_is_none() {
    assert_eq!(median_local_time(&[]), None);
}

#[test]
fn test_evaluate_discards_invalid_signatures() {
    let a = SecureElement::generate();
    let b = SecureElement::generate();

    let good_low = signed_proof(&a, 100.0, ZERO_HASH_HEX);
    let good_high = signed_proof(&b, 102.0, ZERO_HASH_HEX);
    let mut tampered = signed_proof(&a, 100.5, "11".repeat(32).as_str());
    tampered.local_time = 9999.0; // breaks the signature

    let consensus = view()
        .evaluate(vec![good_low, tampered, good_high])
        .unwrap();
    assert_eq!(consensus, 101.0);
}

#[test]
fn test_evaluate_discards_equivocating_forks() {
    let a = SecureElement::generate();
    let b = SecureElement::generate();

    // Node A signs two different proofs on the same parent: a fork.
    let fork_1 = signed_proof(&a, 50.0, "22".repeat(32).as_str());
    let fork_2 = signed_proof(&a, 900.0, "22".repeat(32).as_str());
    let honest = signed_proof(&b, 70.0, ZERO_HASH_HEX);

    let consensus = view().evaluate(vec![fork_1, fork_2, honest]).unwrap();
    assert_eq!(consensus, 70.0, "only the honest node's proof survives");
}

#[test]
fn test_pinned_key_mismatch_is_discarded() {
    let real = SecureElement::generate();
    let impostor = SecureElement::generate();

    // The impostor signs validly under its own key but claims real's id.
    let mut forged = signed_proof(&impostor, 500.0, ZERO_HASH_HEX);
    forged.node_id = real.node_id().clone();
    let digest = forged.digest().unwrap();
    forged.signature = Some(hex::encode(impostor.sign(&digest)));

    let honest = signed_proof(&real, 60.0, ZERO_HASH_HEX);

    let mut pinned = HashMap::new();
    pinned.insert(real.node_id().clone(), hex::encode(real.public_key()));
    let view = ConsensusView::with_pinned_keys(
        Arc::new(ArchiveClient::new("http://127.0.0.1:1")),
        pinned,
    );

    assert_eq!(view.evaluate(vec![forged, honest]), Some(60.0));
}

#[test]
fn test_evaluate_with_nothing_valid_is_none() {
    let se = SecureElement::generate();
    let mut bad = signed_proof(&se, 10.0, ZERO_HASH_HEX);
    bad.signature = Some("00".repeat(64));
    assert_eq!(view().evaluate(vec![bad]), None);
}
