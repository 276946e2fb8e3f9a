//! Unit tests for the hybrid logical clock
//!
//! The property that matters: every reading a clock produces is strictly
//! greater than everything it produced or observed before, no matter how
//! the physical clock behaves underneath.

use chronomesh::hlc::{HlcClock, HlcTimestamp};
use proptest::prelude::*;

fn remote(pt: f64, lc: u64) -> HlcTimestamp {
    HlcTimestamp::new(pt, lc, "remote".to_string())
}

#[test]
fn test_tick_strictly_increases() {
    let mut clock = HlcClock::new("a".into(), 0.0);
    let mut prev = clock.current().clone();
    for pt in [1.0, 1.0, 0.5, 2.0, 2.0, 2.0] {
        let next = clock.tick(pt);
        assert!(next > prev, "{next} not after {prev}");
        prev = next;
    }
}

#[test]
fn test_pt_never_regresses() {
    let mut clock = HlcClock::new("a".into(), 100.0);
    clock.tick(50.0);
    assert_eq!(clock.current().pt, 100.0);
    clock.merge(40.0, &remote(60.0, 0));
    assert_eq!(clock.current().pt, 100.0);
}

#[test]
fn test_merge_dominates_remote() {
    let mut clock = HlcClock::new("a".into(), 10.0);
    let r = remote(10.0, 7);
    let merged = clock.merge(10.0, &r);
    assert!(merged > r);
    assert_eq!(merged.lc, 8);
}

/// Scenario: A sends M1 to B, B sends M2 (caused by M1) to C. C's clock
/// after receiving M2 exceeds both H1 and H2.
#[test]
fn test_causal_chain_across_three_nodes() {
    let mut a = HlcClock::new("a".into(), 5.0);
    let mut b = HlcClock::new("b".into(), 5.0);
    let mut c = HlcClock::new("c".into(), 5.0);

    let h1 = a.tick(5.001);
    b.merge(5.002, &h1);
    let h2 = b.tick(5.002);
    assert!(h2 > h1);

    let after = c.merge(5.0, &h2);
    assert!(after > h1);
    assert!(after > h2);
}

proptest! {
    /// Any interleaving of local ticks and remote merges stays strictly
    /// monotone and always exceeds the merged remote.
    #[test]
    fn prop_hlc_strictly_monotone(
        ops in prop::collection::vec(
            (any::<bool>(), 0.0..1e9f64, 0.0..1e9f64, 0u64..1000),
            1..200,
        )
    ) {
        let mut clock = HlcClock::new("local".into(), 0.0);
        let mut prev = clock.current().clone();

        for (is_tick, now_pt, remote_pt, remote_lc) in ops {
            let next = if is_tick {
                clock.tick(now_pt)
            } else {
                let r = remote(remote_pt, remote_lc);
                let merged = clock.merge(now_pt, &r);
                prop_assert!(merged > r, "merge {merged} did not exceed remote {r}");
                merged
            };
            prop_assert!(next > prev, "{next} not after {prev}");
            prev = next;
        }
    }
}
