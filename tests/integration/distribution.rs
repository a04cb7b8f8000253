use conduit_core::{Digest, PartitionRange};
use conduit_services::{LinkSide, Outcome};

use crate::*;

fn assert_uniform(ids: impl Iterator<Item = String>) {
    let mut buckets = [[0u32; 16]; 10];
    let mut total = 0u32;
    for id in ids {
        let hex = digest(&id).to_hex();
        for (pos, c) in hex.chars().enumerate() {
            let v = c.to_digit(16).expect("hex digit") as usize;
            buckets[pos][v] += 1;
        }
        total += 1;
    }

    let expected = f64::from(total) / 16.0;
    for (pos, counts) in buckets.iter().enumerate() {
        for (v, &n) in counts.iter().enumerate() {
            let dev = (f64::from(n) - expected).abs() / expected;
            assert!(
                dev <= 0.20,
                "position {pos} digit {v:x}: {n} of {total} (expected ~{expected})"
            );
        }
    }
}

/// Hex digits at every position of the digest are roughly uniform.
#[test]
fn test_digit_distribution_numeric_ids() {
    assert_uniform((1..=16_000).map(|n| n.to_string()));
}

#[test]
fn test_digit_distribution_prefixed_ids() {
    assert_uniform((1..=16_000).map(|n| format!("device-{n}")));
}

/// Both range bounds are inclusive.
#[test]
fn test_range_bounds_inclusive() {
    let d = digest("sensor-01");
    assert_eq!(d.to_hex(), "472d6b2ed0");
    let v = d.to_u64();

    let at = |min: u64, max: u64| {
        let range = PartitionRange::new(
            Digest::from_u64(min).unwrap(),
            Digest::from_u64(max).unwrap(),
        )
        .unwrap();
        let r = relay(range);
        let outcome = r
            .router
            .on_message(LinkSide::Upstream, "d2i1820/agent/stc/x", br#"{"_id":"sensor-01"}"#)
            .unwrap();
        matches!(outcome, Outcome::Relayed(_))
    };

    assert!(at(v, v));
    assert!(at(v, Digest::MAX_VALUE));
    assert!(at(0, v));
    assert!(!at(v + 1, Digest::MAX_VALUE));
    assert!(!at(0, v - 1));
}

/// An even split covers every identifier exactly once.
#[test]
fn test_split_covers_every_identifier() {
    let ranges = PartitionRange::split_even(7).unwrap();
    for n in 0..2_000 {
        let d = digest(&format!("node-{n}"));
        let owners = ranges.iter().filter(|r| r.contains(d)).count();
        assert_eq!(owners, 1, "node-{n} ({d}) owned by {owners} ranges");
    }
}
