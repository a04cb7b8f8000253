use conduit_core::PartitionRange;
use conduit_services::{LinkSide, Outcome, RelayError};

use crate::*;

/// Device traffic leaves the namespace; application traffic enters it.
#[test]
fn test_relay_both_directions() {
    let r = relay(PartitionRange::full());
    r.router.on_connect(LinkSide::Upstream, 0);
    r.router.on_connect(LinkSide::Downstream, 0);

    let up = br#"{"_id":"sensor-01","temp":21.5}"#;
    let down = br#"{"_id":"sensor-01","cmd":"reboot"}"#;

    r.router
        .on_message(LinkSide::Upstream, "d2i1820/agent/stc/sensorA", up)
        .unwrap();
    r.router
        .on_message(LinkSide::Downstream, "stt/cmd1", down)
        .unwrap();

    let to_app = r.downstream.published();
    assert_eq!(to_app.len(), 1);
    assert_eq!(to_app[0].topic, "stc/sensorA");
    assert_eq!(to_app[0].payload, up.to_vec(), "payload must be byte-identical");

    let to_devices = r.upstream.published();
    assert_eq!(to_devices.len(), 1);
    assert_eq!(to_devices[0].topic, "d2i1820/agent/stt/cmd1");
    assert_eq!(to_devices[0].payload, down.to_vec());
}

/// Payload formatting is preserved untouched, whitespace and key order included.
#[test]
fn test_payload_bytes_not_reserialized() {
    let r = relay(PartitionRange::full());
    let payload = b"{ \"z\" : 1,\n  \"_id\" : \"x\" }";

    r.router
        .on_message(LinkSide::Upstream, "d2i1820/agent/stc/a/b/c", payload)
        .unwrap();

    let sent = r.downstream.published();
    assert_eq!(sent[0].topic, "stc/a/b/c");
    assert_eq!(sent[0].payload, payload.to_vec());
}

/// Two instances with disjoint ranges never both relay the same identifier.
#[test]
fn test_disjoint_instances_split_traffic() {
    let ranges = PartitionRange::split_even(2).unwrap();
    let a = relay(ranges[0]);
    let b = relay(ranges[1]);

    for n in 0..200 {
        let payload = format!(r#"{{"_id":"device-{n}"}}"#);
        let topic = "d2i1820/agent/stc/t";
        let ra = a.router.on_message(LinkSide::Upstream, topic, payload.as_bytes()).unwrap();
        let rb = b.router.on_message(LinkSide::Upstream, topic, payload.as_bytes()).unwrap();
        let relayed = [&ra, &rb]
            .iter()
            .filter(|o| matches!(o, Outcome::Relayed(_)))
            .count();
        assert_eq!(relayed, 1, "device-{n} relayed by {relayed} instances");
    }

    let total = a.downstream.published().len() + b.downstream.published().len();
    assert_eq!(total, 200);
}

/// Out-of-range messages produce no publish and no error log.
#[test]
fn test_out_of_range_is_silent() {
    let r = relay(only("sensor-01"));

    let errors = count_errors(|| {
        let outcome = r
            .router
            .on_message(LinkSide::Upstream, "d2i1820/agent/stc/x", br#"{"_id":"sensor-02"}"#)
            .unwrap();
        assert!(matches!(outcome, Outcome::Skipped { .. }));
    });

    assert_eq!(errors, 0);
    assert!(r.downstream.published().is_empty());
}

/// A message without `_id` is dropped with exactly one error line.
#[test]
fn test_missing_identifier_logs_once() {
    let r = relay(PartitionRange::full());

    let errors = count_errors(|| {
        let result = r
            .router
            .on_message(LinkSide::Upstream, "d2i1820/agent/stc/x", br#"{"temp":3}"#);
        assert_eq!(result, Err(RelayError::MissingIdentifier));
    });

    assert_eq!(errors, 1);
    assert!(r.downstream.published().is_empty());
    assert!(r.upstream.published().is_empty());
}

/// Each bad payload logs one error and the next good message still flows.
#[test]
fn test_bad_payloads_do_not_stall_link() {
    let r = relay(PartitionRange::full());
    let topic = "d2i1820/agent/stc/x";

    let errors = count_errors(|| {
        for bad in [&b"garbage"[..], b"42", br#"{"_id":[1]}"#, br#"{"_id":true}"#] {
            assert!(r.router.on_message(LinkSide::Upstream, topic, bad).is_err());
        }
        r.router
            .on_message(LinkSide::Upstream, topic, br#"{"_id":"ok"}"#)
            .unwrap();
    });

    assert_eq!(errors, 4);
    assert_eq!(r.downstream.published().len(), 1);

    let stats = r.router.stats(LinkSide::Upstream);
    assert_eq!(stats.received, 5);
    assert_eq!(stats.relayed, 1);
    assert_eq!(stats.dropped(), 4);
}

/// Upstream topics outside `<ns>/agent/` are rejected, not forwarded raw.
#[test]
fn test_foreign_upstream_topic_rejected() {
    let r = relay(PartitionRange::full());

    let result = r
        .router
        .on_message(LinkSide::Upstream, "other/agent/stc/x", br#"{"_id":"a"}"#);

    assert!(matches!(result, Err(RelayError::TopicOutsideNamespace(_))));
    assert!(r.downstream.published().is_empty());
}

/// Numeric and string forms of the same identifier land on the same digest.
#[test]
fn test_numeric_identifier_matches_string_form() {
    let r = relay(only("42"));

    let numeric = r
        .router
        .on_message(LinkSide::Downstream, "stt/a", br#"{"_id":42}"#)
        .unwrap();
    let text = r
        .router
        .on_message(LinkSide::Downstream, "stt/a", br#"{"_id":"42"}"#)
        .unwrap();

    assert!(matches!(numeric, Outcome::Relayed(_)));
    assert!(matches!(text, Outcome::Relayed(_)));
    assert_eq!(r.upstream.published().len(), 2);
}

/// Range is checked before the topic, so another instance's traffic on an
/// unexpected topic stays silent here.
#[test]
fn test_out_of_range_foreign_topic_is_silent() {
    let r = relay(only("sensor-01"));

    let errors = count_errors(|| {
        let outcome = r
            .router
            .on_message(LinkSide::Upstream, "other/agent/stc/x", br#"{"_id":"sensor-02"}"#)
            .unwrap();
        assert!(matches!(outcome, Outcome::Skipped { .. }));
    });

    assert_eq!(errors, 0);
    assert_eq!(r.router.stats(LinkSide::Upstream).foreign_topic, 0);
}
