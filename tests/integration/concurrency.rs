use std::sync::Arc;
use std::thread;

use conduit_core::PartitionRange;
use conduit_services::{LinkSide, SqliteRouteStore};

use crate::*;

const THREADS: usize = 4;
const PER_THREAD: usize = 250;

/// Four threads per link, each with its own identifiers, all at once.
fn flood_both_links(r: &Relay) {
    thread::scope(|s| {
        for t in 0..THREADS {
            let router = &r.router;
            s.spawn(move || {
                for n in 0..PER_THREAD {
                    let payload = format!(r#"{{"_id":"up-{t}-{n}","seq":{n}}}"#);
                    let topic = format!("d2i1820/agent/stc/up{t}");
                    router
                        .on_message(LinkSide::Upstream, &topic, payload.as_bytes())
                        .unwrap();
                }
            });
            s.spawn(move || {
                for n in 0..PER_THREAD {
                    let payload = format!(r#"{{"_id":"down-{t}-{n}","seq":{n}}}"#);
                    let topic = format!("stt/down{t}");
                    router
                        .on_message(LinkSide::Downstream, &topic, payload.as_bytes())
                        .unwrap();
                }
            });
        }
    });
}

fn assert_links_isolated(r: &Relay) {
    let to_app = r.downstream.published();
    let to_devices = r.upstream.published();
    assert_eq!(to_app.len(), THREADS * PER_THREAD);
    assert_eq!(to_devices.len(), THREADS * PER_THREAD);

    for p in &to_app {
        let v: serde_json::Value = serde_json::from_slice(&p.payload).unwrap();
        let id = v["_id"].as_str().unwrap();
        assert!(id.starts_with("up-"), "downstream got {id}");
        let t = &id[3..id.rfind('-').unwrap()];
        assert_eq!(p.topic, format!("stc/up{t}"));
    }
    for p in &to_devices {
        let v: serde_json::Value = serde_json::from_slice(&p.payload).unwrap();
        let id = v["_id"].as_str().unwrap();
        assert!(id.starts_with("down-"), "upstream got {id}");
        let t = &id[5..id.rfind('-').unwrap()];
        assert_eq!(p.topic, format!("d2i1820/agent/stt/down{t}"));
    }

    let total = (THREADS * PER_THREAD) as u64;
    assert_eq!(r.router.stats(LinkSide::Upstream).relayed, total);
    assert_eq!(r.router.stats(LinkSide::Downstream).relayed, total);
}

/// One record per identifier, each carrying that identifier's own digest.
fn assert_records_intact(store: &dyn RouteStore) {
    assert_eq!(store.len().unwrap(), 2 * THREADS * PER_THREAD);
    for t in 0..THREADS {
        for n in 0..PER_THREAD {
            for id in [format!("up-{t}-{n}"), format!("down-{t}-{n}")] {
                let rec = store
                    .get(&Identifier::new(id.as_str()))
                    .unwrap()
                    .unwrap_or_else(|| panic!("no record for {id}"));
                assert_eq!(rec.id.as_str(), id);
                assert_eq!(rec.digest, digest(&id), "digest mismatch for {id}");
                assert!(rec.last_seen > 0);
            }
        }
    }
}

#[test]
fn test_concurrent_links_stay_isolated_memory_store() {
    let store = Arc::new(MemoryRouteStore::new());
    let r = relay_with_store(PartitionRange::full(), store.clone());

    flood_both_links(&r);

    assert_links_isolated(&r);
    assert_records_intact(store.as_ref());
}

#[test]
fn test_concurrent_links_stay_isolated_sqlite_store() {
    let store = Arc::new(SqliteRouteStore::open_in_memory().unwrap());
    let r = relay_with_store(PartitionRange::full(), store.clone());

    flood_both_links(&r);

    assert_links_isolated(&r);
    assert_records_intact(store.as_ref());
}

/// Both links racing on one identifier leave exactly one well-formed record.
fn race_same_identifier(store: Arc<dyn RouteStore>) {
    let r = relay_with_store(PartitionRange::full(), store.clone());
    let payload = br#"{"_id":"shared-01"}"#;

    thread::scope(|s| {
        for _ in 0..THREADS {
            let router = &r.router;
            s.spawn(move || {
                for _ in 0..PER_THREAD {
                    router
                        .on_message(LinkSide::Upstream, "d2i1820/agent/stc/x", payload)
                        .unwrap();
                }
            });
            s.spawn(move || {
                for _ in 0..PER_THREAD {
                    router
                        .on_message(LinkSide::Downstream, "stt/x", payload)
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(store.len().unwrap(), 1);
    let rec = store.get(&Identifier::new("shared-01")).unwrap().unwrap();
    assert_eq!(rec.digest, digest("shared-01"));
    assert_eq!(r.downstream.published().len(), THREADS * PER_THREAD);
    assert_eq!(r.upstream.published().len(), THREADS * PER_THREAD);
}

#[test]
fn test_same_identifier_race_memory_store() {
    race_same_identifier(Arc::new(MemoryRouteStore::new()));
}

#[test]
fn test_same_identifier_race_sqlite_store() {
    race_same_identifier(Arc::new(SqliteRouteStore::open_in_memory().unwrap()));
}
