use std::path::PathBuf;
use std::sync::Arc;

use conduit_core::{Identifier, PartitionRange};
use conduit_services::{LinkSide, RouteStore, SqliteRouteStore};

use crate::*;

fn scratch_db(name: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir()
        .join(format!("conduit-it-{}-{nanos}", std::process::id()))
        .join(name)
}

/// Admitted identifiers are recorded in SQLite and survive a reopen;
/// skipped ones are not recorded.
#[test]
fn test_sqlite_records_admitted_routes() {
    let path = scratch_db("routes.db");
    {
        let store = Arc::new(SqliteRouteStore::open(&path).unwrap());
        let r = relay_with_store(only("sensor-01"), store.clone());

        for id in ["sensor-01", "sensor-02", "sensor-01"] {
            let payload = format!(r#"{{"_id":"{id}"}}"#);
            r.router
                .on_message(LinkSide::Upstream, "d2i1820/agent/stc/x", payload.as_bytes())
                .unwrap();
        }

        assert_eq!(r.downstream.published().len(), 2);
        assert_eq!(store.len().unwrap(), 1);
    }

    let reopened = SqliteRouteStore::open(&path).unwrap();
    let rec = reopened
        .get(&Identifier::new("sensor-01"))
        .unwrap()
        .expect("route persisted");
    assert_eq!(rec.digest.to_hex(), "472d6b2ed0");
    assert!(rec.last_seen > 0);
    assert!(reopened.get(&Identifier::new("sensor-02")).unwrap().is_none());

    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

/// Repeated sightings refresh `last_seen` without duplicating the record.
#[test]
fn test_sqlite_upsert_refreshes_last_seen() {
    let store = Arc::new(SqliteRouteStore::open_in_memory().unwrap());
    let r = relay_with_store(PartitionRange::full(), store.clone());

    r.router
        .on_message(LinkSide::Downstream, "stt/a", br#"{"_id":"device-7f3a"}"#)
        .unwrap();
    let first = store.get(&Identifier::new("device-7f3a")).unwrap().unwrap();

    std::thread::sleep(std::time::Duration::from_millis(5));
    r.router
        .on_message(LinkSide::Downstream, "stt/a", br#"{"_id":"device-7f3a"}"#)
        .unwrap();
    let second = store.get(&Identifier::new("device-7f3a")).unwrap().unwrap();

    assert_eq!(store.len().unwrap(), 1);
    assert_eq!(second.digest.to_hex(), "4e2d9c9e50");
    assert!(second.last_seen > first.last_seen);
}

/// A capped store keeps relaying and holds only the most recent routes.
#[test]
fn test_capped_store_keeps_recent_routes() {
    let store = Arc::new(SqliteRouteStore::open_in_memory().unwrap().with_max_routes(50));
    let r = relay_with_store(PartitionRange::full(), store.clone());

    for n in 0..200 {
        let payload = format!(r#"{{"_id":"device-{n}"}}"#);
        r.router
            .on_message(LinkSide::Upstream, "d2i1820/agent/stc/x", payload.as_bytes())
            .unwrap();
    }

    assert_eq!(r.downstream.published().len(), 200);
    assert!(store.len().unwrap() <= 50);
    assert!(store.get(&Identifier::new("device-199")).unwrap().is_some());
    assert!(store.get(&Identifier::new("device-0")).unwrap().is_none());
}
