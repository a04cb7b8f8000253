//! Per-link relay counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for messages arriving on one link.
#[derive(Debug, Default)]
pub struct RelayStats {
    received: AtomicU64,
    relayed: AtomicU64,
    skipped: AtomicU64,
    malformed: AtomicU64,
    missing_id: AtomicU64,
    invalid_id: AtomicU64,
    foreign_topic: AtomicU64,
    publish_failures: AtomicU64,
    store_failures: AtomicU64,
}

/// Point-in-time copy of `RelayStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub relayed: u64,
    pub skipped: u64,
    pub malformed: u64,
    pub missing_id: u64,
    pub invalid_id: u64,
    pub foreign_topic: u64,
    pub publish_failures: u64,
    pub store_failures: u64,
}

impl StatsSnapshot {
    /// Messages dropped before the admission check.
    pub fn dropped(&self) -> u64 {
        self.malformed + self.missing_id + self.invalid_id + self.foreign_topic
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn received(&self) {
        bump(&self.received);
    }

    pub(crate) fn relayed(&self) {
        bump(&self.relayed);
    }

    pub(crate) fn skipped(&self) {
        bump(&self.skipped);
    }

    pub(crate) fn malformed(&self) {
        bump(&self.malformed);
    }

    pub(crate) fn missing_id(&self) {
        bump(&self.missing_id);
    }

    pub(crate) fn invalid_id(&self) {
        bump(&self.invalid_id);
    }

    pub(crate) fn foreign_topic(&self) {
        bump(&self.foreign_topic);
    }

    pub(crate) fn publish_failure(&self) {
        bump(&self.publish_failures);
    }

    pub(crate) fn store_failure(&self) {
        bump(&self.store_failures);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            received: load(&self.received),
            relayed: load(&self.relayed),
            skipped: load(&self.skipped),
            malformed: load(&self.malformed),
            missing_id: load(&self.missing_id),
            invalid_id: load(&self.invalid_id),
            foreign_topic: load(&self.foreign_topic),
            publish_failures: load(&self.publish_failures),
            store_failures: load(&self.store_failures),
        }
    }
}
