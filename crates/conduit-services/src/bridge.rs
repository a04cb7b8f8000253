//! Bridge router — relays admitted messages between the device-facing and
//! application-facing brokers.
//!
//! Per inbound message, synchronously:
//!   1. parse the payload as a JSON object
//!   2. extract and canonicalize `_id`
//!   3. hash `_id` and test it against this instance's partition range
//!   4. rewrite the topic for the opposite broker
//!   5. upsert the route record and republish the original payload bytes
//!      on the opposite link
//!
//! Steps 1, 2 and 4 failing drops the message with one error log line. A
//! message outside the range is dropped silently at step 3, whatever its
//! topic. In step 5 the store write and the
//! publish are attempted independently; either failing is logged and
//! counted, never propagated. Delivery is at most once.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use conduit_core::identifier::ID_FIELD;
use conduit_core::{admit, Digest, Identifier, IdentifierError, PartitionRange, TopicRules};

use crate::link::{BrokerLink, LinkSide, LinkState, LinkStateCell, Qos, TransportLogLevel};
use crate::route_store::{RouteState, RouteStore};
use crate::stats::{RelayStats, StatsSnapshot};

/// Publish options for republished messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelaySettings {
    pub qos: Qos,
    pub retain: bool,
}

/// Why a message was dropped before admission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("payload is not valid JSON: {0}")]
    Malformed(String),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload has no `_id` field")]
    MissingIdentifier,
    #[error("invalid `_id`: {0}")]
    InvalidIdentifier(#[from] IdentifierError),
    #[error("topic {0:?} is outside the relay namespace")]
    TopicOutsideNamespace(String),
}

/// What happened to an admitted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReport {
    pub id: Identifier,
    pub digest: Digest,
    /// Topic the payload was republished under.
    pub topic: String,
    /// Route record written.
    pub recorded: bool,
    /// Payload handed to the opposite link.
    pub forwarded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Admitted; see the report for which side effects succeeded.
    Relayed(RelayReport),
    /// Digest outside this instance's range.
    Skipped { digest: Digest },
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkStatus {
    pub state: LinkState,
    pub subscription: String,
    pub stats: StatsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouterStatus {
    pub namespace: String,
    pub min_hash: Digest,
    pub max_hash: Digest,
    pub upstream: LinkStatus,
    pub downstream: LinkStatus,
}

/// The relay. Shared by `Arc` between both links' delivery tasks.
pub struct BridgeRouter {
    topics: TopicRules,
    range: PartitionRange,
    settings: RelaySettings,
    links: [Arc<dyn BrokerLink>; 2],
    store: Arc<dyn RouteStore>,
    states: [LinkStateCell; 2],
    stats: [RelayStats; 2],
}

impl BridgeRouter {
    pub fn new(
        topics: TopicRules,
        range: PartitionRange,
        upstream: Arc<dyn BrokerLink>,
        downstream: Arc<dyn BrokerLink>,
        store: Arc<dyn RouteStore>,
    ) -> Self {
        Self {
            topics,
            range,
            settings: RelaySettings::default(),
            links: [upstream, downstream],
            store,
            states: [LinkStateCell::new(), LinkStateCell::new()],
            stats: [RelayStats::new(), RelayStats::new()],
        }
    }

    pub fn with_settings(mut self, settings: RelaySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn link_state(&self, side: LinkSide) -> LinkState {
        self.states[side.index()].load()
    }

    pub fn stats(&self, side: LinkSide) -> StatsSnapshot {
        self.stats[side.index()].snapshot()
    }

    /// Subscription pattern for a side.
    pub fn subscription(&self, side: LinkSide) -> String {
        match side {
            LinkSide::Upstream => self.topics.upstream_pattern(),
            LinkSide::Downstream => self.topics.downstream_pattern(),
        }
    }

    fn link(&self, side: LinkSide) -> &dyn BrokerLink {
        self.links[side.index()].as_ref()
    }

    // ── Connection events ─────────────────────────────────────────────────────

    /// The transport started (re)connecting.
    pub fn on_connecting(&self, side: LinkSide) {
        let prev = self.states[side.index()].swap(LinkState::Connecting);
        tracing::debug!(side = %side, from = ?prev, "connecting to broker");
    }

    /// Broker answered the connect. `code` 0 is success; anything else is a
    /// refusal and leaves the link disconnected.
    pub fn on_connect(&self, side: LinkSide, code: u8) {
        if code != 0 {
            self.states[side.index()].swap(LinkState::Disconnected);
            tracing::error!(side = %side, code, "broker refused connection");
            return;
        }

        self.states[side.index()].swap(LinkState::Connected);
        tracing::info!(side = %side, code, "connected to broker");

        let pattern = self.subscription(side);
        match self.link(side).subscribe(&pattern, self.settings.qos) {
            Ok(()) => tracing::info!(side = %side, pattern, "subscribed"),
            Err(e) => tracing::error!(side = %side, pattern, error = %e, "subscribe failed"),
        }
    }

    pub fn on_disconnect(&self, side: LinkSide, code: u8) {
        let prev = self.states[side.index()].swap(LinkState::Disconnected);
        if prev != LinkState::Disconnected {
            tracing::error!(side = %side, code, "disconnected from broker");
        }
    }

    /// Transport-level log line.
    pub fn on_log(&self, side: LinkSide, level: TransportLogLevel, text: &str) {
        match level {
            TransportLogLevel::Debug => tracing::debug!(side = %side, "{text}"),
            TransportLogLevel::Info | TransportLogLevel::Notice => {
                tracing::info!(side = %side, "{text}")
            }
            TransportLogLevel::Warning => tracing::warn!(side = %side, "{text}"),
            TransportLogLevel::Error => tracing::error!(side = %side, "{text}"),
        }
    }

    // ── Messages ──────────────────────────────────────────────────────────────

    /// Handle one inbound message from `side`. Never fails the connection:
    /// errors are logged here and returned only for inspection.
    pub fn on_message(
        &self,
        side: LinkSide,
        topic: &str,
        payload: &[u8],
    ) -> Result<Outcome, RelayError> {
        let stats = &self.stats[side.index()];
        stats.received();

        let result = self.relay(side, topic, payload);
        if let Err(e) = &result {
            match e {
                RelayError::Malformed(_) | RelayError::NotAnObject => stats.malformed(),
                RelayError::MissingIdentifier => stats.missing_id(),
                RelayError::InvalidIdentifier(_) => stats.invalid_id(),
                RelayError::TopicOutsideNamespace(_) => stats.foreign_topic(),
            }
            tracing::error!(side = %side, topic, error = %e, "message dropped");
        }
        result
    }

    fn relay(&self, side: LinkSide, topic: &str, payload: &[u8]) -> Result<Outcome, RelayError> {
        let value: Value =
            serde_json::from_slice(payload).map_err(|e| RelayError::Malformed(e.to_string()))?;
        let object = value.as_object().ok_or(RelayError::NotAnObject)?;
        let raw_id = object.get(ID_FIELD).ok_or(RelayError::MissingIdentifier)?;
        let id = Identifier::from_json(raw_id)?;

        let admission = admit(&id, &self.range);
        if !admission.admitted {
            self.stats[side.index()].skipped();
            tracing::debug!(side = %side, id = %id, digest = %admission.digest, "outside range");
            return Ok(Outcome::Skipped {
                digest: admission.digest,
            });
        }

        let out_topic = match side {
            LinkSide::Upstream => self
                .topics
                .to_downstream(topic)
                .ok_or_else(|| RelayError::TopicOutsideNamespace(topic.to_string()))?
                .to_string(),
            LinkSide::Downstream => self.topics.to_upstream(topic),
        };

        let recorded = self.record(side, &id, admission.digest);
        let forwarded = self.forward(side, &out_topic, payload);
        if forwarded {
            self.stats[side.index()].relayed();
        }

        Ok(Outcome::Relayed(RelayReport {
            id,
            digest: admission.digest,
            topic: out_topic,
            recorded,
            forwarded,
        }))
    }

    fn record(&self, side: LinkSide, id: &Identifier, digest: Digest) -> bool {
        match self.store.upsert(&RouteState::seen_now(id.clone(), digest)) {
            Ok(()) => true,
            Err(e) => {
                self.stats[side.index()].store_failure();
                tracing::error!(side = %side, id = %id, error = %e, "route store write failed");
                false
            }
        }
    }

    fn forward(&self, side: LinkSide, topic: &str, payload: &[u8]) -> bool {
        let target = side.opposite();
        match self
            .link(target)
            .publish(topic, payload, self.settings.qos, self.settings.retain)
        {
            Ok(()) => {
                tracing::trace!(from = %side, to = %target, topic, "relayed");
                true
            }
            Err(e) => {
                self.stats[side.index()].publish_failure();
                tracing::error!(from = %side, to = %target, topic, error = %e, "publish failed");
                false
            }
        }
    }

    // ── Status ────────────────────────────────────────────────────────────────

    pub fn status(&self) -> RouterStatus {
        let link = |side: LinkSide| LinkStatus {
            state: self.link_state(side),
            subscription: self.subscription(side),
            stats: self.stats(side),
        };
        RouterStatus {
            namespace: self.topics.namespace().to_string(),
            min_hash: self.range.min(),
            max_hash: self.range.max(),
            upstream: link(LinkSide::Upstream),
            downstream: link(LinkSide::Downstream),
        }
    }

    /// Log a one-line summary per link.
    pub fn log_stats(&self) {
        for side in [LinkSide::Upstream, LinkSide::Downstream] {
            let s = self.stats(side);
            tracing::info!(
                side = %side,
                state = ?self.link_state(side),
                received = s.received,
                relayed = s.relayed,
                skipped = s.skipped,
                dropped = s.dropped(),
                publish_failures = s.publish_failures,
                store_failures = s.store_failures,
                "relay stats"
            );
        }
    }
}
