//! Broker link seam.
//!
//! A `BrokerLink` is the outbound half of a broker connection: subscribe and
//! publish. The inbound half (connect, disconnect, log and message events) is
//! delivered by the transport driver into `BridgeRouter`'s handler methods.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

/// Which broker a link talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkSide {
    /// Device-facing broker.
    Upstream,
    /// Application-facing broker.
    Downstream,
}

impl LinkSide {
    pub fn opposite(self) -> Self {
        match self {
            Self::Upstream => Self::Downstream,
            Self::Downstream => Self::Upstream,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Upstream => 0,
            Self::Downstream => 1,
        }
    }
}

impl fmt::Display for LinkSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Upstream => "upstream",
            Self::Downstream => "downstream",
        })
    }
}

/// Connection lifecycle: Disconnected → Connecting → Connected, and back to
/// Disconnected on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LinkState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl LinkState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

/// Lock-free holder for a link's state, shared between the transport task
/// and status readers.
#[derive(Debug)]
pub(crate) struct LinkStateCell(AtomicU8);

impl LinkStateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(LinkState::Disconnected as u8))
    }

    pub(crate) fn load(&self) -> LinkState {
        LinkState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Returns the previous state.
    pub(crate) fn swap(&self, state: LinkState) -> LinkState {
        LinkState::from_u8(self.0.swap(state as u8, Ordering::AcqRel))
    }
}

/// Delivery guarantee requested from the broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum Qos {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl Qos {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::AtMostOnce),
            1 => Some(Self::AtLeastOnce),
            2 => Some(Self::ExactlyOnce),
            _ => None,
        }
    }
}

/// Severity of a transport-level log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportLogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("link is not connected")]
    NotConnected,
    #[error("broker client rejected the request: {0}")]
    Rejected(String),
}

/// Outbound operations on one broker connection.
///
/// Implementations must not block for long: they are called from the
/// delivery task of the *other* link while a message is being relayed.
pub trait BrokerLink: Send + Sync {
    fn subscribe(&self, pattern: &str, qos: Qos) -> Result<(), LinkError>;

    fn publish(&self, topic: &str, payload: &[u8], qos: Qos, retain: bool)
        -> Result<(), LinkError>;
}
