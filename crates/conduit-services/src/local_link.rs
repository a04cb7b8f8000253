//! In-process broker link. Records subscriptions and publishes instead of
//! sending them anywhere, so the router can be driven without a broker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::link::{BrokerLink, LinkError, Qos};

/// A message handed to a `LocalLink`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: Qos,
    pub retain: bool,
}

#[derive(Debug, Default)]
pub struct LocalLink {
    published: Mutex<Vec<Published>>,
    subscriptions: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl LocalLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish and subscribe fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn published(&self) -> Vec<Published> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl BrokerLink for LocalLink {
    fn subscribe(&self, pattern: &str, _qos: Qos) -> Result<(), LinkError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(LinkError::NotConnected);
        }
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(pattern.to_string());
        Ok(())
    }

    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: Qos,
        retain: bool,
    ) -> Result<(), LinkError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(LinkError::NotConnected);
        }
        tracing::trace!(topic, bytes = payload.len(), "local publish");
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Published {
                topic: topic.to_string(),
                payload: payload.to_vec(),
                qos,
                retain,
            });
        Ok(())
    }
}
