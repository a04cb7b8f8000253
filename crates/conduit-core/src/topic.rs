//! Topic rewriting between the device-facing and application-facing brokers.
//!
//! Devices publish under `<ns>/agent/stc/...` and listen under
//! `<ns>/agent/stt/...`. Applications see the same topics without the
//! `<ns>/agent/` prefix: they listen on `stc/...` and publish on `stt/...`.

/// Topic layout for one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRules {
    namespace: String,
    prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    #[error("namespace is empty")]
    EmptyNamespace,
    #[error("namespace {0:?} contains a wildcard or separator")]
    InvalidNamespace(String),
}

impl TopicRules {
    pub fn new(namespace: impl Into<String>) -> Result<Self, TopicError> {
        let namespace = namespace.into();
        if namespace.is_empty() {
            return Err(TopicError::EmptyNamespace);
        }
        if namespace.contains(['/', '+', '#']) {
            return Err(TopicError::InvalidNamespace(namespace));
        }
        let prefix = format!("{namespace}/agent/");
        Ok(Self { namespace, prefix })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Subscription on the device-facing broker.
    pub fn upstream_pattern(&self) -> String {
        format!("{}stc/#", self.prefix)
    }

    /// Subscription on the application-facing broker.
    pub fn downstream_pattern(&self) -> String {
        "stt/#".to_string()
    }

    /// Device topic → application topic. None if the topic is outside the
    /// namespace.
    pub fn to_downstream<'a>(&self, topic: &'a str) -> Option<&'a str> {
        topic.strip_prefix(self.prefix.as_str())
    }

    /// Application topic → device topic.
    pub fn to_upstream(&self, topic: &str) -> String {
        format!("{}{}", self.prefix, topic)
    }
}
