//! Configuration system for Conduit.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $CONDUIT_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/conduit/config.toml
//!   3. ~/.config/conduit/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::hash::{Digest, DigestParseError};
use crate::partition::{PartitionRange, RangeError};
use crate::topic::{TopicError, TopicRules};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConduitConfig {
    pub relay: RelayConfig,
    pub partition: PartitionConfig,
    pub upstream: BrokerConfig,
    pub downstream: BrokerConfig,
    pub store: StoreConfig,
    pub api: ApiConfig,
    pub stats: StatsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Topic namespace shared by all devices, e.g. `d2i1820`.
    pub namespace: String,
    /// QoS for republished messages. 0 = at most once.
    pub qos: u8,
    pub retain: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Lowest digest this instance owns, hex. Inclusive.
    pub min_hash: String,
    /// Highest digest this instance owns, hex. Inclusive.
    pub max_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// Max seconds between control packets before the broker pings.
    pub keep_alive_secs: u64,
    /// MQTT client id. Empty = derived from the side and process id.
    pub client_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file for route bookkeeping. Empty = in memory.
    pub path: PathBuf,
    /// Most route records kept; the least recently seen are evicted
    /// beyond this. 0 = unbounded.
    pub max_routes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Status endpoint port on 127.0.0.1. 0 = disabled.
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Seconds between stats log lines. 0 = never.
    pub interval_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for ConduitConfig {
    fn default() -> Self {
        Self {
            relay: RelayConfig::default(),
            partition: PartitionConfig::default(),
            upstream: BrokerConfig::default(),
            downstream: BrokerConfig::default(),
            store: StoreConfig::default(),
            api: ApiConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            namespace: "d2i1820".to_string(),
            qos: 0,
            retain: false,
        }
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            min_hash: Digest::MIN.to_hex(),
            max_hash: Digest::MAX.to_hex(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            keep_alive_secs: 60,
            client_id: String::new(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("routes.db"),
            max_routes: 100_000,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 9101 }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("conduit")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("conduit")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid {field}: {source}")]
    BadHash {
        field: &'static str,
        source: DigestParseError,
    },
    #[error(transparent)]
    BadRange(#[from] RangeError),
    #[error(transparent)]
    BadNamespace(#[from] TopicError),
    #[error("qos must be 0, 1 or 2, got {0}")]
    BadQos(u8),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl ConduitConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            ConduitConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("CONDUIT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&ConduitConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Validated partition range.
    pub fn partition(&self) -> Result<PartitionRange, ConfigError> {
        let min = self
            .partition
            .min_hash
            .parse::<Digest>()
            .map_err(|source| ConfigError::BadHash {
                field: "min_hash",
                source,
            })?;
        let max = self
            .partition
            .max_hash
            .parse::<Digest>()
            .map_err(|source| ConfigError::BadHash {
                field: "max_hash",
                source,
            })?;
        Ok(PartitionRange::new(min, max)?)
    }

    /// Validated topic layout.
    pub fn topics(&self) -> Result<TopicRules, ConfigError> {
        Ok(TopicRules::new(self.relay.namespace.clone())?)
    }

    /// Check everything that would make the relay misbehave at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.partition()?;
        self.topics()?;
        if self.relay.qos > 2 {
            return Err(ConfigError::BadQos(self.relay.qos));
        }
        Ok(())
    }

    /// Positional form `<broker_host> <min_hash> <max_hash> [store_path]`.
    /// Sets both brokers' host. Extra arguments are ignored.
    pub fn apply_args(&mut self, args: &[String]) {
        if let Some(host) = args.first() {
            self.upstream.host = host.clone();
            self.downstream.host = host.clone();
        }
        if let Some(min) = args.get(1) {
            self.partition.min_hash = min.clone();
        }
        if let Some(max) = args.get(2) {
            self.partition.max_hash = max.clone();
        }
        if let Some(path) = args.get(3) {
            self.store.path = PathBuf::from(path);
        }
    }

    /// Apply CONDUIT_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CONDUIT_RELAY__NAMESPACE") {
            self.relay.namespace = v;
        }
        if let Ok(v) = std::env::var("CONDUIT_PARTITION__MIN_HASH") {
            self.partition.min_hash = v;
        }
        if let Ok(v) = std::env::var("CONDUIT_PARTITION__MAX_HASH") {
            self.partition.max_hash = v;
        }
        if let Ok(v) = std::env::var("CONDUIT_UPSTREAM__HOST") {
            self.upstream.host = v;
        }
        if let Ok(v) = std::env::var("CONDUIT_UPSTREAM__PORT") {
            if let Ok(p) = v.parse() {
                self.upstream.port = p;
            }
        }
        if let Ok(v) = std::env::var("CONDUIT_DOWNSTREAM__HOST") {
            self.downstream.host = v;
        }
        if let Ok(v) = std::env::var("CONDUIT_DOWNSTREAM__PORT") {
            if let Ok(p) = v.parse() {
                self.downstream.port = p;
            }
        }
        if let Ok(v) = std::env::var("CONDUIT_STORE__PATH") {
            self.store.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CONDUIT_STORE__MAX_ROUTES") {
            if let Ok(n) = v.parse() {
                self.store.max_routes = n;
            }
        }
        if let Ok(v) = std::env::var("CONDUIT_API__PORT") {
            if let Ok(p) = v.parse() {
                self.api.port = p;
            }
        }
    }
}
