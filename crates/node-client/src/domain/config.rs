//! Client configuration with validation.
//!
//! Every section is `#[serde(default)]`, so a TOML file only needs the keys it
//! overrides. Durations are written as `"60s"`, `"500ms"` or `"1m"`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Socket and handshake settings
    pub transport: TransportConfig,
    /// Connection supervisor settings
    pub connection: ConnectionConfig,
    /// Connection-establishment dispatcher settings
    pub dispatcher: DispatcherConfig,
    /// Peer discovery settings
    pub discovery: DiscoveryConfig,
    /// JSON-RPC method names
    pub protocol: ProtocolConfig,
}

impl ClientConfig {
    /// Parse from a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatcher.max_concurrent == 0 {
            return Err(ConfigError::InvalidLimit(
                "dispatcher.max_concurrent cannot be 0".into(),
            ));
        }

        if self.transport.max_handshake_bytes == 0 {
            return Err(ConfigError::InvalidLimit(
                "transport.max_handshake_bytes cannot be 0".into(),
            ));
        }

        if self.connection.cooldown.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "connection.cooldown cannot be 0".into(),
            ));
        }

        if self.discovery.attempt_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "discovery.attempt_timeout cannot be 0".into(),
            ));
        }

        if matches!(self.transport.connect_timeout, Some(d) if d.is_zero()) {
            return Err(ConfigError::InvalidTimeout(
                "transport.connect_timeout cannot be 0".into(),
            ));
        }

        if matches!(self.transport.ping_interval, Some(d) if d.is_zero()) {
            return Err(ConfigError::InvalidTimeout(
                "transport.ping_interval cannot be 0".into(),
            ));
        }

        self.discovery.retry.validate()?;
        self.protocol.validate()?;

        Ok(())
    }
}

/// Socket and upgrade handshake configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Bound on TCP connect + TLS + upgrade; unbounded when absent
    #[serde(with = "humantime_serde::option")]
    pub connect_timeout: Option<Duration>,
    /// Keep-alive ping interval; no pings when absent
    #[serde(with = "humantime_serde::option")]
    pub ping_interval: Option<Duration>,
    /// Largest accepted upgrade response head, in bytes
    pub max_handshake_bytes: usize,
    /// Accept any server certificate on `wss://`
    pub accept_invalid_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            ping_interval: None,
            max_handshake_bytes: 8 * 1024,
            accept_invalid_certs: false,
        }
    }
}

/// Connection supervisor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Time spent in FAILURE before the supervisor resets to CLOSED
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Connection-establishment dispatcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Maximum establishment operations running at once
    pub max_concurrent: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { max_concurrent: 64 }
    }
}

/// Peer discovery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// HTTP endpoint returning one seed peer location
    pub node_finder_url: Option<String>,
    /// Port used for the seed and its live peers
    pub port: u16,
    /// Whether discovered peers are reached over `wss://`
    pub use_ssl: bool,
    /// Bound on one whole discovery attempt
    #[serde(with = "humantime_serde")]
    pub attempt_timeout: Duration,
    /// Bound on the HTTP request to the node finder
    #[serde(with = "humantime_serde")]
    pub http_timeout: Duration,
    /// Accept any certificate presented by the node finder
    pub accept_invalid_certs: bool,
    /// Backoff between failed attempts
    pub retry: RetryConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            node_finder_url: None,
            port: 443,
            use_ssl: true,
            attempt_timeout: Duration::from_secs(3),
            http_timeout: Duration::from_secs(30),
            accept_invalid_certs: false,
            retry: RetryConfig::default(),
        }
    }
}

/// Increasing retry delay configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// First delay
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Growth factor applied after each failed attempt
    pub multiplier: f64,
    /// Upper bound on any single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_delay.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "discovery.retry.initial_delay cannot be 0".into(),
            ));
        }
        if !(self.multiplier.is_finite() && self.multiplier >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "discovery.retry.multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        if self.max_delay < self.initial_delay {
            return Err(ConfigError::InvalidTimeout(
                "discovery.retry.max_delay is below initial_delay".into(),
            ));
        }
        Ok(())
    }
}

/// JSON-RPC method names used on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub atoms_subscribe: String,
    pub atoms_update: String,
    pub subscription_cancel: String,
    pub submit_atom: String,
    pub submission_update: String,
    pub get_self: String,
    pub get_live_peers: String,
    pub get_atoms: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            atoms_subscribe: "Atoms.subscribe".into(),
            atoms_update: "Atoms.subscribeUpdate".into(),
            subscription_cancel: "Subscription.cancel".into(),
            submit_atom: "Universe.submitAtomAndSubscribe".into(),
            submission_update: "AtomSubmissionState.onNext".into(),
            get_self: "Network.getSelf".into(),
            get_live_peers: "Network.getLivePeers".into(),
            get_atoms: "Ledger.getAtoms".into(),
        }
    }
}

impl ProtocolConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let names = [
            ("atoms_subscribe", &self.atoms_subscribe),
            ("atoms_update", &self.atoms_update),
            ("subscription_cancel", &self.subscription_cancel),
            ("submit_atom", &self.submit_atom),
            ("submission_update", &self.submission_update),
            ("get_self", &self.get_self),
            ("get_live_peers", &self.get_live_peers),
            ("get_atoms", &self.get_atoms),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "protocol.{} cannot be empty",
                    field
                )));
            }
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read {path}: {error}")]
    Io { path: String, error: String },
    /// Config file is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(String),
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for crate::domain::error::ClientError {
    fn from(e: ConfigError) -> Self {
        crate::domain::error::ClientError::Config(e.to_string())
    }
}

/// Humantime serde module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    fn format_duration(duration: &Duration) -> String {
        if duration.subsec_millis() == 0 {
            format!("{}s", duration.as_secs())
        } else {
            format!("{}ms", duration.as_millis())
        }
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .ok()
                .and_then(|m| m.checked_mul(60))
                .map(Duration::from_secs)
                .ok_or("invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => serializer.serialize_some(&super::format_duration(d)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s = Option::<String>::deserialize(deserializer)?;
            s.map(|s| super::parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
