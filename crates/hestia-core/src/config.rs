//! Configuration types for the bridge
//!
//! Configuration is read from an optional TOML file; every section and
//! field has a default so an empty file (or no file) yields a bridge that
//! connects to a local broker and serves the home dashboard topics.
//! Durations use humantime syntax (`"30s"`, `"10m"`).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{BridgeError, Result};
use crate::topic::{SubscriptionSet, TopicFilter};

/// Default MQTT broker port
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default WebSocket listen address
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:9002";

/// Default per-session outbound queue size
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default number of consecutive dropped frames before a session is evicted
pub const DEFAULT_MAX_LAGGED_FRAMES: u64 = 512;

/// Default MQTT keep-alive
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 30;

/// Longest accepted reconnect delay
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Longest keep-alive the MQTT CONNECT packet can carry
pub const MAX_KEEP_ALIVE: Duration = Duration::from_secs(u16::MAX as u64);

/// Main bridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Broker connection and subscriptions
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Broker reconnection behavior
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// WebSocket / HTTP server
    #[serde(default)]
    pub server: ServerConfig,

    /// Per-session limits
    #[serde(default)]
    pub session: SessionConfig,
}

impl BridgeConfig {
    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: BridgeConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.mqtt.host.trim().is_empty() {
            return Err(BridgeError::InvalidConfig("mqtt.host is empty".to_string()));
        }
        if self.mqtt.port == 0 {
            return Err(BridgeError::InvalidConfig("mqtt.port is 0".to_string()));
        }
        if self.mqtt.topics.is_empty() {
            return Err(BridgeError::InvalidConfig(
                "mqtt.topics must list at least one filter".to_string(),
            ));
        }
        for (name, qos) in [
            ("mqtt.subscribe_qos", self.mqtt.subscribe_qos),
            ("mqtt.publish_qos", self.mqtt.publish_qos),
        ] {
            if qos > 2 {
                return Err(BridgeError::InvalidConfig(format!(
                    "{} must be 0, 1 or 2 (got {})",
                    name, qos
                )));
            }
        }
        if self.mqtt.keep_alive < Duration::from_secs(1) {
            return Err(BridgeError::InvalidConfig(
                "mqtt.keep_alive must be at least 1s".to_string(),
            ));
        }
        if self.mqtt.keep_alive > MAX_KEEP_ALIVE {
            return Err(BridgeError::InvalidConfig(format!(
                "mqtt.keep_alive must be at most {}s",
                MAX_KEEP_ALIVE.as_secs()
            )));
        }
        if self.mqtt.channel_capacity == 0 {
            return Err(BridgeError::InvalidConfig(
                "mqtt.channel_capacity must be positive".to_string(),
            ));
        }
        if self.mqtt.username.is_none() && self.mqtt.password.is_some() {
            return Err(BridgeError::InvalidConfig(
                "mqtt.password is set without mqtt.username".to_string(),
            ));
        }
        if self.reconnect.initial_delay > self.reconnect.max_delay {
            return Err(BridgeError::InvalidConfig(
                "reconnect.initial_delay exceeds reconnect.max_delay".to_string(),
            ));
        }
        if self.reconnect.max_delay > MAX_RECONNECT_DELAY {
            return Err(BridgeError::InvalidConfig(
                "reconnect.max_delay must be at most 24h".to_string(),
            ));
        }
        if self.session.queue_capacity == 0 {
            return Err(BridgeError::InvalidConfig(
                "session.queue_capacity must be positive".to_string(),
            ));
        }
        if self.session.max_lagged_frames == 0 {
            return Err(BridgeError::InvalidConfig(
                "session.max_lagged_frames must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// MQTT broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host name or address
    #[serde(default = "default_host")]
    pub host: String,

    /// Broker port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Client id prefix; a random suffix is appended per process
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,

    /// Optional username
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password
    #[serde(default)]
    pub password: Option<String>,

    /// Keep-alive interval
    #[serde(with = "humantime_serde", default = "default_keep_alive")]
    pub keep_alive: Duration,

    /// QoS used for subscriptions (0, 1 or 2)
    #[serde(default)]
    pub subscribe_qos: u8,

    /// QoS used for publishes (0, 1 or 2)
    #[serde(default = "default_publish_qos")]
    pub publish_qos: u8,

    /// Capacity of the MQTT client's request queue and of the inbound
    /// message channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Subscription filters
    #[serde(default = "default_topics")]
    pub topics: Vec<TopicFilter>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_mqtt_port() -> u16 {
    DEFAULT_MQTT_PORT
}

fn default_client_id_prefix() -> String {
    "hestia-bridge".to_string()
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(DEFAULT_KEEP_ALIVE_SECS)
}

fn default_publish_qos() -> u8 {
    1
}

fn default_channel_capacity() -> usize {
    64
}

fn default_topics() -> Vec<TopicFilter> {
    SubscriptionSet::default().iter().cloned().collect()
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_MQTT_PORT,
            client_id_prefix: default_client_id_prefix(),
            username: None,
            password: None,
            keep_alive: default_keep_alive(),
            subscribe_qos: 0,
            publish_qos: default_publish_qos(),
            channel_capacity: default_channel_capacity(),
            topics: default_topics(),
        }
    }
}

impl MqttConfig {
    /// The configured filters as a deduplicated set
    pub fn subscriptions(&self) -> SubscriptionSet {
        SubscriptionSet::new(self.topics.iter().cloned())
    }

    /// A fresh client id: `<prefix>-<uuid>`
    pub fn generate_client_id(&self) -> String {
        format!("{}-{}", self.client_id_prefix, Uuid::new_v4().simple())
    }
}

/// Reconnection behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt
    #[serde(with = "humantime_serde", default = "default_initial_delay")]
    pub initial_delay: Duration,

    /// Maximum delay between reconnection attempts
    #[serde(with = "humantime_serde", default = "default_max_delay")]
    pub max_delay: Duration,

    /// Maximum number of consecutive failed attempts (0 = infinite)
    #[serde(default)]
    pub max_attempts: u32,
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            max_attempts: 0, // Infinite
        }
    }
}

/// WebSocket / HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Display name reported by `/api/info`
    #[serde(default = "default_name")]
    pub name: String,
}

fn default_listen() -> SocketAddr {
    DEFAULT_LISTEN_ADDR
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 9002)))
}

fn default_name() -> String {
    "hestia".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            name: default_name(),
        }
    }
}

/// Per-session limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Frames buffered per session before it counts as lagging
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Consecutive dropped frames before the session is evicted
    #[serde(default = "default_max_lagged_frames")]
    pub max_lagged_frames: u64,

    /// Close sessions that send nothing for this long
    #[serde(with = "humantime_serde_opt", default)]
    pub idle_timeout: Option<Duration>,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_max_lagged_frames() -> u64 {
    DEFAULT_MAX_LAGGED_FRAMES
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_lagged_frames: DEFAULT_MAX_LAGGED_FRAMES,
            idle_timeout: None,
        }
    }
}

/// Builder for BridgeConfig
#[derive(Debug, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: BridgeConfig) -> Self {
        Self { config }
    }

    /// Set broker host and port
    pub fn broker(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.mqtt.host = host.into();
        self.config.mqtt.port = port;
        self
    }

    /// Set broker host only
    pub fn broker_host(mut self, host: impl Into<String>) -> Self {
        self.config.mqtt.host = host.into();
        self
    }

    /// Set broker port only
    pub fn broker_port(mut self, port: u16) -> Self {
        self.config.mqtt.port = port;
        self
    }

    /// Set broker credentials
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.mqtt.username = Some(username.into());
        self.config.mqtt.password = Some(password.into());
        self
    }

    /// Set the username only
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.mqtt.username = Some(username.into());
        self
    }

    /// Set the password only
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.mqtt.password = Some(password.into());
        self
    }

    /// Replace the subscription filters
    pub fn topics(mut self, topics: Vec<TopicFilter>) -> Self {
        self.config.mqtt.topics = topics;
        self
    }

    /// Set the listen address
    pub fn listen(mut self, addr: SocketAddr) -> Self {
        self.config.server.listen = addr;
        self
    }

    /// Set per-session queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.session.queue_capacity = capacity;
        self
    }

    /// Set the idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.session.idle_timeout = Some(timeout);
        self
    }

    /// Set reconnect limits
    pub fn reconnect(mut self, initial_delay: Duration, max_delay: Duration) -> Self {
        self.config.reconnect.initial_delay = initial_delay;
        self.config.reconnect.max_delay = max_delay;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<BridgeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// Custom serde module for Duration with humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

mod humantime_serde_opt {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_str(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        s.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
