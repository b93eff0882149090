//! Core of the Hestia MQTT ⇄ WebSocket bridge
//!
//! Home dashboards cannot speak MQTT, so the bridge subscribes to the home
//! automation topics on their behalf and forwards every message to every
//! connected browser session, wrapped in a small JSON envelope. Dashboards
//! send the same envelope back to have a command published to the broker.
//!
//! # Architecture
//!
//! This crate holds everything that does not touch a socket:
//!
//! 1. **Envelope** - `{"topic": ..., "raw_message": ...}` codec
//! 2. **Topics** - subscription filters with `+` / `#` wildcards
//! 3. **Registry** - live dashboard sessions and their outbound queues
//! 4. **Broadcast** - fan-out of broker messages to every session
//! 5. **Relay** - dashboard commands to broker publishes
//!
//! The MQTT link lives in `hestia-mqtt` and the HTTP/WebSocket server in
//! `hestia-node`; they meet here through the [`Publisher`] trait and the
//! [`InboundMessage`] channel.
//!
//! # Message Flow
//!
//! ## MQTT → dashboards
//!
//! 1. The MQTT link receives a PUBLISH on a subscribed topic
//! 2. It sends an [`InboundMessage`] to the [`Broadcaster`]
//! 3. The payload is encoded once into an [`Envelope`] frame
//! 4. The frame is offered to every [`ClientSession`] without waiting
//!
//! ## Dashboards → MQTT
//!
//! 1. A session's reader receives a text frame
//! 2. [`CommandRelay`] decodes it as an [`Envelope`]
//! 3. `raw_message` is published verbatim on `topic`
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use hestia_core::{Broadcaster, BridgeStats, ClientRegistry, ClientSession, InboundMessage};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(ClientRegistry::new());
//! let stats = Arc::new(BridgeStats::new());
//! let broadcaster = Broadcaster::new(registry.clone(), stats, 512);
//!
//! let (session, mut rx) = ClientSession::new(None, 256);
//! registry.register(session);
//!
//! broadcaster.broadcast(&InboundMessage::new("zigbee2mqtt/ts_salon_1", "{}"))?;
//! let frame = rx.recv().await;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod broadcast;
pub mod config;
pub mod envelope;
pub mod error;
pub mod publisher;
pub mod registry;
pub mod relay;
pub mod stats;
pub mod topic;

// Testing utilities
pub mod test_utils;

pub use broadcast::{Broadcaster, DeliveryReport, InboundMessage};
pub use config::{
    BridgeConfig, BridgeConfigBuilder, MqttConfig, ReconnectConfig, ServerConfig, SessionConfig,
};
pub use envelope::Envelope;
pub use error::{BridgeError, Result};
pub use publisher::{LinkState, Publisher};
pub use registry::{ClientRegistry, ClientSession, Frame, Offer, SessionId};
pub use relay::CommandRelay;
pub use stats::{BridgeStats, StatsSnapshot};
pub use topic::{SubscriptionSet, TopicFilter, DEFAULT_TOPICS};

pub use config::{
    DEFAULT_LISTEN_ADDR, DEFAULT_MAX_LAGGED_FRAMES, DEFAULT_MQTT_PORT, DEFAULT_QUEUE_CAPACITY,
    MAX_KEEP_ALIVE, MAX_RECONNECT_DELAY,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
