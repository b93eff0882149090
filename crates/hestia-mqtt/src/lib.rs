//! MQTT broker link for the Hestia bridge
//!
//! Wraps a rumqttc [`rumqttc::AsyncClient`] behind the
//! [`hestia_core::Publisher`] trait and drives its event loop:
//!
//! - subscribes to every configured filter on each CONNACK
//! - forwards inbound PUBLISH packets as [`hestia_core::InboundMessage`]s
//! - reconnects with capped exponential [`Backoff`]
//! - refuses publishes immediately while disconnected
//! - discards publishes stranded by a lost connection
//!
//! ```rust,ignore
//! let (inbound_tx, inbound_rx) = tokio::sync::mpsc::channel(64);
//! let (link, driver) = MqttLink::new(&config, inbound_tx, stats.clone())?;
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! tokio::spawn(driver.run(shutdown_rx));
//! ```

#![warn(missing_docs)]

pub mod backoff;
pub mod link;

pub use backoff::Backoff;
pub use link::{qos_from_level, LinkDriver, MqttLink};
