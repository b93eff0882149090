//! Outbound side of the MQTT link
//!
//! The relay publishes through this trait so that it does not depend on a
//! particular MQTT client; `hestia-mqtt` provides the real implementation
//! and [`crate::test_utils::MockPublisher`] a recording one.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::fmt;

use crate::error::Result;

/// Connection state of the MQTT link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// First connection in progress
    Connecting,
    /// Connected and subscribed
    Connected,
    /// Connection lost, backing off before the next attempt
    Reconnecting,
    /// Reconnect attempts exhausted
    Failed,
}

impl LinkState {
    /// True if publishes can be accepted
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::Connected => write!(f, "connected"),
            LinkState::Reconnecting => write!(f, "reconnecting"),
            LinkState::Failed => write!(f, "failed"),
        }
    }
}

/// Something that can publish to the broker
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `payload` on `topic`
    ///
    /// Must fail fast with [`crate::BridgeError::BrokerUnavailable`] while
    /// the link is down rather than queueing.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()>;

    /// Current link state
    fn link_state(&self) -> LinkState;
}
