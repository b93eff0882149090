//! Hestia Node - MQTT to WebSocket bridge server
//!
//! Serves the home dashboard:
//! - WebSocket endpoint relaying MQTT messages to every browser session
//! - Commands from the dashboard published back to the broker
//! - REST API for health, bridge info and statistics

pub mod server;

use std::sync::Arc;
use std::time::Instant;

use hestia_core::{BridgeConfig, BridgeStats, ClientRegistry, CommandRelay, Publisher, SessionConfig};

/// Application state shared across handlers
pub struct AppState {
    /// Connected dashboard sessions
    pub registry: Arc<ClientRegistry>,
    /// Publishes dashboard commands to the broker
    pub relay: CommandRelay,
    /// Bridge counters
    pub stats: Arc<BridgeStats>,
    /// Per-session limits
    pub session: SessionConfig,
    /// Bridge start time
    pub start_time: Instant,
    /// Display name
    pub name: String,
    /// MQTT client id
    pub client_id: String,
    /// Subscribed topic filters
    pub subscribed_topics: Vec<String>,
}

impl AppState {
    /// Build state for `config`, publishing through `publisher`
    pub fn new(
        config: &BridgeConfig,
        registry: Arc<ClientRegistry>,
        stats: Arc<BridgeStats>,
        publisher: Arc<dyn Publisher>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            relay: CommandRelay::new(publisher, stats.clone()),
            stats,
            session: config.session.clone(),
            start_time: Instant::now(),
            name: config.server.name.clone(),
            client_id: client_id.into(),
            subscribed_topics: config
                .mqtt
                .subscriptions()
                .iter()
                .map(|filter| filter.to_string())
                .collect(),
        }
    }
}
