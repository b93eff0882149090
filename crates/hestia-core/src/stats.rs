//! Bridge counters

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the broadcaster, relay, link and server
///
/// Counts are plain atomics; the last message time sits behind a mutex.
#[derive(Debug, Default)]
pub struct BridgeStats {
    mqtt_messages_received: AtomicU64,
    frames_delivered: AtomicU64,
    frames_lagged: AtomicU64,
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    sessions_evicted: AtomicU64,
    encoding_errors: AtomicU64,
    commands_relayed: AtomicU64,
    malformed_commands: AtomicU64,
    publishes_rejected: AtomicU64,
    last_message_at: Mutex<Option<DateTime<Utc>>>,
}

/// Point-in-time copy of [`BridgeStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Messages received from the broker
    pub mqtt_messages_received: u64,
    /// Frames queued to sessions
    pub frames_delivered: u64,
    /// Frames dropped for a lagging session
    pub frames_lagged: u64,
    /// Sessions accepted
    pub sessions_opened: u64,
    /// Sessions ended, for any reason
    pub sessions_closed: u64,
    /// Sessions removed by the broadcaster (slow or broken)
    pub sessions_evicted: u64,
    /// MQTT payloads that were not UTF-8
    pub encoding_errors: u64,
    /// Client commands published to the broker
    pub commands_relayed: u64,
    /// Client frames that were not valid envelopes
    pub malformed_commands: u64,
    /// Publishes refused by the link or discarded on connection loss
    pub publishes_rejected: u64,
    /// Time of the last broker message
    pub last_message_at: Option<DateTime<Utc>>,
}

macro_rules! counter {
    ($inc:ident, $field:ident) => {
        #[doc = concat!("Increment `", stringify!($field), "`")]
        pub fn $inc(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl BridgeStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a broker message and remember when it arrived
    pub fn record_mqtt_message(&self) {
        self.mqtt_messages_received.fetch_add(1, Ordering::Relaxed);
        *self.last_message_at.lock() = Some(Utc::now());
    }

    /// Add delivered frames
    pub fn add_delivered(&self, n: u64) {
        self.frames_delivered.fetch_add(n, Ordering::Relaxed);
    }

    /// Add lagged frames
    pub fn add_lagged(&self, n: u64) {
        self.frames_lagged.fetch_add(n, Ordering::Relaxed);
    }

    /// Add publishes the link refused or discarded
    pub fn add_rejected(&self, n: u64) {
        self.publishes_rejected.fetch_add(n, Ordering::Relaxed);
    }

    counter!(session_opened, sessions_opened);
    counter!(session_closed, sessions_closed);
    counter!(session_evicted, sessions_evicted);
    counter!(encoding_error, encoding_errors);
    counter!(command_relayed, commands_relayed);
    counter!(malformed_command, malformed_commands);
    counter!(publish_rejected, publishes_rejected);

    /// Copy the current values
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            mqtt_messages_received: self.mqtt_messages_received.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            frames_lagged: self.frames_lagged.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            sessions_evicted: self.sessions_evicted.load(Ordering::Relaxed),
            encoding_errors: self.encoding_errors.load(Ordering::Relaxed),
            commands_relayed: self.commands_relayed.load(Ordering::Relaxed),
            malformed_commands: self.malformed_commands.load(Ordering::Relaxed),
            publishes_rejected: self.publishes_rejected.load(Ordering::Relaxed),
            last_message_at: *self.last_message_at.lock(),
        }
    }
}
