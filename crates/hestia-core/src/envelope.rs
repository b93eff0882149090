//! Envelope codec
//!
//! The dashboard speaks a single JSON shape in both directions:
//!
//! ```text
//! {"topic":"regulator/regulate_radiator","raw_message":"{\"tc_salon_1\":21.5}"}
//! ```
//!
//! `raw_message` carries the MQTT payload as text. It is usually JSON, but
//! the bridge never parses it: the bytes published by a sensor are the bytes
//! the browser receives, and the text a browser sends is the exact payload
//! published to the broker.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::topic::validate_publish_topic;

/// JSON wrapper carrying one MQTT message across the WebSocket boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// MQTT topic
    pub topic: String,
    /// MQTT payload as text
    pub raw_message: String,
}

impl Envelope {
    /// Create an envelope from already-decoded text
    pub fn new(topic: impl Into<String>, raw_message: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            raw_message: raw_message.into(),
        }
    }

    /// Wrap an inbound MQTT message
    ///
    /// Fails with [`BridgeError::PayloadEncoding`] when the payload is not
    /// UTF-8; the bytes are never replaced or escaped.
    pub fn encode(topic: &str, payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload).map_err(|e| BridgeError::PayloadEncoding {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(topic, text))
    }

    /// Parse a frame received from a dashboard client
    ///
    /// The frame must be a JSON object with a non-empty string `topic` and a
    /// string `raw_message`. Extra fields are ignored.
    pub fn decode(frame: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(frame)?;
        // Derived structs also accept JSON arrays; only objects are envelopes
        if !value.is_object() {
            return Err(BridgeError::MalformedEnvelope(
                "expected a JSON object".to_string(),
            ));
        }
        let envelope: Envelope = serde_json::from_value(value)?;
        if envelope.topic.is_empty() {
            return Err(BridgeError::MalformedEnvelope(
                "topic must not be empty".to_string(),
            ));
        }
        Ok(envelope)
    }

    /// Parse a client frame that is about to be published
    ///
    /// Same as [`Envelope::decode`] but also rejects wildcard topics, which
    /// the broker would refuse.
    pub fn decode_command(frame: &str) -> Result<Self> {
        let envelope = Self::decode(frame)?;
        validate_publish_topic(&envelope.topic)?;
        Ok(envelope)
    }

    /// Serialize to the text frame sent to clients
    pub fn to_frame(&self) -> String {
        // Two string fields cannot fail to serialize
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Split into the topic and the exact payload bytes to publish
    pub fn into_parts(self) -> (String, Bytes) {
        (self.topic, Bytes::from(self.raw_message.into_bytes()))
    }
}
