//! Error types for bridge operations
//!
//! Every error raised while moving a message between the MQTT broker and
//! the dashboard sessions is one of these variants. Errors local to a
//! single message or session are logged and contained by the caller; only
//! [`BridgeError::BrokerUnavailable`] changes what the bridge can do.

use thiserror::Error;

use crate::registry::SessionId;

/// Main error type for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    // ===== Broker Errors =====
    /// MQTT link is not connected (or gave up reconnecting)
    #[error("MQTT broker unavailable")]
    BrokerUnavailable,

    /// MQTT client refused the publish request
    #[error("Failed to publish to {topic}: {reason}")]
    PublishFailed {
        /// Target topic
        topic: String,
        /// Failure reason
        reason: String,
    },

    // ===== Codec Errors =====
    /// Client frame is not a `{topic, raw_message}` object
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// MQTT payload is not valid UTF-8 text
    #[error("Payload on {topic} is not valid UTF-8: {reason}")]
    PayloadEncoding {
        /// Topic the payload arrived on
        topic: String,
        /// Decoder error
        reason: String,
    },

    /// Subscription filter is not a valid MQTT topic filter
    #[error("Invalid topic filter: {0}")]
    InvalidTopicFilter(String),

    // ===== Session Errors =====
    /// Delivery to one session failed
    #[error("Write to session {session} failed: {reason}")]
    SessionWrite {
        /// Session that failed
        session: SessionId,
        /// Failure reason
        reason: String,
    },

    /// Session was already unregistered
    #[error("Session {0} is closed")]
    SessionClosed(SessionId),

    // ===== Configuration Errors =====
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ===== General Errors =====
    /// Channel closed
    #[error("Channel closed")]
    ChannelClosed,

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Check if retrying later may succeed
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            BridgeError::BrokerUnavailable | BridgeError::PublishFailed { .. }
        )
    }

    /// Check if this error was caused by bad data rather than a bad connection
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            BridgeError::MalformedEnvelope(_)
                | BridgeError::PayloadEncoding { .. }
                | BridgeError::InvalidTopicFilter(_)
        )
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            BridgeError::BrokerUnavailable => "BROKER_UNAVAILABLE",
            BridgeError::PublishFailed { .. } => "PUBLISH_FAILED",
            BridgeError::MalformedEnvelope(_) => "MALFORMED_ENVELOPE",
            BridgeError::PayloadEncoding { .. } => "PAYLOAD_ENCODING",
            BridgeError::InvalidTopicFilter(_) => "INVALID_TOPIC_FILTER",
            BridgeError::SessionWrite { .. } => "SESSION_WRITE",
            BridgeError::SessionClosed(_) => "SESSION_CLOSED",
            BridgeError::InvalidConfig(_) => "INVALID_CONFIG",
            BridgeError::ChannelClosed => "CHANNEL_CLOSED",
            BridgeError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::MalformedEnvelope(err.to_string())
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        BridgeError::InvalidConfig(err.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for BridgeError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        BridgeError::ChannelClosed
    }
}
