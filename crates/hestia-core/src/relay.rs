//! Dashboard command relay
//!
//! Frames sent by a dashboard are decoded as envelopes and their
//! `raw_message` published verbatim on `topic`. Nothing a client sends can
//! close its own session: bad frames and refused publishes are logged,
//! counted and dropped.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::envelope::Envelope;
use crate::error::{BridgeError, Result};
use crate::publisher::Publisher;
use crate::registry::ClientSession;
use crate::stats::BridgeStats;

/// Publishes client command envelopes to the broker
#[derive(Clone)]
pub struct CommandRelay {
    publisher: Arc<dyn Publisher>,
    stats: Arc<BridgeStats>,
}

impl CommandRelay {
    /// Create a relay publishing through `publisher`
    pub fn new(publisher: Arc<dyn Publisher>, stats: Arc<BridgeStats>) -> Self {
        Self { publisher, stats }
    }

    /// The publisher commands go through
    pub fn publisher(&self) -> &Arc<dyn Publisher> {
        &self.publisher
    }

    /// Handle one text frame from `session`
    ///
    /// The error is returned for the caller's benefit only; it has already
    /// been logged and must not close the session.
    pub async fn handle_frame(&self, session: &ClientSession, frame: &str) -> Result<()> {
        let envelope = match Envelope::decode_command(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    "Dropping frame from session {}: {} - raw: {}",
                    session.label(),
                    e,
                    truncate(frame, 200)
                );
                self.stats.malformed_command();
                return Err(e);
            }
        };

        info!(
            "Session {} -> MQTT topic={} message={}",
            session.label(),
            envelope.topic,
            truncate(&envelope.raw_message, 200)
        );

        let (topic, payload) = envelope.into_parts();
        match self.publisher.publish(&topic, payload).await {
            Ok(()) => {
                self.stats.command_relayed();
                Ok(())
            }
            Err(e) => {
                warn!(
                    "Command from session {} to {} not published: {}",
                    session.label(),
                    topic,
                    e
                );
                self.stats.publish_rejected();
                Err(e)
            }
        }
    }

    /// Handle a binary frame; accepted only if it holds UTF-8 text
    pub async fn handle_binary(&self, session: &ClientSession, data: &[u8]) -> Result<()> {
        match std::str::from_utf8(data) {
            Ok(text) => self.handle_frame(session, text).await,
            Err(e) => {
                debug!(
                    "Dropping {} byte binary frame from session {}",
                    data.len(),
                    session.label()
                );
                self.stats.malformed_command();
                Err(BridgeError::MalformedEnvelope(format!(
                    "binary frame is not UTF-8: {}",
                    e
                )))
            }
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
