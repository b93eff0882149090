//! Fan-out of broker messages to dashboard sessions
//!
//! One [`Broadcaster`] task consumes the MQTT link's inbound channel in
//! order. For each message it encodes a single envelope, serializes it
//! once, and offers the shared frame to every registered session without
//! ever waiting on one: a full queue drops the frame for that session only,
//! and a session that stays full for too long is evicted.
//!
//! Because a single task handles the messages sequentially and each session
//! queue is FIFO, every session sees the messages of a topic in broker
//! order (a lagging session may miss some, it never sees them reordered).

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::envelope::Envelope;
use crate::error::{BridgeError, Result};
use crate::registry::{ClientRegistry, ClientSession, Frame, Offer};
use crate::stats::BridgeStats;

/// A message received from the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic the message was published on
    pub topic: String,
    /// Raw payload bytes
    pub payload: Bytes,
}

impl InboundMessage {
    /// Create an inbound message
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Outcome of delivering one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Sessions the frame was queued for
    pub delivered: usize,
    /// Sessions whose queue was full
    pub lagged: usize,
    /// Sessions removed during this delivery
    pub evicted: usize,
    /// Sessions already unregistered when reached
    pub skipped: usize,
}

/// Delivers broker messages to every registered session
pub struct Broadcaster {
    registry: Arc<ClientRegistry>,
    stats: Arc<BridgeStats>,
    max_lagged_frames: u64,
}

impl Broadcaster {
    /// Create a broadcaster
    ///
    /// A session is evicted once `max_lagged_frames` consecutive frames
    /// could not be queued for it.
    pub fn new(
        registry: Arc<ClientRegistry>,
        stats: Arc<BridgeStats>,
        max_lagged_frames: u64,
    ) -> Self {
        Self {
            registry,
            stats,
            max_lagged_frames: max_lagged_frames.max(1),
        }
    }

    /// Run until the inbound channel closes
    pub async fn run(self, mut inbound: mpsc::Receiver<InboundMessage>) {
        info!("Broadcaster started");
        while let Some(message) = inbound.recv().await {
            if let Ok(report) = self.broadcast(&message) {
                trace!(
                    "Broadcast {}: delivered={}, lagged={}, evicted={}",
                    message.topic,
                    report.delivered,
                    report.lagged,
                    report.evicted
                );
            }
        }
        info!("Broadcaster stopped: inbound channel closed");
    }

    /// Encode one broker message and deliver it
    ///
    /// Fails only when the payload cannot be encoded; the message is then
    /// dropped for everyone.
    pub fn broadcast(&self, message: &InboundMessage) -> Result<DeliveryReport> {
        self.stats.record_mqtt_message();

        let envelope = match Envelope::encode(&message.topic, &message.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping MQTT message: {}", e);
                self.stats.encoding_error();
                return Err(e);
            }
        };

        debug!(
            "MQTT message on {} ({} bytes)",
            message.topic,
            message.payload.len()
        );

        let frame: Frame = Arc::from(envelope.to_frame());
        Ok(self.deliver(&frame))
    }

    /// Offer a serialized frame to every session in the current snapshot
    pub fn deliver(&self, frame: &Frame) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for session in self.registry.snapshot() {
            match session.offer(frame) {
                Offer::Queued => report.delivered += 1,
                Offer::Lagged(consecutive) => {
                    report.lagged += 1;
                    if consecutive >= self.max_lagged_frames {
                        let reason = format!("{} consecutive frames dropped", consecutive);
                        if self.evict(&session, reason) {
                            report.evicted += 1;
                        }
                    }
                }
                Offer::Closed => {
                    let err = BridgeError::SessionWrite {
                        session: session.id(),
                        reason: "writer closed".to_string(),
                    };
                    if self.evict(&session, err.to_string()) {
                        report.evicted += 1;
                    } else {
                        report.skipped += 1;
                    }
                }
            }
        }

        self.stats.add_delivered(report.delivered as u64);
        self.stats.add_lagged(report.lagged as u64);
        report
    }

    fn evict(&self, session: &ClientSession, reason: String) -> bool {
        match self.registry.unregister(&session.id()) {
            Some(_) => {
                warn!("Evicting session {}: {}", session.label(), reason);
                self.stats.session_evicted();
                true
            }
            // Removed concurrently, nothing to do
            None => false,
        }
    }
}
