//! Broker link
//!
//! [`MqttLink`] is the cheap, cloneable publishing side; [`LinkDriver`] owns
//! the rumqttc event loop and must be spawned for anything to happen. The
//! driver forwards every inbound PUBLISH to the broadcaster channel in
//! broker order, re-subscribes after each CONNACK and backs off between
//! reconnection attempts. Publishes still queued or unacknowledged when the
//! connection drops are discarded, never replayed on the next session.

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{
    AsyncClient, ConnAck, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, Request, SubAck,
    SubscribeFilter, SubscribeReasonCode,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use hestia_core::{
    BridgeConfig, BridgeError, BridgeStats, InboundMessage, LinkState, Publisher, Result,
    SubscriptionSet,
};

use crate::backoff::Backoff;

/// How long a clean disconnect may take on shutdown
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Map a configured QoS level to the rumqttc type
pub fn qos_from_level(level: u8) -> Result<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(BridgeError::InvalidConfig(format!(
            "QoS must be 0, 1 or 2 (got {})",
            other
        ))),
    }
}

/// Publishing handle for the broker connection
#[derive(Clone)]
pub struct MqttLink {
    client: AsyncClient,
    state: watch::Receiver<LinkState>,
    publish_qos: QoS,
    client_id: String,
}

impl MqttLink {
    /// Build the link and its driver
    ///
    /// Inbound messages are sent on `inbound`. Publishes discarded on
    /// connection loss are counted in `stats`. Nothing touches the network
    /// until [`LinkDriver::run`] is polled.
    pub fn new(
        config: &BridgeConfig,
        inbound: mpsc::Sender<InboundMessage>,
        stats: Arc<BridgeStats>,
    ) -> Result<(Self, LinkDriver)> {
        let mqtt = &config.mqtt;
        let client_id = mqtt.generate_client_id();
        let publish_qos = qos_from_level(mqtt.publish_qos)?;
        let subscribe_qos = qos_from_level(mqtt.subscribe_qos)?;

        let mut options = MqttOptions::new(client_id.clone(), mqtt.host.clone(), mqtt.port);
        options.set_keep_alive(mqtt.keep_alive);
        options.set_clean_session(true);
        if let Some(username) = &mqtt.username {
            options.set_credentials(
                username.clone(),
                mqtt.password.clone().unwrap_or_default(),
            );
        }

        let (client, eventloop) = AsyncClient::new(options, mqtt.channel_capacity);
        let (state_tx, state_rx) = watch::channel(LinkState::Connecting);

        let link = Self {
            client: client.clone(),
            state: state_rx,
            publish_qos,
            client_id: client_id.clone(),
        };
        let driver = LinkDriver {
            client,
            eventloop,
            state: state_tx,
            subscriptions: mqtt.subscriptions(),
            subscribe_qos,
            backoff: Backoff::new(&config.reconnect),
            inbound,
            stats,
            broker: format!("{}:{}", mqtt.host, mqtt.port),
            client_id,
        };
        Ok((link, driver))
    }

    /// Client id presented to the broker
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Watch link state changes
    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.state.clone()
    }
}

#[async_trait]
impl Publisher for MqttLink {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        let state = *self.state.borrow();
        if !state.is_connected() {
            warn!("MQTT link is {}, refusing publish to {}", state, topic);
            return Err(BridgeError::BrokerUnavailable);
        }
        // try_publish never waits on the event loop; a full request queue
        // surfaces as an error instead of stalling the session reader
        self.client
            .try_publish(topic, self.publish_qos, false, payload.to_vec())
            .map_err(|e| BridgeError::PublishFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
        debug!("Queued publish to {} ({} bytes)", topic, payload.len());
        Ok(())
    }

    fn link_state(&self) -> LinkState {
        *self.state.borrow()
    }
}

/// Owns the MQTT event loop
pub struct LinkDriver {
    client: AsyncClient,
    eventloop: EventLoop,
    state: watch::Sender<LinkState>,
    subscriptions: SubscriptionSet,
    subscribe_qos: QoS,
    backoff: Backoff,
    inbound: mpsc::Sender<InboundMessage>,
    stats: Arc<BridgeStats>,
    broker: String,
    client_id: String,
}

impl LinkDriver {
    /// Drive the connection until shutdown
    ///
    /// Returns `Ok(())` when `shutdown` fires (or its sender is dropped) or
    /// the inbound receiver goes away, and `BrokerUnavailable` once reconnect
    /// attempts are exhausted.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            "MQTT link starting: broker={}, client_id={}, {} subscription(s)",
            self.broker,
            self.client_id,
            self.subscriptions.len()
        );

        loop {
            let event = tokio::select! {
                event = self.eventloop.poll() => event,
                _ = shutdown.changed() => {
                    self.disconnect().await;
                    return Ok(());
                }
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => self.on_connected(&ack),
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if !self.subscriptions.matches(&publish.topic) {
                        debug!("Message on unsubscribed topic {}", publish.topic);
                    }
                    let message = InboundMessage::new(publish.topic, publish.payload);
                    if self.inbound.send(message).await.is_err() {
                        info!("Inbound channel closed, stopping MQTT link");
                        self.disconnect().await;
                        return Ok(());
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => self.on_suback(&ack),
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("Broker {} sent DISCONNECT", self.broker);
                }
                Ok(_) => {}
                Err(e) => {
                    self.discard_pending();
                    if self.backoff.is_exhausted() {
                        error!(
                            "MQTT broker {} unreachable after {} attempts: {}",
                            self.broker,
                            self.backoff.attempts(),
                            e
                        );
                        self.set_state(LinkState::Failed);
                        return Err(BridgeError::BrokerUnavailable);
                    }

                    let delay = self.backoff.next_delay();
                    warn!(
                        "MQTT connection error: {} (attempt {}), retrying in {:?}",
                        e,
                        self.backoff.attempts(),
                        delay
                    );
                    if *self.state.borrow() != LinkState::Connecting {
                        self.set_state(LinkState::Reconnecting);
                    }

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => return Ok(()),
                    }
                }
            }
        }
    }

    fn on_connected(&mut self, ack: &ConnAck) {
        info!(
            "Connected to MQTT broker {} (session_present={})",
            self.broker, ack.session_present
        );
        self.backoff.reset();
        self.set_state(LinkState::Connected);

        let filters: Vec<SubscribeFilter> = self
            .subscriptions
            .iter()
            .map(|filter| SubscribeFilter::new(filter.to_string(), self.subscribe_qos))
            .collect();
        match self.client.try_subscribe_many(filters) {
            Ok(()) => {
                for filter in self.subscriptions.iter() {
                    debug!("Subscribing to {}", filter);
                }
            }
            Err(e) => error!("Failed to subscribe: {}", e),
        }
    }

    fn on_suback(&self, ack: &SubAck) {
        let failed = ack
            .return_codes
            .iter()
            .filter(|code| matches!(code, SubscribeReasonCode::Failure))
            .count();
        if failed > 0 {
            warn!(
                "Broker rejected {} of {} subscription(s)",
                failed,
                ack.return_codes.len()
            );
        } else {
            info!("Subscribed to {} topic filter(s)", ack.return_codes.len());
        }
    }

    /// Drop requests rumqttc kept for replay on the next session
    ///
    /// Subscriptions are re-issued on CONNACK and stale commands are never
    /// sent, so the whole queue goes.
    fn discard_pending(&mut self) {
        let pending = std::mem::take(&mut self.eventloop.pending);
        let dropped = pending
            .iter()
            .filter(|request| matches!(request, Request::Publish(_)))
            .count();
        if dropped > 0 {
            warn!(
                "Dropping {} publish(es) left unsent or unacknowledged by the lost connection",
                dropped
            );
            self.stats.add_rejected(dropped as u64);
        }
    }

    fn set_state(&self, state: LinkState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("MQTT link {} -> {}", previous, state);
        }
    }

    async fn disconnect(&mut self) {
        let connected = self.state.borrow().is_connected();
        self.set_state(LinkState::Failed);
        if !connected || self.client.try_disconnect().is_err() {
            return;
        }
        // Keep polling until the DISCONNECT packet has actually been written
        let eventloop = &mut self.eventloop;
        let flushed = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;
        if flushed.is_err() {
            debug!("Timed out waiting for MQTT disconnect");
        }
        info!("Disconnected from MQTT broker {}", self.broker);
    }
}
