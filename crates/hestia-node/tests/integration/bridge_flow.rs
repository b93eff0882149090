//! End-to-end bridge behavior over real WebSocket connections

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

use hestia_core::{LinkState, SessionConfig};

use super::{eventually, next_text, TestBridge};

const REGULATOR_FRAME: &str =
    r#"{"topic":"regulator/regulate_radiator","raw_message":"{\"tc_salon_1\":21.5}"}"#;

#[tokio::test]
async fn test_two_clients_receive_same_frame() {
    let bridge = TestBridge::start().await;
    let mut alice = bridge.connect().await;
    let mut bob = bridge.connect().await;

    bridge
        .mqtt_message("regulator/regulate_radiator", r#"{"tc_salon_1":21.5}"#)
        .await;

    assert_eq!(next_text(&mut alice).await, REGULATOR_FRAME);
    assert_eq!(next_text(&mut bob).await, REGULATOR_FRAME);
}

#[tokio::test]
async fn test_root_path_upgrades() {
    let bridge = TestBridge::start().await;
    let mut client = bridge.connect_path("/").await;

    bridge
        .mqtt_message("regulator/regulate_radiator", r#"{"tc_salon_1":21.5}"#)
        .await;
    assert_eq!(next_text(&mut client).await, REGULATOR_FRAME);
}

#[tokio::test]
async fn test_command_is_published() {
    let bridge = TestBridge::start().await;
    let mut client = bridge.connect().await;

    client
        .send(Message::Text(
            r#"{"topic":"external/rad_salon","raw_message":"{\"mode\":\"STOP\"}"}"#.to_string(),
        ))
        .await
        .unwrap();

    let publisher = bridge.publisher.clone();
    eventually(move || {
        let publisher = publisher.clone();
        async move { !publisher.published().is_empty() }
    })
    .await;

    let published = bridge.publisher.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "external/rad_salon");
    assert_eq!(&published[0].1[..], br#"{"mode":"STOP"}"#);
}

#[tokio::test]
async fn test_binary_command_is_published() {
    let bridge = TestBridge::start().await;
    let mut client = bridge.connect().await;

    client
        .send(Message::Binary(
            br#"{"topic":"external/rad_bureau","raw_message":"{\"mode\":\"ECO\"}"}"#.to_vec(),
        ))
        .await
        .unwrap();

    let publisher = bridge.publisher.clone();
    eventually(move || {
        let publisher = publisher.clone();
        async move { publisher.published().len() == 1 }
    })
    .await;
    assert_eq!(bridge.publisher.published()[0].0, "external/rad_bureau");
}

#[tokio::test]
async fn test_malformed_frame_keeps_session_open() {
    let bridge = TestBridge::start().await;
    let mut client = bridge.connect().await;

    for bad in ["not json", r#"{"topic":"a/b"}"#, r#"["a/b","x"]"#] {
        client.send(Message::Text(bad.to_string())).await.unwrap();
    }
    client
        .send(Message::Text(
            r#"{"topic":"external/rad_couloir","raw_message":"{}"}"#.to_string(),
        ))
        .await
        .unwrap();

    let publisher = bridge.publisher.clone();
    eventually(move || {
        let publisher = publisher.clone();
        async move { publisher.published().len() == 1 }
    })
    .await;
    assert_eq!(bridge.state.stats.snapshot().malformed_commands, 3);

    // Still receiving broker messages
    bridge.mqtt_message("zigbee2mqtt/ts_bureau", "{}").await;
    assert_eq!(
        next_text(&mut client).await,
        r#"{"topic":"zigbee2mqtt/ts_bureau","raw_message":"{}"}"#
    );
}

#[tokio::test]
async fn test_command_during_outage_is_dropped() {
    let bridge = TestBridge::start().await;
    let mut client = bridge.connect().await;
    bridge.publisher.set_state(LinkState::Reconnecting);

    let command = r#"{"topic":"external/rad_chambre","raw_message":"{\"mode\":\"STOP\"}"}"#;
    client.send(Message::Text(command.to_string())).await.unwrap();

    let stats = bridge.state.stats.clone();
    eventually(move || {
        let stats = stats.clone();
        async move { stats.snapshot().publishes_rejected == 1 }
    })
    .await;
    assert!(bridge.publisher.published().is_empty());

    // Not queued for later; the next command after recovery goes through alone
    bridge.publisher.set_state(LinkState::Connected);
    client.send(Message::Text(command.to_string())).await.unwrap();
    let publisher = bridge.publisher.clone();
    eventually(move || {
        let publisher = publisher.clone();
        async move { publisher.published().len() == 1 }
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(bridge.publisher.published().len(), 1);
}

#[tokio::test]
async fn test_non_utf8_mqtt_payload_is_not_forwarded() {
    let bridge = TestBridge::start().await;
    let mut client = bridge.connect().await;

    bridge
        .inbound
        .send(hestia_core::InboundMessage::new(
            "zigbee2mqtt/ts_salon_1",
            vec![0xc3, 0x28],
        ))
        .await
        .unwrap();
    bridge.mqtt_message("zigbee2mqtt/ts_salon_1", "ok").await;

    // Only the valid message arrives
    assert_eq!(
        next_text(&mut client).await,
        r#"{"topic":"zigbee2mqtt/ts_salon_1","raw_message":"ok"}"#
    );
    assert_eq!(bridge.state.stats.snapshot().encoding_errors, 1);
}

#[tokio::test]
async fn test_session_unregistered_on_close() {
    let bridge = TestBridge::start().await;
    let mut client = bridge.connect().await;
    assert_eq!(bridge.state.registry.len(), 1);

    client.close(None).await.unwrap();

    let state = bridge.state.clone();
    eventually(move || {
        let state = state.clone();
        async move { state.registry.is_empty() }
    })
    .await;
    assert_eq!(bridge.state.stats.snapshot().sessions_closed, 1);
    assert_eq!(bridge.state.stats.snapshot().sessions_evicted, 0);
}

#[tokio::test]
async fn test_idle_session_is_closed() {
    let bridge = TestBridge::start_with(SessionConfig {
        idle_timeout: Some(Duration::from_millis(200)),
        ..SessionConfig::default()
    })
    .await;
    let mut client = bridge.connect().await;

    // The server ends the session: a close frame, then end of stream
    let ended = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "idle session was not closed");

    let state = bridge.state.clone();
    eventually(move || {
        let state = state.clone();
        async move { state.registry.is_empty() }
    })
    .await;
}
