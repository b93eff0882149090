//! REST API endpoint tests
//!
//! These tests verify the REST API response formats against a running
//! server.

use reqwest::StatusCode;
use serde_json::Value;

use hestia_core::LinkState;

use super::TestBridge;

async fn get(bridge: &TestBridge, path: &str) -> reqwest::Response {
    reqwest::get(format!("http://{}{}", bridge.addr, path))
        .await
        .unwrap()
}

async fn get_json(bridge: &TestBridge, path: &str) -> Value {
    let response = get(bridge, path).await;
    assert_eq!(response.status(), StatusCode::OK, "GET {} failed", path);
    response.json().await.unwrap()
}

#[tokio::test]
async fn test_health() {
    let bridge = TestBridge::start().await;
    let response = get(&bridge, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_info_response_format() {
    let bridge = TestBridge::start().await;
    let info = get_json(&bridge, "/api/info").await;

    assert_eq!(info["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(info["name"], "hestia");
    assert_eq!(info["client_id"], "hestia-bridge-test");
}

#[tokio::test]
async fn test_stats_response_format() {
    let bridge = TestBridge::start().await;
    let _client = bridge.connect().await;
    bridge.mqtt_message("external/rad_salon", "{}").await;

    let state = bridge.state.clone();
    super::eventually(move || {
        let state = state.clone();
        async move { state.stats.snapshot().frames_delivered == 1 }
    })
    .await;

    let stats = get_json(&bridge, "/api/stats").await;
    assert_eq!(stats["session_count"], 1);
    assert_eq!(stats["sessions_opened"], 1);
    assert_eq!(stats["mqtt_messages_received"], 1);
    assert_eq!(stats["frames_delivered"], 1);
    assert!(stats["last_message_at"].is_string());
    assert_eq!(stats["link_state"], "connected");
    assert!(stats["uptime_seconds"].is_number());
    assert_eq!(stats["subscribed_topics"].as_array().unwrap().len(), 9);
}

#[tokio::test]
async fn test_stats_reports_outage() {
    let bridge = TestBridge::start().await;
    bridge.publisher.set_state(LinkState::Reconnecting);

    let stats = get_json(&bridge, "/api/stats").await;
    assert_eq!(stats["link_state"], "reconnecting");
    assert_eq!(stats["session_count"], 0);
}

#[tokio::test]
async fn test_sessions_response_format() {
    let bridge = TestBridge::start().await;
    let _a = bridge.connect().await;
    let _b = bridge.connect().await;

    let sessions = get_json(&bridge, "/api/sessions").await;
    let sessions = sessions.as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    for session in sessions {
        assert!(session["id"].is_string());
        assert!(session["peer"].as_str().unwrap().starts_with("127.0.0.1:"));
        assert!(session["opened_at"].is_string());
        assert_eq!(session["lagged_frames"], 0);
    }
}

#[tokio::test]
async fn test_plain_get_on_websocket_path_is_rejected() {
    let bridge = TestBridge::start().await;
    let response = get(&bridge, "/ws").await;
    assert!(response.status().is_client_error());
    assert!(bridge.state.registry.is_empty());
}

#[tokio::test]
async fn test_cross_origin_dashboard_allowed() {
    let bridge = TestBridge::start().await;
    let response = reqwest::Client::new()
        .get(format!("http://{}/api/stats", bridge.addr))
        .header("Origin", "http://192.168.0.20:8080")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}
