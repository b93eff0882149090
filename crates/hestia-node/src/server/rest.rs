//! REST API endpoints

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

use hestia_core::{LinkState, SessionId, StatsSnapshot};

use crate::AppState;

/// Bridge statistics
#[derive(Serialize)]
pub struct BridgeStatsResponse {
    #[serde(flatten)]
    pub counters: StatsSnapshot,
    pub session_count: usize,
    pub link_state: LinkState,
    pub uptime_seconds: u64,
    pub subscribed_topics: Vec<String>,
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<BridgeStatsResponse> {
    Json(BridgeStatsResponse {
        counters: state.stats.snapshot(),
        session_count: state.registry.len(),
        link_state: state.relay.publisher().link_state(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        subscribed_topics: state.subscribed_topics.clone(),
    })
}

/// One connected dashboard session
#[derive(Serialize)]
pub struct SessionEntry {
    pub id: SessionId,
    pub peer: Option<SocketAddr>,
    pub opened_at: DateTime<Utc>,
    pub lagged_frames: u64,
}

/// List connected sessions
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionEntry>> {
    let mut sessions: Vec<SessionEntry> = state
        .registry
        .snapshot()
        .into_iter()
        .map(|session| SessionEntry {
            id: session.id(),
            peer: session.peer(),
            opened_at: session.opened_at(),
            lagged_frames: session.lagged_frames(),
        })
        .collect();
    sessions.sort_by_key(|entry| entry.opened_at);
    Json(sessions)
}

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

/// Bridge info endpoint
#[derive(Serialize)]
pub struct BridgeInfo {
    pub version: &'static str,
    pub name: String,
    pub client_id: String,
}

pub async fn bridge_info(State(state): State<Arc<AppState>>) -> Json<BridgeInfo> {
    Json(BridgeInfo {
        version: env!("CARGO_PKG_VERSION"),
        name: state.name.clone(),
        client_id: state.client_id.clone(),
    })
}
