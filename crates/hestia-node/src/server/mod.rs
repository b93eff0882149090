//! Dashboard backend server
//!
//! This module provides the WebSocket bridge endpoint and the REST API.

pub mod rest;
pub mod websocket;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::AppState;

/// Create the server router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(rest::health))
        // Bridge info
        .route("/api/info", get(rest::bridge_info))
        // WebSocket endpoint; the deployed dashboard connects to the root path
        .route("/ws", get(websocket::ws_handler))
        .route("/", get(websocket::ws_handler))
        // REST endpoints
        .route("/api/stats", get(rest::get_stats))
        .route("/api/sessions", get(rest::list_sessions))
        // CORS for dashboard
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
