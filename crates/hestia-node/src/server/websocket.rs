//! WebSocket connection handling

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use hestia_core::{BridgeError, ClientSession};

use crate::AppState;

/// Time the writer gets to send a close frame once the reader is done
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Handle WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let peer = connect_info.map(|ConnectInfo(addr)| addr);
    ws.on_upgrade(move |socket| handle_socket(socket, peer, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, peer: Option<SocketAddr>, state: Arc<AppState>) {
    let (session, mut frames) = ClientSession::new(peer, state.session.queue_capacity);
    let connected = state.registry.register(session.clone());
    state.stats.session_opened();
    info!(
        "WebSocket session {} opened ({} connected)",
        session.label(),
        connected
    );

    let (mut sender, mut receiver) = socket.split();

    // Forward queued frames to this client until the session is closed
    let writer = session.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = frames.recv() => {
                    let Some(frame) = frame else { break };
                    if let Err(e) = sender.send(Message::Text(frame.to_string())).await {
                        let err = BridgeError::SessionWrite {
                            session: writer.id(),
                            reason: e.to_string(),
                        };
                        debug!("{}", err);
                        break;
                    }
                }
                _ = writer.closed() => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Handle incoming frames from client
    let reader = session.clone();
    let relay = state.relay.clone();
    let idle_timeout = state.session.idle_timeout;
    let mut recv_task = tokio::spawn(async move {
        loop {
            let next = match idle_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, receiver.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        info!(
                            "Session {} idle for {}s, closing",
                            reader.label(),
                            timeout.as_secs()
                        );
                        break;
                    }
                },
                None => receiver.next().await,
            };

            match next {
                Some(Ok(Message::Text(text))) => {
                    // Errors are already logged and counted by the relay
                    let _ = relay.handle_frame(&reader, &text).await;
                }
                Some(Ok(Message::Binary(data))) => {
                    let _ = relay.handle_binary(&reader, &data).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("WebSocket error on session {}: {}", reader.label(), e);
                    break;
                }
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => {
            // Closing the session lets the writer send a close frame
            state.registry.unregister(&session.id());
            if tokio::time::timeout(CLOSE_GRACE, &mut send_task).await.is_err() {
                send_task.abort();
            }
        }
    }

    state.registry.unregister(&session.id());
    state.stats.session_closed();
    info!(
        "WebSocket session {} closed ({} connected)",
        session.label(),
        state.registry.len()
    );
}
