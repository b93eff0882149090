//! Integration tests for the bridge server
//!
//! Each test starts the real router on an ephemeral port, with a
//! [`MockPublisher`] standing in for the MQTT link and an inbound channel
//! feeding the broadcaster as the link driver would.

mod bridge_flow;
mod rest_api;

use futures::StreamExt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use hestia_core::test_utils::MockPublisher;
use hestia_core::{
    BridgeConfig, BridgeStats, Broadcaster, ClientRegistry, InboundMessage, SessionConfig,
};
use hestia_node::{server, AppState};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A bridge server running in the background
pub struct TestBridge {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
    pub publisher: Arc<MockPublisher>,
    pub inbound: mpsc::Sender<InboundMessage>,
}

impl TestBridge {
    /// Start with default session limits
    pub async fn start() -> Self {
        Self::start_with(SessionConfig::default()).await
    }

    /// Start with custom session limits
    pub async fn start_with(session: SessionConfig) -> Self {
        let mut config = BridgeConfig::default();
        config.session = session;

        let registry = Arc::new(ClientRegistry::new());
        let stats = Arc::new(BridgeStats::new());
        let publisher = Arc::new(MockPublisher::new());
        let state = Arc::new(AppState::new(
            &config,
            registry.clone(),
            stats.clone(),
            publisher.clone(),
            "hestia-bridge-test",
        ));

        let (inbound, inbound_rx) = mpsc::channel(64);
        let broadcaster = Broadcaster::new(registry, stats, config.session.max_lagged_frames);
        tokio::spawn(broadcaster.run(inbound_rx));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = server::create_router(state.clone());
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        Self {
            addr,
            state,
            publisher,
            inbound,
        }
    }

    /// Open a WebSocket session on `path` and wait until it is registered
    pub async fn connect_path(&self, path: &str) -> WsClient {
        let before = self.state.stats.snapshot().sessions_opened;
        let (client, _response) = connect_async(format!("ws://{}{}", self.addr, path))
            .await
            .expect("websocket handshake");
        let stats = self.state.stats.clone();
        eventually(move || {
            let stats = stats.clone();
            async move { stats.snapshot().sessions_opened > before }
        })
        .await;
        client
    }

    /// Open a WebSocket session on `/ws`
    pub async fn connect(&self) -> WsClient {
        self.connect_path("/ws").await
    }

    /// Feed a message as if it came from the broker
    pub async fn mqtt_message(&self, topic: &str, payload: &str) {
        self.inbound
            .send(InboundMessage::new(topic, payload.to_string()))
            .await
            .unwrap();
    }
}

/// Next text frame, failing the test after two seconds
pub async fn next_text(client: &mut WsClient) -> String {
    let deadline = Duration::from_secs(2);
    loop {
        let msg = tokio::time::timeout(deadline, client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return text,
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

/// Poll `check` until it holds, failing the test after two seconds
pub async fn eventually<F, Fut>(check: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = tokio::time::timeout(Duration::from_secs(2), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "condition not reached in time");
}
