//! Hestia Node - MQTT to WebSocket bridge for the home dashboard
//!
//! This binary runs the bridge with:
//! - A persistent MQTT link subscribed to the dashboard topics
//! - WebSocket server fanning every message out to connected dashboards
//! - REST API for health, info and statistics

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use hestia_core::{
    BridgeConfig, BridgeConfigBuilder, BridgeStats, Broadcaster, ClientRegistry, TopicFilter,
};
use hestia_mqtt::MqttLink;
use hestia_node::{server, AppState};

#[derive(Parser)]
#[command(name = "hestia-node")]
#[command(about = "MQTT to WebSocket bridge for the Hestia home dashboard")]
struct Args {
    /// TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// WebSocket/HTTP listen address (default 0.0.0.0:9002)
    #[arg(long, short)]
    listen: Option<SocketAddr>,

    /// MQTT broker host
    #[arg(long)]
    broker_host: Option<String>,

    /// MQTT broker port
    #[arg(long)]
    broker_port: Option<u16>,

    /// MQTT username
    #[arg(long)]
    username: Option<String>,

    /// MQTT password
    #[arg(long)]
    password: Option<String>,

    /// Topic filter to subscribe to (repeatable, replaces the configured set)
    #[arg(long = "topic", short)]
    topics: Vec<String>,

    /// Display name for this bridge
    #[arg(long, short)]
    name: Option<String>,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,
}

impl Args {
    /// Load the file (if any) and apply command line overrides
    fn into_config(self) -> anyhow::Result<BridgeConfig> {
        let base = match &self.config {
            Some(path) => BridgeConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => BridgeConfig::default(),
        };

        let mut builder = BridgeConfigBuilder::from_config(base);
        if let Some(addr) = self.listen {
            builder = builder.listen(addr);
        }
        if let Some(host) = self.broker_host {
            builder = builder.broker_host(host);
        }
        if let Some(port) = self.broker_port {
            builder = builder.broker_port(port);
        }
        if let Some(username) = self.username {
            builder = builder.username(username);
        }
        if let Some(password) = self.password {
            builder = builder.password(password);
        }
        if !self.topics.is_empty() {
            let topics = self
                .topics
                .into_iter()
                .map(TopicFilter::parse)
                .collect::<Result<Vec<_>, _>>()?;
            builder = builder.topics(topics);
        }

        let mut config = builder.build()?;
        if let Some(name) = self.name {
            config.server.name = name;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG takes precedence over --verbose
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = args.into_config()?;

    info!("Starting Hestia bridge: {}", config.server.name);
    info!(
        "MQTT broker: {}:{} ({} topic filter(s))",
        config.mqtt.host,
        config.mqtt.port,
        config.mqtt.topics.len()
    );

    let registry = Arc::new(ClientRegistry::new());
    let stats = Arc::new(BridgeStats::new());

    // MQTT link -> broadcaster
    let (inbound_tx, inbound_rx) = mpsc::channel(config.mqtt.channel_capacity);
    let (link, driver) = MqttLink::new(&config, inbound_tx, stats.clone())?;
    let client_id = link.client_id().to_string();
    info!("MQTT client id: {}", client_id);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let link_task = tokio::spawn(async move {
        if let Err(e) = driver.run(shutdown_rx).await {
            error!("MQTT link stopped: {}", e);
        }
    });

    let broadcaster = Broadcaster::new(
        registry.clone(),
        stats.clone(),
        config.session.max_lagged_frames,
    );
    tokio::spawn(broadcaster.run(inbound_rx));

    // Create shared state
    let state = Arc::new(AppState::new(
        &config,
        registry.clone(),
        stats,
        Arc::new(link),
        client_id,
    ));

    let listener = tokio::net::TcpListener::bind(config.server.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.server.listen))?;
    let addr = listener.local_addr()?;

    info!("═══════════════════════════════════════════════════════════");
    info!("  Bridge listening on http://{}", addr);
    info!("  WebSocket endpoint: ws://{}/ws", addr);
    info!("  REST API: http://{}/api/", addr);
    info!("═══════════════════════════════════════════════════════════");

    let app = server::create_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(registry))
    .await?;

    shutdown_tx.send_replace(true);
    if tokio::time::timeout(Duration::from_secs(3), link_task)
        .await
        .is_err()
    {
        warn!("MQTT link did not stop in time");
    }
    info!("Bridge stopped");
    Ok(())
}

/// Resolve on Ctrl-C, closing every dashboard session
async fn shutdown_signal(registry: Arc<ClientRegistry>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    let closed = registry.close_all();
    info!("Shutting down, closed {} session(s)", closed);
}
