// src/server/main.rs
// Entry point per il server parla
use parla::server::assist::{Assistant, GeminiClient, TextGenerator};
use parla::server::config::ServerConfig;
use parla::server::hub::SignalingHub;
use parla::server::relay::SignalingRelay;
use parla::server::routes::{self, AppState};
use parla::server::video::{CallInfrastructure, StreamVideo};
use parla::server::websocket;
use parla::utils::performance;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use log::{info, warn, error};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configura logging
    let config = Arc::new(ServerConfig::from_env());
    std::env::set_var("RUST_LOG", &config.log_level);
    env_logger::init();

    let hub = SignalingHub::new();
    let relay = SignalingRelay::new(hub.clone(), config.ring_timeout());

    let generator = GeminiClient::from_config(&config).map(|c| Arc::new(c) as Arc<dyn TextGenerator>);
    if generator.is_none() {
        error!("[AI] GEMINI_API_KEY is not set; AI routes will answer 503");
    }
    let video = match StreamVideo::from_config(&config) {
        Ok(v) => Some(Arc::new(v) as Arc<dyn CallInfrastructure>),
        Err(e) => {
            warn!("[VIDEO] {}; set STREAM_API_KEY and STREAM_API_SECRET to enable calls", e);
            None
        }
    };

    // Start performance logger in background
    let perf_hub = hub.clone();
    let perf_path = config.performance_log_path.clone();
    let perf_every = Duration::from_secs(config.performance_interval_secs);
    tokio::spawn(async move {
        info!("[PERF] Logging every {:?} to {}", perf_every, perf_path);
        performance::start_performance_logger(perf_hub, &perf_path, perf_every).await;
    });

    // Socket server su porta +1 rispetto al server HTTP
    let ws_port = config.websocket_port().ok_or_else(|| {
        anyhow::anyhow!("SERVER_PORT {} leaves no room for the signaling socket on port + 1", config.port)
    })?;
    let ws_addr = format!("{}:{}", config.host, ws_port);
    let ws_listener = TcpListener::bind(&ws_addr).await.map_err(|e| {
        error!("Cannot bind signaling socket {}: {}", ws_addr, e);
        e
    })?;
    let ws_config = config.clone();
    tokio::spawn(async move {
        if let Err(e) = websocket::serve(ws_listener, relay, ws_config).await {
            error!("[WS] Signaling server error: {}", e);
        }
    });
    info!("🔌 Signaling socket on {}", ws_addr);

    let state = AppState { assistant: Assistant::new(generator), video, hub };
    let http_listener = TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;
    routes::serve(http_listener, routes::router(state, &config)).await
}
