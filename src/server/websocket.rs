use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::common::protocol::{ClientEvent, UserId};
use crate::server::config::ServerConfig;
use crate::server::relay::SignalingRelay;

/// Accept loop for the signaling socket; one task per connection.
pub async fn serve(listener: TcpListener, relay: SignalingRelay, config: Arc<ServerConfig>) -> anyhow::Result<()> {
    log::info!("[WS] Signaling server listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().await?;
        log::debug!("[WS] New TCP connection from {}", peer);
        let relay = relay.clone();
        let config = config.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, relay, config).await {
                log::warn!("[WS] Connection from {} ended with error: {}", peer, e);
            }
        });
    }
}

/// Extracts the `userId` handshake query parameter. Empty, `undefined` and `null` mean anonymous.
pub fn user_id_from_query(query: Option<&str>) -> Option<UserId> {
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "userId")
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty() && v != "undefined" && v != "null")
}

/// Caps inbound frames and messages at `MAX_MESSAGE_LENGTH` before tungstenite buffers them.
pub fn socket_config(config: &ServerConfig) -> WebSocketConfig {
    let mut socket = WebSocketConfig::default();
    socket.max_message_size = Some(config.max_message_length);
    socket.max_frame_size = Some(config.max_message_length);
    socket
}

pub async fn handle_connection(
    stream: TcpStream,
    relay: SignalingRelay,
    config: Arc<ServerConfig>,
) -> anyhow::Result<()> {
    let mut user_id: Option<UserId> = None;
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if let Some(origin) = req.headers().get("origin").and_then(|v| v.to_str().ok()) {
            if !config.is_origin_allowed(origin) {
                log::warn!("[WS] Refusing handshake from origin {}", origin);
                let mut refusal = ErrorResponse::new(Some("Origin not allowed".to_string()));
                *refusal.status_mut() = StatusCode::FORBIDDEN;
                return Err(refusal);
            }
        }
        user_id = user_id_from_query(req.uri().query());
        Ok(resp)
    };
    let ws_stream =
        tokio_tungstenite::accept_hdr_async_with_config(stream, callback, Some(socket_config(&config))).await?;

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let hub = relay.hub().clone();
    let connection_id = hub.connect(user_id.clone(), tx).await;
    log::info!(
        "[WS] Connection {} open for {}",
        connection_id,
        user_id.as_deref().unwrap_or("<anonymous>")
    );

    let ping_every = Duration::from_secs(config.ping_interval_secs.max(1));
    let idle_timeout = Duration::from_secs(config.idle_timeout_secs.max(1));

    // Task per inviare messaggi al client, con ping periodico
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(ping_every);
        heartbeat.tick().await;
        loop {
            tokio::select! {
                outgoing = rx.recv() => match outgoing {
                    Some(message) => {
                        if ws_sender.send(message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                _ = heartbeat.tick() => {
                    if ws_sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_sender.close().await;
    });

    // Task per ricevere eventi dal client
    let conn = connection_id.clone();
    let mut receive_task = tokio::spawn(async move {
        loop {
            let next = match tokio::time::timeout(idle_timeout, ws_receiver.next()).await {
                Ok(next) => next,
                Err(_) => {
                    log::info!("[WS] Connection {} idle for {:?}, closing", conn, idle_timeout);
                    break;
                }
            };
            match next {
                Some(Ok(Message::Text(text))) => match ClientEvent::parse(&text) {
                    Ok(event) => {
                        relay.handle(&conn, event).await;
                    }
                    Err(e) => log::warn!("[WS] Ignoring malformed frame from {}: {}", conn, e),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(WsError::Capacity(e))) => {
                    log::warn!("[WS] Closing {}: {}", conn, e);
                    break;
                }
                Some(Err(e)) => {
                    log::debug!("[WS] Read error on {}: {}", conn, e);
                    break;
                }
            }
        }
    });

    // Aspetta che uno dei task finisca (disconnessione)
    tokio::select! {
        _ = &mut send_task => receive_task.abort(),
        _ = &mut receive_task => send_task.abort(),
    }

    hub.disconnect(&connection_id).await;
    log::info!("[WS] Connection {} closed", connection_id);
    Ok(())
}
